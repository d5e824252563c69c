//! HTTP client for the external columnar event store.
//!
//! Writes go to the ingestion endpoint as NDJSON:
//! `POST {base}/v0/events?name=<datasource>`.
//!
//! Point reads go through published query endpoints that answer with
//! `{"data": [...]}`: `GET {base}/v0/pipes/<pipe>.json?<params>`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{EventStore, EventStoreError, Result};
use crate::types::{ClickEvent, ClickId, CustomerId, LeadEvent, SaleEvent};

const CLICK_DATASOURCE: &str = "click_events";
const LEAD_DATASOURCE: &str = "lead_events";
const SALE_DATASOURCE: &str = "sale_events";
const CLICK_PIPE: &str = "get_click_event";
const LEAD_PIPE: &str = "get_lead_event";

/// Connection settings for [`HttpEventStore`].
#[derive(Clone)]
pub struct HttpEventStoreConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for HttpEventStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEventStoreConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(serde::Deserialize)]
struct PipeResponse<T> {
    data: Vec<T>,
}

pub struct HttpEventStore {
    client: reqwest::Client,
    config: HttpEventStoreConfig,
}

impl HttpEventStore {
    pub fn new(config: HttpEventStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(HttpEventStore { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn ingest<T: Serialize>(&self, datasource: &str, row: &T) -> Result<()> {
        let body = ndjson_line(row)?;
        let req = self
            .client
            .post(self.url("/v0/events"))
            .query(&[("name", datasource)])
            .header("content-type", "application/x-ndjson")
            .body(body);
        let response = self.authorized(req).send().await?;
        check_status(response).await?;
        debug!(datasource, "event row ingested");
        Ok(())
    }

    async fn query_first<T: DeserializeOwned>(
        &self,
        pipe: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let req = self
            .client
            .get(self.url(&format!("/v0/pipes/{pipe}.json")))
            .query(params);
        let response = check_status(self.authorized(req).send().await?).await?;
        let bytes = response.bytes().await?;
        let parsed: PipeResponse<T> = serde_json::from_slice(&bytes)?;
        Ok(parsed.data.into_iter().next())
    }
}

fn ndjson_line<T: Serialize>(row: &T) -> Result<String> {
    let mut line = serde_json::to_string(row)?;
    line.push('\n');
    Ok(line)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(EventStoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl EventStore for HttpEventStore {
    async fn record_click(&self, click: &ClickEvent) -> Result<()> {
        self.ingest(CLICK_DATASOURCE, click).await
    }

    async fn get_click(&self, click_id: &ClickId) -> Result<Option<ClickEvent>> {
        self.query_first(CLICK_PIPE, &[("clickId", click_id.as_str())])
            .await
    }

    async fn record_lead(&self, lead: &LeadEvent) -> Result<()> {
        self.ingest(LEAD_DATASOURCE, lead).await
    }

    async fn get_latest_lead(
        &self,
        customer_id: &CustomerId,
        event_name: Option<&str>,
    ) -> Result<Option<LeadEvent>> {
        let mut params = vec![("customerId", customer_id.as_str())];
        if let Some(name) = event_name {
            params.push(("eventName", name));
        }
        self.query_first(LEAD_PIPE, &params).await
    }

    async fn record_sale(&self, sale: &SaleEvent) -> Result<()> {
        self.ingest(SALE_DATASOURCE, sale).await
    }
}
