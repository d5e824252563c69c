//! Delivery of signed payloads to webhook endpoints.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::retry::{FailureKind, Retryable};
use crate::webhooks::SIGNATURE_HEADER;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "linktrack-webhooks/1";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("endpoint answered HTTP {0}")]
    Status(u16),
}

impl Retryable for TransportError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            TransportError::Network(_) => FailureKind::Transient,
            TransportError::Status(429) => FailureKind::Transient,
            TransportError::Status(s) if *s >= 500 => FailureKind::Transient,
            TransportError::Status(_) => FailureKind::Permanent,
        }
    }
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POSTs one signed JSON body. Non-2xx answers are errors.
    async fn send(&self, url: &str, body: &[u8], signature: &str) -> Result<(), TransportError>;
}

pub struct HttpWebhookTransport {
    client: reqwest::Client,
}

impl HttpWebhookTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(HttpWebhookTransport { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn send(&self, url: &str, body: &[u8], signature: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}
