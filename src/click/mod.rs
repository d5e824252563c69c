//! Click recording: filtering, deduplication, enrichment, and the short-lived
//! attribution state later conversions read.
//!
//! A qualifying click produces exactly one [`ClickEvent`] per
//! `(domain, key, ip)` within the dedup window. Repeat hits inside the window
//! are not recorded again, but still move the visitor's last-click pointer.

pub mod agent;
pub mod context;
mod recorder;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::db::DbError;
use crate::pipeline::Pipeline;
use crate::store::{self, keys};
use crate::types::{AnonymousId, ClickEvent, ClickId, CustomerId, Link, LinkId, WorkspaceId};

pub use context::RequestContext;
pub use recorder::record_click;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// How long a `(domain, key, ip)` triple suppresses re-recording.
    pub dedup_ttl: Duration,
    /// How long a recorded click is readable from the keyed store.
    pub click_cache_ttl: Duration,
    /// How long a visitor's last-click pointer survives.
    pub last_click_ttl: Duration,
    pub recent_activity_len: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            dedup_ttl: Duration::from_secs(60 * 60),
            click_cache_ttl: Duration::from_secs(5 * 60),
            last_click_ttl: Duration::from_secs(90 * 24 * 60 * 60),
            recent_activity_len: 100,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClickError {
    #[error("link {domain}/{key} not found")]
    LinkNotFound { domain: String, key: String },

    #[error(transparent)]
    Db(#[from] DbError),
}

/// One click to record.
#[derive(Debug, Clone)]
pub struct ClickRequest {
    pub link: Link,
    /// Generated when absent.
    pub click_id: Option<ClickId>,
    /// Final destination; defaults to the link's url.
    pub url: Option<String>,
    pub anonymous_id: Option<AnonymousId>,
    /// Set when the visitor is already a known customer.
    pub customer_id: Option<CustomerId>,
    pub skip_webhooks: bool,
}

impl ClickRequest {
    pub fn new(link: Link) -> Self {
        ClickRequest {
            link,
            click_id: None,
            url: None,
            anonymous_id: None,
            customer_id: None,
            skip_webhooks: false,
        }
    }
}

/// A visitor's most recent click, stored under `lastClick:<ws>:<anonymousId>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastClick {
    pub click_id: ClickId,
    pub link_id: LinkId,
    pub at: DateTime<Utc>,
}

/// Looks up the link a short url points at.
pub async fn resolve_link(pipeline: &Pipeline, domain: &str, key: &str) -> Result<Link, ClickError> {
    pipeline
        .db
        .find_link(domain, key)
        .await?
        .ok_or_else(|| ClickError::LinkNotFound {
            domain: domain.to_string(),
            key: key.to_string(),
        })
}

/// Finds a recorded click: the event store first, then the short-lived click
/// cache for clicks the store has not ingested yet.
///
/// Lookup failures are logged and treated as a miss.
pub async fn find_click(pipeline: &Pipeline, click_id: &ClickId) -> Option<ClickEvent> {
    match pipeline.events.get_click(click_id).await {
        Ok(Some(click)) => return Some(click),
        Ok(None) => {}
        Err(e) => warn!(click_id = %click_id, error = %e, "Event store click lookup failed"),
    }
    match store::get_json::<ClickEvent>(pipeline.store.as_ref(), &keys::click_cache(click_id)).await {
        Ok(cached) => cached,
        Err(e) => {
            warn!(click_id = %click_id, error = %e, "Click cache lookup failed");
            None
        }
    }
}

pub async fn last_click(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    anonymous_id: &AnonymousId,
) -> Result<Option<LastClick>, store::StoreError> {
    store::get_json(
        pipeline.store.as_ref(),
        &keys::last_click(workspace_id, anonymous_id),
    )
    .await
}
