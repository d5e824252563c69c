//! The event store: append-only click, lead, and sale facts.
//!
//! Long-term analytics live in an external columnar store. The pipeline only
//! appends facts and performs point lookups (a click by id, a customer's
//! latest lead) to attribute later conversions. Reads may lag writes, which is
//! why the click and lead paths also keep short-lived caches in the keyed store.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ClickEvent, ClickId, CustomerId, LeadEvent, SaleEvent};

pub use http::{HttpEventStore, HttpEventStoreConfig};
pub use memory::MemoryEventStore;

/// Errors from the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Transport-level failure talking to the store.
    #[error("event store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("event store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Encoding a row or decoding a response failed.
    #[error("event store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backing store is unavailable.
    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn record_click(&self, click: &ClickEvent) -> Result<()>;

    async fn get_click(&self, click_id: &ClickId) -> Result<Option<ClickEvent>>;

    async fn record_lead(&self, lead: &LeadEvent) -> Result<()>;

    /// The customer's most recent lead, optionally restricted to an event name.
    async fn get_latest_lead(
        &self,
        customer_id: &CustomerId,
        event_name: Option<&str>,
    ) -> Result<Option<LeadEvent>>;

    async fn record_sale(&self, sale: &SaleEvent) -> Result<()>;
}
