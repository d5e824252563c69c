//! Relational records: links, workspaces, customers, webhooks, and counters.
//!
//! The relational store is owned by the wider product; the pipeline reads
//! configuration from it and writes customers and counters. Counters are
//! always applied as atomic increments inside the store, never as
//! read-modify-write by the caller, so concurrent handlers cannot lose updates.

pub mod memory;
pub mod seed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    Customer, CustomerActivity, CustomerId, ExternalId, Link, LinkId, NewCustomer, WebhookConfig,
    Workspace, WorkspaceId,
};

pub use memory::MemoryDatabase;
pub use seed::{Seed, SeedError};

/// Errors from the relational store.
#[derive(Debug, Error)]
pub enum DbError {
    /// A row referenced by an update does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The backing store is unavailable.
    #[error("database error: {0}")]
    Backend(String),
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Increments applied to link or workspace counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub clicks: u64,
    pub leads: u64,
    pub sales: u64,
    pub sale_amount: i64,
}

impl CounterDelta {
    pub fn clicks(n: u64) -> Self {
        CounterDelta {
            clicks: n,
            ..Default::default()
        }
    }

    pub fn leads(n: u64) -> Self {
        CounterDelta {
            leads: n,
            ..Default::default()
        }
    }

    pub fn sale(amount: i64) -> Self {
        CounterDelta {
            sales: 1,
            sale_amount: amount,
            ..Default::default()
        }
    }

    /// Billable events in this delta.
    pub fn usage(&self) -> u64 {
        self.clicks + self.leads + self.sales
    }
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn get_link(&self, id: &LinkId) -> Result<Option<Link>>;

    async fn find_link(&self, domain: &str, key: &str) -> Result<Option<Link>>;

    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>>;

    /// Resolves the workspace an API key belongs to.
    async fn workspace_for_api_key(&self, api_key: &str) -> Result<Option<WorkspaceId>>;

    /// Creates the customer if `(workspace_id, external_id)` is unseen.
    ///
    /// An existing row is returned untouched, preserving its acquisition
    /// attribution. The flag is `true` only for the call that created it.
    async fn upsert_customer(&self, customer: NewCustomer) -> Result<(Customer, bool)>;

    async fn find_customer(
        &self,
        workspace_id: &WorkspaceId,
        external_id: &ExternalId,
    ) -> Result<Option<Customer>>;

    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>>;

    /// Applies counter increments and bumps `last_event_at`/`last_activity_type`.
    async fn record_customer_activity(
        &self,
        id: &CustomerId,
        activity: CustomerActivity,
    ) -> Result<()>;

    /// Stores the 0-10 score together with the raw value it came from.
    async fn set_hot_score(&self, id: &CustomerId, score: u8, raw: u8, at: DateTime<Utc>)
    -> Result<()>;

    async fn increment_link_counters(&self, id: &LinkId, delta: CounterDelta) -> Result<()>;

    /// Applies totals and adds `delta.usage()` to the workspace's usage.
    async fn increment_workspace_usage(&self, id: &WorkspaceId, delta: CounterDelta)
    -> Result<()>;

    async fn list_webhooks(&self, workspace_id: &WorkspaceId) -> Result<Vec<WebhookConfig>>;
}
