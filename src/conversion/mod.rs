//! Lead and sale ingest.
//!
//! Both paths gate on a `set_if_absent` idempotency key before doing any
//! work. A repeat call is a no-op that answers like the first one. When a
//! critical step fails after the gate, the key is released so the caller's
//! retry can go through.

pub mod commission;
pub mod fx;
pub mod lead;
pub mod sale;

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::db::DbError;
use crate::events::EventStoreError;
use crate::pipeline::Pipeline;
use crate::store::StoreError;
use crate::types::{ClickId, ExternalId, WorkspaceId};

pub use commission::{CommissionError, CommissionEvent, CommissionKind, CommissionService, LoggingCommissions};
pub use fx::{FxError, FxRates, HttpFxRates, StaticFxRates};
pub use lead::{LeadCommit, LeadMode, LeadResponse, TrackLeadRequest, commit_lead, track_lead};
pub use sale::{SaleOutcome, SaleResponse, TrackSaleRequest, track_sale};

#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// How long a recorded lead is readable from the keyed store.
    pub lead_cache_ttl: Duration,
    /// How long an invoice id blocks reprocessing.
    pub sale_dedup_ttl: Duration,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        ConversionConfig {
            lead_cache_ttl: Duration::from_secs(5 * 60),
            sale_dedup_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("click {0} not found")]
    ClickNotFound(ClickId),

    #[error("no lead found for customer {0}")]
    LeadNotFound(ExternalId),

    #[error("workspace {0} not found")]
    WorkspaceNotFound(WorkspaceId),

    #[error("currency conversion failed: {0}")]
    Fx(#[from] FxError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Events(#[from] EventStoreError),
}

impl ConversionError {
    /// Errors that mean "the thing you referenced does not exist yet".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ConversionError::ClickNotFound(_)
                | ConversionError::LeadNotFound(_)
                | ConversionError::WorkspaceNotFound(_)
        )
    }
}

/// Lowercases, trims, and collapses internal whitespace.
pub fn normalize_event_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops an idempotency key after a failed critical step.
pub(crate) async fn release_key(pipeline: &Pipeline, key: &str) {
    if let Err(e) = pipeline.store.delete(key).await {
        warn!(key = %key, error = %e, "Failed to release idempotency key");
    }
}
