//! The shared handle every pipeline component runs against.
//!
//! Components are free functions over `&Pipeline`; the struct only bundles
//! the collaborators (stores, external services, the job queue, the clock)
//! and the tunables. Cloning is cheap: every field is an `Arc` or a small
//! value.

use std::sync::Arc;

use crate::click::RecorderConfig;
use crate::clock::Clock;
use crate::conversion::{CommissionService, ConversionConfig, FxRates};
use crate::db::Database;
use crate::dispatch::{RetryConfig, WebhookCache, WebhookTransport};
use crate::events::EventStore;
use crate::jobs::JobQueue;
use crate::persistence::ErrorLog;
use crate::reconcile::ReconcileConfig;
use crate::store::KeyedStore;

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub recorder: RecorderConfig,
    pub conversion: ConversionConfig,
    pub reconcile: ReconcileConfig,
    pub retry: RetryConfig,
}

#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn KeyedStore>,
    pub events: Arc<dyn EventStore>,
    pub db: Arc<dyn Database>,
    pub error_log: Arc<dyn ErrorLog>,
    pub fx: Arc<dyn FxRates>,
    pub commissions: Arc<dyn CommissionService>,
    pub webhooks: WebhookCache,
    pub transport: Arc<dyn WebhookTransport>,
    pub jobs: JobQueue,
    pub clock: Arc<dyn Clock>,
    pub settings: Settings,
}
