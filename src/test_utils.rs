//! Shared test harness and fixtures.
//!
//! [`TestPipeline`] wires every collaborator to an in-memory or recording
//! implementation and keeps concrete handles to them so tests can seed state
//! and inspect side effects. Time is a [`ManualClock`]; jobs are not run by a
//! worker but drained explicitly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::click::RecorderConfig;
use crate::clock::{Clock, ManualClock};
use crate::conversion::{
    CommissionError, CommissionEvent, CommissionService, ConversionConfig, FxRates, StaticFxRates,
};
use crate::db::{Database, MemoryDatabase};
use crate::dispatch::{RetryConfig, TransportError, WebhookCache, WebhookTransport};
use crate::events::MemoryEventStore;
use crate::jobs::{self, JobQueue, JobReceiver, ScheduledJob};
use crate::persistence::MemoryErrorLog;
use crate::pipeline::{Pipeline, Settings};
use crate::reconcile::ReconcileConfig;
use crate::store::MemoryKeyedStore;
use crate::types::{
    ClickEvent, Currency, Customer, Device, ExternalId, Geo, Link, NewCustomer, WebhookConfig,
    WebhookTrigger, Workspace, WorkspaceId,
};

pub const TEST_API_KEY: &str = "key_ws_1";

pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

// ─── Recording collaborators ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentWebhook {
    pub url: String,
    pub body: Vec<u8>,
    pub signature: String,
}

/// Records successful sends; can be told to fail the next N attempts.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentWebhook>>,
    failures: Mutex<VecDeque<TransportError>>,
    attempts: Mutex<usize>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<SentWebhook> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    pub fn fail_with(&self, error: TransportError, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        failures.extend(std::iter::repeat_n(error, times));
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn send(&self, url: &str, body: &[u8], signature: &str) -> Result<(), TransportError> {
        *self.attempts.lock().unwrap() += 1;
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(SentWebhook {
            url: url.to_string(),
            body: body.to_vec(),
            signature: signature.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingCommissions {
    events: Mutex<Vec<CommissionEvent>>,
}

impl RecordingCommissions {
    pub fn events(&self) -> Vec<CommissionEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommissionService for RecordingCommissions {
    async fn record(&self, event: &CommissionEvent) -> Result<(), CommissionError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub db: Arc<MemoryDatabase>,
    pub events: Arc<MemoryEventStore>,
    pub store: Arc<MemoryKeyedStore>,
    pub error_log: Arc<MemoryErrorLog>,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<RecordingTransport>,
    pub commissions: Arc<RecordingCommissions>,
    pub jobs: JobReceiver,
    deferred: Vec<ScheduledJob>,
}

impl TestPipeline {
    /// A pipeline with workspace `ws_1` (USD), link `link_1` on `acme.link`,
    /// and API key [`TEST_API_KEY`]. FX only knows identity conversions.
    pub fn new() -> Self {
        Self::with_fx(StaticFxRates::new())
    }

    pub fn with_fx(fx: impl FxRates + 'static) -> Self {
        let clock = Arc::new(ManualClock::new(test_start()));
        let db = Arc::new(MemoryDatabase::new());
        db.insert_workspace(sample_workspace("ws_1"));
        db.insert_link(sample_link("link_1", "ws_1"));
        db.insert_api_key(TEST_API_KEY, WorkspaceId::new("ws_1"));

        let events = Arc::new(MemoryEventStore::new());
        let store = Arc::new(MemoryKeyedStore::new(clock.clone()));
        let error_log = Arc::new(MemoryErrorLog::new());
        let transport = Arc::new(RecordingTransport::default());
        let commissions = Arc::new(RecordingCommissions::default());
        let (queue, jobs) = JobQueue::new();

        let pipeline = Pipeline {
            store: store.clone(),
            events: events.clone(),
            db: db.clone(),
            error_log: error_log.clone(),
            fx: Arc::new(fx),
            commissions: commissions.clone(),
            webhooks: WebhookCache::new(
                db.clone() as Arc<dyn Database>,
                clock.clone(),
                crate::dispatch::cache::DEFAULT_TTL,
            ),
            transport: transport.clone(),
            jobs: queue,
            clock: clock.clone(),
            settings: Settings {
                recorder: RecorderConfig::default(),
                conversion: ConversionConfig::default(),
                reconcile: ReconcileConfig::default(),
                retry: RetryConfig::new(3, Duration::from_millis(1), Duration::from_millis(5), 2.0),
            },
        };

        TestPipeline {
            pipeline,
            db,
            events,
            store,
            error_log,
            clock,
            transport,
            commissions,
            jobs,
            deferred: Vec::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn seed_customer(&self, workspace: &str, external_id: &str) -> Customer {
        let (customer, _) = self
            .db
            .upsert_customer(NewCustomer {
                workspace_id: workspace.into(),
                external_id: external_id.into(),
                name: format!("Customer {external_id}"),
                email: None,
                avatar: None,
                country: None,
                click_id: Some("clk_seed".into()),
                link_id: Some("link_1".into()),
                created_at: self.now(),
            })
            .await
            .unwrap();
        customer
    }

    /// Runs every queued job without a delay, including jobs those jobs
    /// queue. Delayed jobs are set aside for [`Self::run_deferred_jobs`].
    pub async fn run_immediate_jobs(&mut self) {
        loop {
            let batch = self.jobs.drain();
            if batch.is_empty() {
                break;
            }
            for scheduled in batch {
                if scheduled.delay.is_some() {
                    self.deferred.push(scheduled);
                    continue;
                }
                let kind = scheduled.job.kind();
                if let Err(e) = jobs::run_job(&self.pipeline, scheduled.job).await {
                    tracing::debug!(job = kind, error = %e, "Test job failed");
                }
            }
        }
    }

    /// Runs the delayed jobs set aside so far, then anything they queue.
    pub async fn run_deferred_jobs(&mut self) {
        for scheduled in std::mem::take(&mut self.deferred) {
            let kind = scheduled.job.kind();
            if let Err(e) = jobs::run_job(&self.pipeline, scheduled.job).await {
                tracing::debug!(job = kind, error = %e, "Test job failed");
            }
        }
        self.run_immediate_jobs().await;
    }
}

// ─── Fixtures ─────────────────────────────────────────────────────────────────

pub fn sample_workspace(id: &str) -> Workspace {
    Workspace {
        id: id.into(),
        name: format!("Workspace {id}"),
        usage: 0,
        usage_limit: 1_000_000,
        reporting_currency: Currency::usd(),
        total_clicks: 0,
        total_leads: 0,
        total_sales: 0,
        total_sale_amount: 0,
    }
}

/// A link on `acme.link` whose key is its id.
pub fn sample_link(id: &str, workspace: &str) -> Link {
    Link {
        id: id.into(),
        workspace_id: workspace.into(),
        domain: "acme.link".to_string(),
        key: id.to_string(),
        url: format!("https://acme.com/landing/{id}"),
        partner_id: None,
        program_id: None,
        clicks: 0,
        leads: 0,
        sales: 0,
        sale_amount: 0,
    }
}

pub fn sample_click(click_id: &str, link_id: &str, workspace: &str) -> ClickEvent {
    ClickEvent {
        timestamp: test_start(),
        click_id: click_id.into(),
        link_id: link_id.into(),
        workspace_id: workspace.into(),
        identity_hash: "0".repeat(64),
        geo: Geo {
            country: "US".to_string(),
            ..Geo::default()
        },
        device: Device::default(),
        browser: "Chrome".to_string(),
        os: "Mac OS".to_string(),
        referrer: "(direct)".to_string(),
        url: format!("https://acme.com/landing/{link_id}"),
        bot: false,
    }
}

pub fn sample_customer(workspace: &str, external_id: &str) -> Customer {
    NewCustomer {
        workspace_id: workspace.into(),
        external_id: ExternalId::new(external_id),
        name: format!("Customer {external_id}"),
        email: Some(format!("{external_id}@example.com")),
        avatar: None,
        country: Some("US".to_string()),
        click_id: Some("clk_1".into()),
        link_id: Some("link_1".into()),
        created_at: test_start(),
    }
    .into_customer()
}

/// An active webhook posting to `https://hooks.example.com/<id>` with secret
/// `whsec_<id>`.
pub fn sample_webhook(id: &str, workspace: &str, triggers: Vec<WebhookTrigger>) -> WebhookConfig {
    WebhookConfig {
        id: id.into(),
        workspace_id: workspace.into(),
        url: format!("https://hooks.example.com/{id}"),
        secret: format!("whsec_{id}"),
        triggers,
        link_ids: Vec::new(),
        disabled_at: None,
    }
}
