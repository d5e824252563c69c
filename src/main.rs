use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linktrack::clock::{Clock, SystemClock};
use linktrack::config::Config;
use linktrack::conversion::{FxRates, HttpFxRates, LoggingCommissions, StaticFxRates};
use linktrack::db::{Database, MemoryDatabase, Seed};
use linktrack::dispatch::{HttpWebhookTransport, WebhookCache, cache};
use linktrack::events::{EventStore, HttpEventStore, HttpEventStoreConfig, MemoryEventStore};
use linktrack::jobs::{JobQueue, JobWorker};
use linktrack::persistence::FileErrorLog;
use linktrack::pipeline::Pipeline;
use linktrack::probe::HttpHeadProbe;
use linktrack::server::{AppState, build_router};
use linktrack::store::MemoryKeyedStore;

const EVENT_STORE_TIMEOUT: Duration = Duration::from_secs(10);
const STORE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linktrack=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!(?config, "Starting linktrack");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let db = MemoryDatabase::new();
    if let Some(path) = &config.seed_file {
        Seed::load(path)?.apply(&db)?;
    }
    let db: Arc<dyn Database> = Arc::new(db);

    let events: Arc<dyn EventStore> = match &config.event_store_url {
        Some(base_url) => Arc::new(
            HttpEventStore::new(HttpEventStoreConfig {
                base_url: base_url.clone(),
                token: config.event_store_token.clone(),
                timeout: EVENT_STORE_TIMEOUT,
            })
            .context("failed to build event store client")?,
        ),
        None => {
            tracing::warn!("LINKTRACK_EVENT_STORE_URL unset, keeping events in memory");
            Arc::new(MemoryEventStore::new())
        }
    };

    let fx: Arc<dyn FxRates> = match &config.fx_url {
        Some(url) => Arc::new(HttpFxRates::new(url.clone()).context("failed to build FX client")?),
        None => Arc::new(StaticFxRates::new()),
    };

    let store = Arc::new(MemoryKeyedStore::new(clock.clone()));
    let (jobs, job_rx) = JobQueue::new();
    let pipeline = Pipeline {
        store: store.clone(),
        events,
        db: db.clone(),
        error_log: Arc::new(FileErrorLog::new(config.error_log_dir.clone())),
        fx,
        commissions: Arc::new(LoggingCommissions),
        webhooks: WebhookCache::new(db, clock.clone(), cache::DEFAULT_TTL),
        transport: Arc::new(
            HttpWebhookTransport::new().context("failed to build webhook client")?,
        ),
        jobs,
        clock,
        settings: config.settings(),
    };

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(JobWorker::new(pipeline.clone(), job_rx, shutdown.clone()).run());
    let sweeper = tokio::spawn(store.purge_until_cancelled(STORE_PURGE_INTERVAL, shutdown.clone()));

    let probe = Arc::new(HttpHeadProbe::new().context("failed to build probe client")?);
    let app = build_router(AppState::new(
        pipeline,
        config.webhook_master_secret.as_bytes().to_vec(),
        probe,
        config.probe_config(),
    ));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on {}", config.bind_addr);

    let server_shutdown = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown requested");
        server_shutdown.cancel();
    })
    .await
    .context("server error")?;

    shutdown.cancel();
    worker.await.context("job worker panicked")?;
    sweeper.await.context("store sweeper panicked")?;
    Ok(())
}
