//! Background work: an explicit job channel between request handlers and a
//! worker loop.
//!
//! Handlers never await side effects that are not on their critical path.
//! They submit a [`Job`] to the [`JobQueue`] and return. The [`JobWorker`]
//! runs each job in its own task; failures are logged and counted in
//! [`JobStats`] rather than surfaced to the original caller.
//!
//! Delayed jobs (`submit_after`) are held by the worker until their delay
//! elapses. They are not persisted: a restart drops them, which bounds the
//! loss to work scheduled inside the reconciliation window.

mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::error;

use crate::conversion::{ConversionError, LeadCommit};
use crate::dispatch::{Delivery, DispatchError};
use crate::hotscore::HotScoreError;
use crate::reconcile::ReconcileError;
use crate::types::{CustomerId, WorkspaceId};

pub use worker::{JobWorker, run_job};

/// A unit of background work.
#[derive(Debug, Clone)]
pub enum Job {
    /// Commit an async-mode lead: customer upsert, lead append, counters,
    /// webhook, hot score.
    LeadFollowUp(Box<LeadCommit>),

    RecomputeHotScore {
        workspace_id: WorkspaceId,
        customer_id: CustomerId,
    },

    /// Deliver one outbound webhook payload to one endpoint.
    DispatchWebhook(Box<Delivery>),

    /// Fires when a pending provider webhook's reconciliation window closes.
    ExpireReconciliation {
        workspace_id: WorkspaceId,
        entry_id: String,
    },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::LeadFollowUp(_) => "lead_follow_up",
            Job::RecomputeHotScore { .. } => "recompute_hot_score",
            Job::DispatchWebhook(_) => "dispatch_webhook",
            Job::ExpireReconciliation { .. } => "expire_reconciliation",
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    HotScore(#[from] HotScoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// A job plus its optional start delay.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job: Job,
    pub delay: Option<Duration>,
}

/// Counters for submitted and finished jobs.
#[derive(Debug, Default)]
pub struct JobStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStatsSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl JobStats {
    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> JobStatsSnapshot {
        JobStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable submit handle. Submitting never blocks.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<ScheduledJob>,
    stats: Arc<JobStats>,
}

/// The receiving end, owned by a [`JobWorker`] (or by a test).
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<ScheduledJob>,
    stats: Arc<JobStats>,
}

impl JobQueue {
    pub fn new() -> (JobQueue, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(JobStats::default());
        (
            JobQueue {
                tx,
                stats: stats.clone(),
            },
            JobReceiver { rx, stats },
        )
    }

    pub fn submit(&self, job: Job) {
        self.enqueue(ScheduledJob { job, delay: None });
    }

    /// Runs `job` once `delay` has elapsed.
    pub fn submit_after(&self, delay: Duration, job: Job) {
        self.enqueue(ScheduledJob {
            job,
            delay: Some(delay),
        });
    }

    fn enqueue(&self, scheduled: ScheduledJob) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.tx.send(scheduled) {
            self.stats.record_failure();
            error!(job = e.0.job.kind(), "Job queue closed, dropping job");
        }
    }

    pub fn stats(&self) -> JobStatsSnapshot {
        self.stats.snapshot()
    }
}

impl JobReceiver {
    pub async fn recv(&mut self) -> Option<ScheduledJob> {
        self.rx.recv().await
    }

    /// Everything submitted so far, without waiting.
    pub fn drain(&mut self) -> Vec<ScheduledJob> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.rx.try_recv() {
            jobs.push(job);
        }
        jobs
    }

    pub fn stats(&self) -> Arc<JobStats> {
        self.stats.clone()
    }
}
