//! The worker loop that executes submitted jobs.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{Job, JobError, JobReceiver, JobStats, ScheduledJob};
use crate::pipeline::Pipeline;
use crate::{conversion, dispatch, hotscore, reconcile};

/// Runs one job to completion.
pub async fn run_job(pipeline: &Pipeline, job: Job) -> Result<(), JobError> {
    match job {
        Job::LeadFollowUp(commit) => {
            conversion::commit_lead(pipeline, *commit).await?;
        }
        Job::RecomputeHotScore {
            workspace_id,
            customer_id,
        } => {
            hotscore::recompute(pipeline, &workspace_id, &customer_id).await?;
        }
        Job::DispatchWebhook(delivery) => {
            dispatch::deliver(pipeline, &delivery).await?;
        }
        Job::ExpireReconciliation {
            workspace_id,
            entry_id,
        } => {
            reconcile::expire_pending(pipeline, &workspace_id, &entry_id).await?;
        }
    }
    Ok(())
}

pub struct JobWorker {
    pipeline: Pipeline,
    rx: JobReceiver,
    stats: Arc<JobStats>,
    shutdown: CancellationToken,
}

impl JobWorker {
    pub fn new(pipeline: Pipeline, rx: JobReceiver, shutdown: CancellationToken) -> Self {
        let stats = rx.stats();
        JobWorker {
            pipeline,
            rx,
            stats,
            shutdown,
        }
    }

    /// Receives jobs until shutdown is requested or every queue handle is gone.
    ///
    /// Jobs already spawned keep running; there is no cooperative
    /// cancellation of in-flight work.
    pub async fn run(mut self) {
        info!("Job worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Job worker shutting down");
                    break;
                }
                next = self.rx.recv() => match next {
                    Some(scheduled) => self.spawn(scheduled),
                    None => {
                        debug!("Job queue closed");
                        break;
                    }
                },
            }
        }
    }

    fn spawn(&self, scheduled: ScheduledJob) {
        let pipeline = self.pipeline.clone();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            let ScheduledJob { job, delay } = scheduled;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let kind = job.kind();
            match run_job(&pipeline, job).await {
                Ok(()) => {
                    stats.record_success();
                    debug!(job = kind, "Job finished");
                }
                Err(e) => {
                    stats.record_failure();
                    error!(job = kind, error = %e, "Background job failed");
                }
            }
        });
    }
}
