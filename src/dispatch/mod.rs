//! Outbound workspace webhooks.
//!
//! [`dispatch_webhook`] runs on the request path: it resolves the workspace's
//! registrations from the [`WebhookCache`], keeps the active ones subscribed
//! to the trigger, and submits one [`Job::DispatchWebhook`] per endpoint. The
//! HTTP delivery itself ([`deliver`]) happens in the job worker, with
//! backoff on transient failures. Delivery is at-least-once; consumers
//! deduplicate on the payload id.

pub mod cache;
pub mod payload;
pub mod retry;
pub mod transport;

use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::DbError;
use crate::jobs::Job;
use crate::pipeline::Pipeline;
use crate::types::{LinkId, WebhookId, WebhookTrigger, WorkspaceId};
use crate::webhooks::signature::sign;

pub use cache::WebhookCache;
pub use payload::WebhookPayload;
pub use retry::{RetryConfig, RetryResult, retry_with_backoff};
pub use transport::{HttpWebhookTransport, TransportError, WebhookTransport};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to load webhook registry: {0}")]
    Registry(#[from] DbError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("delivery to webhook {webhook_id} failed after {attempts} attempt(s): {error}")]
    Delivery {
        webhook_id: WebhookId,
        attempts: u32,
        error: TransportError,
    },
}

/// One payload bound for one endpoint.
#[derive(Clone, PartialEq)]
pub struct Delivery {
    pub webhook_id: WebhookId,
    pub url: String,
    pub secret: String,
    pub payload: WebhookPayload,
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("webhook_id", &self.webhook_id)
            .field("url", &self.url)
            .field("payload_id", &self.payload.id)
            .field("trigger", &self.payload.trigger)
            .finish_non_exhaustive()
    }
}

/// Fans `data` out to every active webhook of the workspace subscribed to
/// `trigger` (and, for `link.clicked`, to `link`).
///
/// Never fails the caller: a registry error is logged and nothing is sent.
/// Returns the number of deliveries queued.
pub async fn dispatch_webhook(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    trigger: WebhookTrigger,
    link: Option<&LinkId>,
    data: Value,
) -> usize {
    let hooks = match pipeline.webhooks.get(workspace_id).await {
        Ok(hooks) => hooks,
        Err(e) => {
            warn!(workspace_id = %workspace_id, trigger = %trigger, error = %e, "Skipping webhook dispatch");
            return 0;
        }
    };

    let targets: Vec<_> = hooks.iter().filter(|h| h.wants(trigger, link)).collect();
    if targets.is_empty() {
        debug!(workspace_id = %workspace_id, trigger = %trigger, "No subscribed webhooks");
        return 0;
    }

    let payload = WebhookPayload::new(
        trigger,
        workspace_id.clone(),
        pipeline.clock.now(),
        data,
    );
    for hook in &targets {
        pipeline.jobs.submit(Job::DispatchWebhook(Box::new(Delivery {
            webhook_id: hook.id.clone(),
            url: hook.url.clone(),
            secret: hook.secret.clone(),
            payload: payload.clone(),
        })));
    }
    info!(
        workspace_id = %workspace_id,
        trigger = %trigger,
        payload_id = %payload.id,
        webhooks = targets.len(),
        "Webhook deliveries queued"
    );
    targets.len()
}

/// Signs and sends one delivery, retrying transient failures.
pub async fn deliver(pipeline: &Pipeline, delivery: &Delivery) -> Result<(), DispatchError> {
    let body = serde_json::to_vec(&delivery.payload)?;
    let signature = sign(&body, delivery.secret.as_bytes());
    let transport = pipeline.transport.clone();

    let result = retry_with_backoff(pipeline.settings.retry, || {
        let transport = transport.clone();
        let body = &body;
        let signature = &signature;
        async move { transport.send(&delivery.url, body, signature).await }
    })
    .await;

    match result {
        RetryResult::Success(()) => {
            debug!(webhook_id = %delivery.webhook_id, payload_id = %delivery.payload.id, "Webhook delivered");
            Ok(())
        }
        RetryResult::ExhaustedRetries {
            last_error,
            attempts,
        } => Err(DispatchError::Delivery {
            webhook_id: delivery.webhook_id.clone(),
            attempts,
            error: last_error,
        }),
        RetryResult::PermanentError(error) => Err(DispatchError::Delivery {
            webhook_id: delivery.webhook_id.clone(),
            attempts: 1,
            error,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::test_utils::{TestPipeline, sample_webhook};
    use crate::webhooks::signature::verify_signature;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_filters_and_queues_per_endpoint() {
        let mut h = TestPipeline::new();
        h.db.insert_webhook(sample_webhook("wh_1", "ws_1", vec![WebhookTrigger::SaleCreated]));
        h.db.insert_webhook(sample_webhook("wh_2", "ws_1", vec![WebhookTrigger::SaleCreated]));
        h.db.insert_webhook(sample_webhook("wh_3", "ws_1", vec![WebhookTrigger::LeadCreated]));

        let queued = dispatch_webhook(
            &h.pipeline,
            &"ws_1".into(),
            WebhookTrigger::SaleCreated,
            None,
            json!({"x": 1}),
        )
        .await;

        assert_eq!(queued, 2);
        let jobs = h.jobs.drain();
        assert!(jobs.iter().all(|j| matches!(j.job, Job::DispatchWebhook(_))));
        assert_eq!(jobs.len(), 2);
    }

    #[tokio::test]
    async fn link_clicked_only_for_listed_links() {
        let mut h = TestPipeline::new();
        let mut hook = sample_webhook("wh_1", "ws_1", vec![WebhookTrigger::LinkClicked]);
        hook.link_ids = vec!["link_1".into()];
        h.db.insert_webhook(hook);

        let other = dispatch_webhook(
            &h.pipeline,
            &"ws_1".into(),
            WebhookTrigger::LinkClicked,
            Some(&"link_2".into()),
            json!({}),
        )
        .await;
        let listed = dispatch_webhook(
            &h.pipeline,
            &"ws_1".into(),
            WebhookTrigger::LinkClicked,
            Some(&"link_1".into()),
            json!({}),
        )
        .await;

        assert_eq!((other, listed), (0, 1));
        assert_eq!(h.jobs.drain().len(), 1);
    }

    #[tokio::test]
    async fn deliver_signs_with_webhook_secret() {
        let mut h = TestPipeline::new();
        h.db.insert_webhook(sample_webhook("wh_1", "ws_1", vec![WebhookTrigger::LeadCreated]));
        dispatch_webhook(&h.pipeline, &"ws_1".into(), WebhookTrigger::LeadCreated, None, json!({})).await;
        h.run_immediate_jobs().await;

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://hooks.example.com/wh_1");
        assert!(verify_signature(&sent[0].body, &sent[0].signature, b"whsec_wh_1"));
        let payload: WebhookPayload = serde_json::from_slice(&sent[0].body).unwrap();
        assert_eq!(payload.trigger, WebhookTrigger::LeadCreated);
    }

    #[tokio::test]
    async fn permanent_rejection_is_not_retried() {
        let h = TestPipeline::new();
        h.transport.fail_with(TransportError::Status(400), 10);

        let delivery = Delivery {
            webhook_id: "wh_1".into(),
            url: "https://hooks.example.com/wh_1".into(),
            secret: "s".into(),
            payload: WebhookPayload::new(
                WebhookTrigger::LeadCreated,
                "ws_1".into(),
                h.clock.now(),
                json!({}),
            ),
        };
        let err = deliver(&h.pipeline, &delivery).await.unwrap_err();
        assert!(matches!(err, DispatchError::Delivery { attempts: 1, .. }));
        assert_eq!(h.transport.attempts(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let h = TestPipeline::new();
        h.transport.fail_with(TransportError::Status(503), 1);

        let delivery = Delivery {
            webhook_id: "wh_1".into(),
            url: "https://hooks.example.com/wh_1".into(),
            secret: "s".into(),
            payload: WebhookPayload::new(
                WebhookTrigger::SaleCreated,
                "ws_1".into(),
                h.clock.now(),
                json!({}),
            ),
        };
        deliver(&h.pipeline, &delivery).await.unwrap();
        assert_eq!(h.transport.attempts(), 2);
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[test]
    fn debug_hides_secret() {
        let delivery = Delivery {
            webhook_id: "wh_1".into(),
            url: "https://x".into(),
            secret: "topsecret".into(),
            payload: WebhookPayload::new(
                WebhookTrigger::SaleCreated,
                "ws_1".into(),
                chrono::Utc::now(),
                json!({}),
            ),
        };
        assert!(!format!("{delivery:?}").contains("topsecret"));
    }
}
