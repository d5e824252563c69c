//! Thank-you reconciliation: pairs provider webhooks that carry no click id
//! with recent visitor hits on a thank-you page.
//!
//! Two workspace-scoped lists live in the keyed store:
//!
//! - `thankYou:waiting:<ws>`: visitor hits with no webhook yet
//! - `thankYou:pending:<ws>`: webhooks with no visitor hit yet
//!
//! Each side first tries to take the newest in-window entry from the other
//! list, and otherwise queues itself. Matching is most-recent-first, not FIFO.
//! `remove_first` is the claim: of two callers racing for one entry, exactly
//! one removes it. A pending webhook that is never claimed becomes a
//! [`WebhookErrorRecord`] when its window closes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::to_delta;
use crate::jobs::Job;
use crate::persistence::ErrorLogError;
use crate::pipeline::Pipeline;
use crate::store::{StoreError, keys};
use crate::types::{AnonymousId, ClickId, LinkId, WebhookErrorRecord, WorkspaceId};

pub const EVICTED_REASON: &str = "evicted: reconciliation queue overflow";

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// How long an entry may wait for its counterpart.
    pub window: Duration,
    /// Entries kept per queue; older ones are trimmed.
    pub max_depth: usize,
    /// Extra lifetime on the queue key past the window, so the expiry job
    /// still finds its entry.
    pub grace: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            window: Duration::from_secs(10 * 60),
            max_depth: 50,
            grace: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    ErrorLog(#[from] ErrorLogError),

    #[error("reconciliation entry JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// A queued half of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconciliationEntry {
    #[serde(rename_all = "camelCase")]
    WaitingConversion {
        id: String,
        click_id: ClickId,
        link_id: LinkId,
        anonymous_id: AnonymousId,
        created_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    PendingWebhook {
        id: String,
        provider: String,
        payload: Value,
        failed_reason: String,
        created_at: DateTime<Utc>,
    },
}

impl ReconciliationEntry {
    pub fn id(&self) -> &str {
        match self {
            ReconciliationEntry::WaitingConversion { id, .. }
            | ReconciliationEntry::PendingWebhook { id, .. } => id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            ReconciliationEntry::WaitingConversion { created_at, .. }
            | ReconciliationEntry::PendingWebhook { created_at, .. } => *created_at,
        }
    }
}

/// A visitor hit that a webhook matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedHit {
    pub click_id: ClickId,
    pub link_id: LinkId,
    pub anonymous_id: AnonymousId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookReconciliation {
    /// Proceed as if the webhook had carried this click.
    Matched(MatchedHit),
    /// Queued; an expiry job fires when the window closes.
    Deferred { entry_id: String },
}

/// A pending webhook a visitor hit matched. It is no longer queued, so the
/// caller owns it: a failed conversion must go through
/// [`record_failed_claim`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedWebhook {
    pub entry_id: String,
    pub provider: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisitorReconciliation {
    /// Process this webhook now with the visitor's click.
    Matched(MatchedWebhook),
    Queued { entry_id: String },
}

fn new_entry_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Claims the newest entry of `key` created within the window.
async fn pop_recent(pipeline: &Pipeline, key: &str) -> Result<Option<ReconciliationEntry>> {
    let settings = &pipeline.settings.reconcile;
    let cutoff = pipeline.clock.now() - to_delta(settings.window);
    for raw in pipeline.store.list_recent(key, settings.max_depth).await? {
        let entry: ReconciliationEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping unreadable reconciliation entry");
                pipeline.store.remove_first(key, &raw).await?;
                continue;
            }
        };
        if entry.created_at() <= cutoff {
            // Newest first: everything after this is older still.
            break;
        }
        if pipeline.store.remove_first(key, &raw).await? {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Pushes an entry, trims the queue, and refreshes the key's lifetime.
/// Returns the entries the trim evicted.
async fn push_bounded(
    pipeline: &Pipeline,
    key: &str,
    entry: &ReconciliationEntry,
) -> Result<Vec<ReconciliationEntry>> {
    let settings = &pipeline.settings.reconcile;
    let raw = serde_json::to_string(entry)?;
    pipeline.store.push_front(key, &raw).await?;

    // Peek one past the limit to see what the trim is about to drop.
    let tail = pipeline
        .store
        .list_recent(key, settings.max_depth.saturating_mul(2))
        .await?;
    let evicted = tail
        .iter()
        .skip(settings.max_depth)
        .filter_map(|raw| serde_json::from_str(raw).ok())
        .collect();
    pipeline.store.trim(key, settings.max_depth).await?;
    pipeline
        .store
        .expire(key, settings.window + settings.grace)
        .await?;
    Ok(evicted)
}

/// Handles a provider webhook that has no click id.
pub async fn handle_reconciliation(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    provider: &str,
    payload: Value,
    failed_reason: &str,
) -> Result<WebhookReconciliation> {
    let waiting = keys::waiting_conversions(workspace_id);
    if let Some(ReconciliationEntry::WaitingConversion {
        click_id,
        link_id,
        anonymous_id,
        ..
    }) = pop_recent(pipeline, &waiting).await?
    {
        info!(
            workspace_id = %workspace_id,
            provider = %provider,
            click_id = %click_id,
            "Webhook matched a waiting visitor"
        );
        return Ok(WebhookReconciliation::Matched(MatchedHit {
            click_id,
            link_id,
            anonymous_id,
        }));
    }

    let entry = ReconciliationEntry::PendingWebhook {
        id: new_entry_id(),
        provider: provider.to_string(),
        payload,
        failed_reason: failed_reason.to_string(),
        created_at: pipeline.clock.now(),
    };
    let entry_id = entry.id().to_string();
    let evicted = push_bounded(pipeline, &keys::pending_webhooks(workspace_id), &entry).await?;
    pipeline.jobs.submit_after(
        pipeline.settings.reconcile.window,
        Job::ExpireReconciliation {
            workspace_id: workspace_id.clone(),
            entry_id: entry_id.clone(),
        },
    );
    for old in evicted {
        let old_id = old.id().to_string();
        if let Err(e) = persist_unmatched(pipeline, workspace_id, old, Some(EVICTED_REASON)).await {
            error!(
                workspace_id = %workspace_id,
                entry_id = %old_id,
                error = %e,
                "Failed to record evicted webhook"
            );
        }
    }
    info!(
        workspace_id = %workspace_id,
        provider = %provider,
        entry_id = %entry_id,
        "Webhook deferred for reconciliation"
    );
    Ok(WebhookReconciliation::Deferred { entry_id })
}

/// Handles a thank-you page hit for a visitor whose click is known.
pub async fn record_visitor_hit(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    click_id: &ClickId,
    link_id: &LinkId,
    anonymous_id: &AnonymousId,
) -> Result<VisitorReconciliation> {
    let pending = keys::pending_webhooks(workspace_id);
    if let Some(ReconciliationEntry::PendingWebhook {
        id,
        provider,
        payload,
        created_at,
        ..
    }) = pop_recent(pipeline, &pending).await?
    {
        info!(
            workspace_id = %workspace_id,
            provider = %provider,
            entry_id = %id,
            click_id = %click_id,
            "Visitor matched a pending webhook"
        );
        return Ok(VisitorReconciliation::Matched(MatchedWebhook {
            entry_id: id,
            provider,
            payload,
            created_at,
        }));
    }

    let entry = ReconciliationEntry::WaitingConversion {
        id: new_entry_id(),
        click_id: click_id.clone(),
        link_id: link_id.clone(),
        anonymous_id: anonymous_id.clone(),
        created_at: pipeline.clock.now(),
    };
    let entry_id = entry.id().to_string();
    let evicted = push_bounded(pipeline, &keys::waiting_conversions(workspace_id), &entry).await?;
    if !evicted.is_empty() {
        debug!(workspace_id = %workspace_id, evicted = evicted.len(), "Waiting visitors trimmed");
    }
    debug!(workspace_id = %workspace_id, click_id = %click_id, "Visitor queued for reconciliation");
    Ok(VisitorReconciliation::Queued { entry_id })
}

/// Runs when a pending webhook's window closes. If nothing claimed it, it is
/// removed and kept as a [`WebhookErrorRecord`]. Returns whether a record was
/// written.
pub async fn expire_pending(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    entry_id: &str,
) -> Result<bool> {
    let key = keys::pending_webhooks(workspace_id);
    let depth = pipeline.settings.reconcile.max_depth;
    for raw in pipeline.store.list_recent(&key, depth).await? {
        let Ok(entry) = serde_json::from_str::<ReconciliationEntry>(&raw) else {
            continue;
        };
        if entry.id() != entry_id {
            continue;
        }
        if !pipeline.store.remove_first(&key, &raw).await? {
            // Claimed by a visitor between the read and the remove.
            return Ok(false);
        }
        persist_unmatched(pipeline, workspace_id, entry, None).await?;
        return Ok(true);
    }
    debug!(workspace_id = %workspace_id, entry_id = %entry_id, "Pending webhook already reconciled");
    Ok(false)
}

/// Keeps a claimed webhook whose conversion failed as a
/// [`WebhookErrorRecord`], with the failure as its reason.
pub(crate) async fn record_failed_claim(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    matched: MatchedWebhook,
    reason: &str,
) -> Result<()> {
    let entry = ReconciliationEntry::PendingWebhook {
        id: matched.entry_id,
        provider: matched.provider,
        payload: matched.payload,
        failed_reason: reason.to_string(),
        created_at: matched.created_at,
    };
    persist_unmatched(pipeline, workspace_id, entry, None).await
}

pub(crate) async fn persist_unmatched(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    entry: ReconciliationEntry,
    reason_override: Option<&str>,
) -> Result<()> {
    let ReconciliationEntry::PendingWebhook {
        id,
        provider,
        payload,
        failed_reason,
        ..
    } = entry
    else {
        return Ok(());
    };
    let record = WebhookErrorRecord {
        id,
        workspace_id: workspace_id.clone(),
        provider,
        raw_payload: payload,
        failed_reason: reason_override.map_or(failed_reason, str::to_string),
        created_at: pipeline.clock.now(),
    };
    pipeline.error_log.append(&record).await?;
    warn!(
        workspace_id = %workspace_id,
        provider = %record.provider,
        record_id = %record.id,
        reason = %record.failed_reason,
        "Unreconciled webhook recorded for review"
    );
    Ok(())
}
