//! Read-through cache of each workspace's webhook registrations.
//!
//! The hot path (every click) must not read webhook configuration from the
//! relational store. Entries are loaded on first use, refreshed after
//! `ttl`, and dropped explicitly by [`WebhookCache::invalidate`] when the
//! admin surface changes a workspace's webhooks.
//!
//! Each workspace has a generation that `invalidate` bumps. A load that
//! started before an invalidation is returned to its caller but never
//! cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::{Clock, to_delta};
use crate::db::{Database, DbError};
use crate::types::{WebhookConfig, WorkspaceId};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedEntry {
    loaded_at: DateTime<Utc>,
    hooks: Arc<Vec<WebhookConfig>>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<WorkspaceId, CachedEntry>,
    generations: HashMap<WorkspaceId, u64>,
}

impl CacheState {
    fn generation(&self, workspace_id: &WorkspaceId) -> u64 {
        self.generations.get(workspace_id).copied().unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct WebhookCache {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Arc<RwLock<CacheState>>,
}

impl WebhookCache {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        WebhookCache {
            db,
            clock,
            ttl,
            state: Arc::new(RwLock::new(CacheState::default())),
        }
    }

    /// The workspace's webhooks, loading them if absent or stale.
    pub async fn get(&self, workspace_id: &WorkspaceId) -> Result<Arc<Vec<WebhookConfig>>, DbError> {
        let now = self.clock.now();
        let generation = {
            let state = self.state.read().await;
            if let Some(entry) = state.entries.get(workspace_id)
                && now - entry.loaded_at < to_delta(self.ttl)
            {
                return Ok(entry.hooks.clone());
            }
            state.generation(workspace_id)
        };

        let hooks = Arc::new(self.db.list_webhooks(workspace_id).await?);
        debug!(workspace_id = %workspace_id, count = hooks.len(), "Loaded webhook registry");
        self.store_loaded(workspace_id, generation, now, hooks.clone()).await;
        Ok(hooks)
    }

    /// Caches a load unless the workspace was invalidated since `generation`
    /// was read. Returns whether it was cached.
    async fn store_loaded(
        &self,
        workspace_id: &WorkspaceId,
        generation: u64,
        loaded_at: DateTime<Utc>,
        hooks: Arc<Vec<WebhookConfig>>,
    ) -> bool {
        let mut state = self.state.write().await;
        if state.generation(workspace_id) != generation {
            debug!(workspace_id = %workspace_id, "Discarding webhook registry loaded before invalidation");
            return false;
        }
        state
            .entries
            .insert(workspace_id.clone(), CachedEntry { loaded_at, hooks });
        true
    }

    /// Drops the cached entry; the next `get` reloads it. A load already in
    /// flight is not cached.
    pub async fn invalidate(&self, workspace_id: &WorkspaceId) -> bool {
        let mut state = self.state.write().await;
        *state.generations.entry(workspace_id.clone()).or_insert(0) += 1;
        let removed = state.entries.remove(workspace_id).is_some();
        debug!(workspace_id = %workspace_id, removed, "Webhook registry invalidated");
        removed
    }
}
