//! Durable log of provider webhooks that could not be reconciled.
//!
//! Records are kept for manual review. The file layout is:
//!
//! ```text
//! <dir>/<workspace_id>/<record_id>.json
//! ```
//!
//! Each record is written with [`write_atomic`], so a crash never leaves a
//! truncated record behind; at worst a stray `.tmp` file, which `list` skips.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use super::fsync::write_atomic;
use crate::types::{WebhookErrorRecord, WorkspaceId};

#[derive(Debug, Error)]
pub enum ErrorLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The id would escape its directory when used as a path component.
    #[error("unsafe path component: {0:?}")]
    UnsafeComponent(String),

    #[error("background write failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ErrorLogError>;

#[async_trait]
pub trait ErrorLog: Send + Sync {
    async fn append(&self, record: &WebhookErrorRecord) -> Result<()>;

    /// Records for a workspace, oldest first.
    async fn list(&self, workspace_id: &WorkspaceId) -> Result<Vec<WebhookErrorRecord>>;
}

/// Rejects empty names, separators, null bytes, and leading dots.
fn validate_component(s: &str) -> Result<()> {
    if s.is_empty()
        || s.starts_with('.')
        || s.contains('/')
        || s.contains('\\')
        || s.contains('\0')
    {
        return Err(ErrorLogError::UnsafeComponent(s.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FileErrorLog {
    dir: PathBuf,
}

impl FileErrorLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileErrorLog { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append_blocking(dir: &Path, record: &WebhookErrorRecord) -> Result<()> {
        validate_component(record.workspace_id.as_str())?;
        validate_component(&record.id)?;
        let bytes = serde_json::to_vec_pretty(record)?;
        let ws_dir = dir.join(record.workspace_id.as_str());
        write_atomic(&ws_dir, &format!("{}.json", record.id), &bytes)?;
        Ok(())
    }

    fn list_blocking(dir: &Path, workspace_id: &WorkspaceId) -> Result<Vec<WebhookErrorRecord>> {
        validate_component(workspace_id.as_str())?;
        let ws_dir = dir.join(workspace_id.as_str());
        let entries = match std::fs::read_dir(&ws_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            records.push(serde_json::from_slice::<WebhookErrorRecord>(&bytes)?);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}

#[async_trait]
impl ErrorLog for FileErrorLog {
    async fn append(&self, record: &WebhookErrorRecord) -> Result<()> {
        let dir = self.dir.clone();
        let owned = record.clone();
        tokio::task::spawn_blocking(move || Self::append_blocking(&dir, &owned)).await??;
        info!(
            workspace_id = %record.workspace_id,
            provider = %record.provider,
            record_id = %record.id,
            reason = %record.failed_reason,
            "Webhook error recorded for manual review"
        );
        Ok(())
    }

    async fn list(&self, workspace_id: &WorkspaceId) -> Result<Vec<WebhookErrorRecord>> {
        let dir = self.dir.clone();
        let ws = workspace_id.clone();
        Ok(tokio::task::spawn_blocking(move || Self::list_blocking(&dir, &ws)).await??)
    }
}

#[derive(Debug, Default)]
pub struct MemoryErrorLog {
    records: Mutex<Vec<WebhookErrorRecord>>,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<WebhookErrorRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WebhookErrorRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ErrorLog for MemoryErrorLog {
    async fn append(&self, record: &WebhookErrorRecord) -> Result<()> {
        self.lock().push(record.clone());
        Ok(())
    }

    async fn list(&self, workspace_id: &WorkspaceId) -> Result<Vec<WebhookErrorRecord>> {
        Ok(self
            .lock()
            .iter()
            .filter(|r| &r.workspace_id == workspace_id)
            .cloned()
            .collect())
    }
}
