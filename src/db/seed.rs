//! Development seed data for [`MemoryDatabase`].
//!
//! Workspace and link administration is owned elsewhere; a local instance
//! is populated from a JSON file instead:
//!
//! ```json
//! {
//!   "workspaces": [{"id": "ws_1", "name": "Acme", "usageLimit": 1000}],
//!   "apiKeys": {"lt_test_key": "ws_1"},
//!   "links": [{"id": "link_1", "workspaceId": "ws_1", "domain": "acme.link",
//!              "key": "promo", "url": "https://acme.com"}],
//!   "webhooks": []
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::MemoryDatabase;
use crate::types::{Link, WebhookConfig, Workspace, WorkspaceId};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid seed file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} {id} references unknown workspace {workspace}")]
    UnknownWorkspace {
        kind: &'static str,
        id: String,
        workspace: WorkspaceId,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
    #[serde(default)]
    pub api_keys: BTreeMap<String, WorkspaceId>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

impl Seed {
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let bytes = std::fs::read(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| SeedError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks that every row points at a seeded workspace.
    pub fn validate(&self) -> Result<(), SeedError> {
        let known = |ws: &WorkspaceId| self.workspaces.iter().any(|w| &w.id == ws);
        for (key, ws) in &self.api_keys {
            if !known(ws) {
                // The key itself is a credential; identify it by length only.
                return Err(SeedError::UnknownWorkspace {
                    kind: "api key",
                    id: format!("<{} chars>", key.len()),
                    workspace: ws.clone(),
                });
            }
        }
        for link in &self.links {
            if !known(&link.workspace_id) {
                return Err(SeedError::UnknownWorkspace {
                    kind: "link",
                    id: link.id.to_string(),
                    workspace: link.workspace_id.clone(),
                });
            }
        }
        for hook in &self.webhooks {
            if !known(&hook.workspace_id) {
                return Err(SeedError::UnknownWorkspace {
                    kind: "webhook",
                    id: hook.id.to_string(),
                    workspace: hook.workspace_id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn apply(self, db: &MemoryDatabase) -> Result<(), SeedError> {
        self.validate()?;
        info!(
            workspaces = self.workspaces.len(),
            links = self.links.len(),
            webhooks = self.webhooks.len(),
            "Seeding database"
        );
        for ws in self.workspaces {
            db.insert_workspace(ws);
        }
        for (key, ws) in self.api_keys {
            db.insert_api_key(key, ws);
        }
        for link in self.links {
            db.insert_link(link);
        }
        for hook in self.webhooks {
            db.insert_webhook(hook);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::io::Write;

    const SEED: &str = r#"{
        "workspaces": [{"id": "ws_1", "name": "Acme", "usageLimit": 1000}],
        "apiKeys": {"lt_key": "ws_1"},
        "links": [{"id": "link_1", "workspaceId": "ws_1", "domain": "acme.link",
                   "key": "promo", "url": "https://acme.com"}],
        "webhooks": [{"id": "wh_1", "workspaceId": "ws_1", "url": "https://hooks.acme.com",
                      "secret": "s", "triggers": ["sale.created"]}]
    }"#;

    #[tokio::test]
    async fn load_and_apply() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();

        let db = MemoryDatabase::new();
        Seed::load(file.path()).unwrap().apply(&db).unwrap();

        let ws = db.get_workspace(&"ws_1".into()).await.unwrap().unwrap();
        assert_eq!(ws.reporting_currency.as_str(), "USD");
        assert_eq!(
            db.workspace_for_api_key("lt_key").await.unwrap(),
            Some(WorkspaceId::new("ws_1"))
        );
        assert!(db.find_link("acme.link", "promo").await.unwrap().is_some());
        assert_eq!(db.list_webhooks(&"ws_1".into()).await.unwrap().len(), 1);
    }

    #[test]
    fn rejects_dangling_workspace_reference() {
        let seed: Seed = serde_json::from_str(
            r#"{"links": [{"id": "l", "workspaceId": "ghost", "domain": "d", "key": "k", "url": "u"}]}"#,
        )
        .unwrap();
        let err = seed.validate().unwrap_err();
        assert!(matches!(err, SeedError::UnknownWorkspace { kind: "link", .. }));
    }

    #[test]
    fn api_key_never_appears_in_error() {
        let seed: Seed = serde_json::from_str(r#"{"apiKeys": {"super_secret": "ghost"}}"#).unwrap();
        let msg = seed.validate().unwrap_err().to_string();
        assert!(!msg.contains("super_secret"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Seed::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, SeedError::Io { .. }));
    }
}
