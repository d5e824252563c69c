//! Links, workspaces, and outbound webhook registrations.
//!
//! These are owned by the (out of scope) admin surface; the pipeline only
//! reads them and bumps their counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{Currency, LinkId, WebhookId, WorkspaceId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: LinkId,
    pub workspace_id: WorkspaceId,
    pub domain: String,
    pub key: String,
    pub url: String,
    /// Set when the link belongs to a partner program.
    #[serde(default)]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub leads: u64,
    #[serde(default)]
    pub sales: u64,
    #[serde(default)]
    pub sale_amount: i64,
}

impl Link {
    /// The short link as shown to users (`domain/key`).
    pub fn short_link(&self) -> String {
        format!("{}/{}", self.domain, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    /// Billable events (clicks, leads, sales) in the current period.
    #[serde(default)]
    pub usage: u64,
    pub usage_limit: u64,
    #[serde(default = "Currency::usd")]
    pub reporting_currency: Currency,
    #[serde(default)]
    pub total_clicks: u64,
    #[serde(default)]
    pub total_leads: u64,
    #[serde(default)]
    pub total_sales: u64,
    #[serde(default)]
    pub total_sale_amount: i64,
}

impl Workspace {
    pub fn usage_exceeded(&self) -> bool {
        self.usage > self.usage_limit
    }
}

/// Outbound webhook triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookTrigger {
    #[serde(rename = "link.clicked")]
    LinkClicked,
    #[serde(rename = "lead.created")]
    LeadCreated,
    #[serde(rename = "sale.created")]
    SaleCreated,
}

impl WebhookTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookTrigger::LinkClicked => "link.clicked",
            WebhookTrigger::LeadCreated => "lead.created",
            WebhookTrigger::SaleCreated => "sale.created",
        }
    }
}

impl fmt::Display for WebhookTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workspace-configured outbound webhook.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub id: WebhookId,
    pub workspace_id: WorkspaceId,
    pub url: String,
    /// Signing secret for outbound payloads.
    pub secret: String,
    pub triggers: Vec<WebhookTrigger>,
    /// Links this webhook listens to for `link.clicked`.
    #[serde(default)]
    pub link_ids: Vec<LinkId>,
    #[serde(default)]
    pub disabled_at: Option<DateTime<Utc>>,
}

impl WebhookConfig {
    pub fn is_active(&self) -> bool {
        self.disabled_at.is_none()
    }

    /// Whether this webhook should receive `trigger` (for `link`, if link-scoped).
    pub fn wants(&self, trigger: WebhookTrigger, link: Option<&LinkId>) -> bool {
        if !self.is_active() || !self.triggers.contains(&trigger) {
            return false;
        }
        match trigger {
            WebhookTrigger::LinkClicked => link.is_some_and(|l| self.link_ids.contains(l)),
            WebhookTrigger::LeadCreated | WebhookTrigger::SaleCreated => true,
        }
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("id", &self.id)
            .field("workspace_id", &self.workspace_id)
            .field("url", &self.url)
            .field("triggers", &self.triggers)
            .field("link_ids", &self.link_ids)
            .field("disabled_at", &self.disabled_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(triggers: Vec<WebhookTrigger>, link_ids: Vec<LinkId>) -> WebhookConfig {
        WebhookConfig {
            id: WebhookId::new("wh_1"),
            workspace_id: WorkspaceId::new("ws_1"),
            url: "https://example.com/hook".to_string(),
            secret: "whsec".to_string(),
            triggers,
            link_ids,
            disabled_at: None,
        }
    }

    #[test]
    fn link_clicked_requires_explicit_link() {
        let wh = webhook(vec![WebhookTrigger::LinkClicked], vec![LinkId::new("l1")]);
        assert!(wh.wants(WebhookTrigger::LinkClicked, Some(&LinkId::new("l1"))));
        assert!(!wh.wants(WebhookTrigger::LinkClicked, Some(&LinkId::new("l2"))));
        assert!(!wh.wants(WebhookTrigger::LinkClicked, None));
    }

    #[test]
    fn workspace_triggers_ignore_link_scope() {
        let wh = webhook(vec![WebhookTrigger::SaleCreated], vec![]);
        assert!(wh.wants(WebhookTrigger::SaleCreated, None));
        assert!(!wh.wants(WebhookTrigger::LeadCreated, None));
    }

    #[test]
    fn disabled_webhooks_want_nothing() {
        let mut wh = webhook(vec![WebhookTrigger::LeadCreated], vec![]);
        wh.disabled_at = Some(Utc::now());
        assert!(!wh.wants(WebhookTrigger::LeadCreated, None));
    }

    #[test]
    fn debug_hides_secret() {
        let wh = webhook(vec![WebhookTrigger::LeadCreated], vec![]);
        assert!(!format!("{wh:?}").contains("whsec"));
    }

    #[test]
    fn trigger_serializes_with_dotted_names() {
        let json = serde_json::to_string(&WebhookTrigger::SaleCreated).unwrap();
        assert_eq!(json, "\"sale.created\"");
    }
}
