//! Key builders for the keyed store.
//!
//! All keys are scoped by workspace, or by domain+key+ip for click dedup, so
//! tenants never contend on the same key.
//!
//! # Key formats
//!
//! - click dedup: `recordClick:<domain>:<key>:<ip>`
//! - click cache: `clickIdCache:<clickId>`
//! - last click: `lastClick:<workspaceId>:<anonymousId>`
//! - lead cache: `leadCache:<customerId>`
//! - lead dedup: `trackLead:<workspaceId>:<externalId>:<eventName>`
//! - sale dedup: `trackSale:<workspaceId>:invoiceId:<invoiceId>`
//! - reconciliation queues: `thankYou:waiting:<workspaceId>`, `thankYou:pending:<workspaceId>`
//! - recent activity: `recentActivity:<workspaceId>`
//! - hot-score throttle: `hotScore:<workspaceId>:<customerId>`
//!
//! Caller-controlled segments are escaped (`\` -> `\\`, `:` -> `\:`) so that a
//! value containing the separator cannot collide with another key.

use crate::types::{AnonymousId, ClickId, CustomerId, ExternalId, InvoiceId, WorkspaceId};

fn escape(segment: &str) -> String {
    segment.replace('\\', "\\\\").replace(':', "\\:")
}

pub fn click_dedup(domain: &str, key: &str, ip: &str) -> String {
    format!(
        "recordClick:{}:{}:{}",
        escape(domain),
        escape(key),
        escape(ip)
    )
}

pub fn click_cache(click_id: &ClickId) -> String {
    format!("clickIdCache:{}", escape(click_id.as_str()))
}

pub fn last_click(workspace: &WorkspaceId, anonymous_id: &AnonymousId) -> String {
    format!(
        "lastClick:{}:{}",
        escape(workspace.as_str()),
        escape(anonymous_id.as_str())
    )
}

pub fn lead_cache(customer: &CustomerId) -> String {
    format!("leadCache:{}", escape(customer.as_str()))
}

/// `event_name` must already be normalized.
pub fn lead_dedup(workspace: &WorkspaceId, external_id: &ExternalId, event_name: &str) -> String {
    format!(
        "trackLead:{}:{}:{}",
        escape(workspace.as_str()),
        escape(external_id.as_str()),
        escape(event_name)
    )
}

pub fn sale_dedup(workspace: &WorkspaceId, invoice_id: &InvoiceId) -> String {
    format!(
        "trackSale:{}:invoiceId:{}",
        escape(workspace.as_str()),
        escape(invoice_id.as_str())
    )
}

pub fn waiting_conversions(workspace: &WorkspaceId) -> String {
    format!("thankYou:waiting:{}", escape(workspace.as_str()))
}

pub fn pending_webhooks(workspace: &WorkspaceId) -> String {
    format!("thankYou:pending:{}", escape(workspace.as_str()))
}

pub fn recent_activity(workspace: &WorkspaceId) -> String {
    format!("recentActivity:{}", escape(workspace.as_str()))
}

pub fn hot_score_throttle(workspace: &WorkspaceId, customer: &CustomerId) -> String {
    format!(
        "hotScore:{}:{}",
        escape(workspace.as_str()),
        escape(customer.as_str())
    )
}
