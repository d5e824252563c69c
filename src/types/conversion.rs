//! Append-only conversion facts and reconciliation failure records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ClickId, Currency, CustomerId, InvoiceId, LinkId, WorkspaceId};

/// A lead conversion: an anonymous click became an identified contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadEvent {
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
    pub event_name: String,
    pub workspace_id: WorkspaceId,
    pub customer_id: CustomerId,
    pub click_id: ClickId,
    pub link_id: LinkId,
    pub quantity: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A sale conversion. `amount` is in the workspace reporting currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleEvent {
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
    pub event_name: String,
    pub workspace_id: WorkspaceId,
    pub customer_id: CustomerId,
    pub click_id: ClickId,
    pub link_id: LinkId,
    /// Minor units of `currency`.
    pub amount: i64,
    pub currency: Currency,
    /// Amount as reported by the caller, before FX conversion.
    pub original_amount: i64,
    pub original_currency: Currency,
    pub invoice_id: Option<InvoiceId>,
    pub payment_processor: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A provider webhook that could not be reconciled, kept for manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookErrorRecord {
    pub id: String,
    pub workspace_id: WorkspaceId,
    pub provider: String,
    pub raw_payload: serde_json::Value,
    pub failed_reason: String,
    pub created_at: DateTime<Utc>,
}

/// Generates an id for an appended event row.
pub fn new_event_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
