//! Customer rows.
//!
//! A customer is unique per `(workspace_id, external_id)`. It is created on the
//! first conversion signal for that identity and updated in place afterwards;
//! its acquisition `click_id`/`link_id` never change once set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ClickId, CustomerId, ExternalId, LinkId, WorkspaceId};

/// The kind of the most recent event seen for a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Click,
    Lead,
    Sale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub workspace_id: WorkspaceId,
    pub external_id: ExternalId,
    pub name: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub country: Option<String>,

    /// Acquisition attribution. First click wins.
    pub click_id: Option<ClickId>,
    pub link_id: Option<LinkId>,

    pub total_clicks: u64,
    pub leads: u64,
    pub sales: u64,
    /// Lifetime revenue in the workspace reporting currency, minor units.
    pub sale_amount: i64,

    pub last_event_at: Option<DateTime<Utc>>,
    pub last_activity_type: Option<ActivityType>,
    pub hot_score: u8,
    /// The 0-100 engagement `hot_score` was rounded from. Tiers use this.
    #[serde(default)]
    pub hot_score_raw: u8,
    pub last_hot_score_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// True when neither a lead nor a sale has been counted for this customer.
    pub fn has_no_conversions(&self) -> bool {
        self.leads == 0 && self.sales == 0
    }
}

/// Fields for creating a customer on first sight.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub workspace_id: WorkspaceId,
    pub external_id: ExternalId,
    pub name: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub country: Option<String>,
    pub click_id: Option<ClickId>,
    pub link_id: Option<LinkId>,
    pub created_at: DateTime<Utc>,
}

impl NewCustomer {
    /// Builds the full row for an insert.
    pub fn into_customer(self) -> Customer {
        Customer {
            id: CustomerId::generate(),
            workspace_id: self.workspace_id,
            external_id: self.external_id,
            name: self.name,
            email: self.email,
            avatar: self.avatar,
            country: self.country,
            click_id: self.click_id,
            link_id: self.link_id,
            total_clicks: 0,
            leads: 0,
            sales: 0,
            sale_amount: 0,
            last_event_at: None,
            last_activity_type: None,
            hot_score: 0,
            hot_score_raw: 0,
            last_hot_score_at: None,
            created_at: self.created_at,
        }
    }
}

/// An in-place activity update for a customer.
///
/// Counters are applied as increments by the database, never as
/// read-modify-write by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomerActivity {
    pub activity: ActivityType,
    pub at: DateTime<Utc>,
    pub clicks: u64,
    pub leads: u64,
    pub sales: u64,
    pub sale_amount: i64,
}

impl CustomerActivity {
    pub fn click(at: DateTime<Utc>) -> Self {
        CustomerActivity {
            activity: ActivityType::Click,
            at,
            clicks: 1,
            leads: 0,
            sales: 0,
            sale_amount: 0,
        }
    }

    pub fn lead(at: DateTime<Utc>, quantity: u64) -> Self {
        CustomerActivity {
            activity: ActivityType::Lead,
            at,
            clicks: 0,
            leads: quantity,
            sales: 0,
            sale_amount: 0,
        }
    }

    pub fn sale(at: DateTime<Utc>, amount: i64) -> Self {
        CustomerActivity {
            activity: ActivityType::Sale,
            at,
            clicks: 0,
            leads: 0,
            sales: 1,
            sale_amount: amount,
        }
    }
}
