//! Typed provider webhook events.
//!
//! Only the events that produce conversions are represented; everything else
//! a provider sends is ignored by the parser.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ClickId, Currency, ExternalId, InvoiceId};

/// A conversion source that posts signed webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Booking tool; a created booking is a lead.
    Scheduling,
    /// Checkout; a completed checkout is a sale.
    Payment,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Provider> {
        match s {
            "scheduling" => Some(Provider::Scheduling),
            "payment" => Some(Provider::Payment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Scheduling => "scheduling",
            Provider::Payment => "payment",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEvent {
    BookingCreated(BookingCreated),
    CheckoutCompleted(CheckoutCompleted),
}

impl ProviderEvent {
    /// The click id the provider passed through, if the visitor carried one.
    pub fn click_id(&self) -> Option<&ClickId> {
        match self {
            ProviderEvent::BookingCreated(e) => e.click_id.as_ref(),
            ProviderEvent::CheckoutCompleted(e) => e.click_id.as_ref(),
        }
    }

    pub fn external_id(&self) -> &ExternalId {
        match self {
            ProviderEvent::BookingCreated(e) => &e.external_id,
            ProviderEvent::CheckoutCompleted(e) => &e.external_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCreated {
    pub booking_id: String,
    pub event_name: String,
    /// The attendee email.
    pub external_id: ExternalId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub click_id: Option<ClickId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCompleted {
    pub checkout_id: String,
    /// Falls back to the checkout id when the provider sends no invoice.
    pub invoice_id: InvoiceId,
    /// Minor units of `currency`.
    pub amount: i64,
    pub currency: Currency,
    pub external_id: ExternalId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub click_id: Option<ClickId>,
}
