//! Provider webhook payload parser.
//!
//! # Parsing Strategy
//!
//! 1. The provider comes from the route (`/webhooks/{provider}/...`)
//! 2. The payload's own event type field selects the event
//! 3. Event types that do not convert return `Ok(None)` (ignored, not error)
//! 4. Malformed payloads return `Err` with details
//!
//! # Payloads
//!
//! `scheduling`:
//!
//! ```json
//! { "triggerEvent": "BOOKING_CREATED",
//!   "payload": { "uid": "bk_1", "title": "Intro call",
//!                "attendee": { "name": "Ada", "email": "ada@example.com" },
//!                "clickId": "clk_1" } }
//! ```
//!
//! `payment`:
//!
//! ```json
//! { "type": "checkout.completed",
//!   "data": { "id": "cs_1", "invoiceId": "inv_42", "amount": 4900, "currency": "usd",
//!             "customer": { "externalId": "u1", "name": "Ada", "email": "ada@example.com" },
//!             "clickId": "clk_1" } }
//! ```
//!
//! `clickId` is optional in both; without it the event goes through the
//! thank-you reconciler.

use serde::Deserialize;
use thiserror::Error;

use super::events::{BookingCreated, CheckoutCompleted, Provider, ProviderEvent};
use crate::types::{ClickId, Currency, ExternalId, InvoiceId};

#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

const BOOKING_CREATED: &str = "BOOKING_CREATED";
const CHECKOUT_COMPLETED: &str = "checkout.completed";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchedulingEnvelope {
    trigger_event: String,
    #[serde(default)]
    payload: Option<Booking>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Booking {
    uid: String,
    #[serde(default)]
    title: Option<String>,
    attendee: Attendee,
    #[serde(default)]
    click_id: Option<String>,
}

#[derive(Deserialize)]
struct Attendee {
    #[serde(default)]
    name: Option<String>,
    email: String,
}

#[derive(Deserialize)]
struct PaymentEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Checkout>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Checkout {
    id: String,
    #[serde(default)]
    invoice_id: Option<String>,
    amount: i64,
    currency: String,
    customer: CheckoutCustomer,
    #[serde(default)]
    click_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutCustomer {
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parses a provider payload into a typed event.
///
/// # Examples
///
/// ```
/// use linktrack::webhooks::{Provider, parse_provider_event};
///
/// let payload = br#"{
///     "triggerEvent": "BOOKING_CREATED",
///     "payload": {
///         "uid": "bk_1",
///         "title": "Intro call",
///         "attendee": { "name": "Ada", "email": "ada@example.com" }
///     }
/// }"#;
///
/// let event = parse_provider_event(Provider::Scheduling, payload).unwrap().unwrap();
/// assert!(event.click_id().is_none());
/// ```
pub fn parse_provider_event(
    provider: Provider,
    payload: &[u8],
) -> Result<Option<ProviderEvent>, ParseError> {
    match provider {
        Provider::Scheduling => parse_scheduling(payload),
        Provider::Payment => parse_payment(payload),
    }
}

fn parse_scheduling(payload: &[u8]) -> Result<Option<ProviderEvent>, ParseError> {
    let envelope: SchedulingEnvelope = serde_json::from_slice(payload)?;
    if envelope.trigger_event != BOOKING_CREATED {
        return Ok(None);
    }
    let booking = envelope.payload.ok_or(ParseError::InvalidField {
        field: "payload",
        value: "missing".to_string(),
    })?;
    let email = booking.attendee.email.trim().to_string();
    if email.is_empty() {
        return Err(ParseError::InvalidField {
            field: "payload.attendee.email",
            value: booking.attendee.email,
        });
    }
    Ok(Some(ProviderEvent::BookingCreated(BookingCreated {
        booking_id: booking.uid,
        event_name: non_empty(booking.title).unwrap_or_else(|| "Booking".to_string()),
        external_id: ExternalId::new(email.clone()),
        name: non_empty(booking.attendee.name),
        email: Some(email),
        click_id: non_empty(booking.click_id).map(ClickId::new),
    })))
}

fn parse_payment(payload: &[u8]) -> Result<Option<ProviderEvent>, ParseError> {
    let envelope: PaymentEnvelope = serde_json::from_slice(payload)?;
    if envelope.kind != CHECKOUT_COMPLETED {
        return Ok(None);
    }
    let checkout = envelope.data.ok_or(ParseError::InvalidField {
        field: "data",
        value: "missing".to_string(),
    })?;
    let currency = Currency::parse(&checkout.currency).map_err(|_| ParseError::InvalidField {
        field: "data.currency",
        value: checkout.currency.clone(),
    })?;
    if checkout.amount < 0 {
        return Err(ParseError::InvalidField {
            field: "data.amount",
            value: checkout.amount.to_string(),
        });
    }
    let email = non_empty(checkout.customer.email);
    let external_id = non_empty(checkout.customer.external_id)
        .or_else(|| email.clone())
        .ok_or(ParseError::InvalidField {
            field: "data.customer",
            value: "needs externalId or email".to_string(),
        })?;
    Ok(Some(ProviderEvent::CheckoutCompleted(CheckoutCompleted {
        invoice_id: InvoiceId::new(non_empty(checkout.invoice_id).unwrap_or_else(|| checkout.id.clone())),
        checkout_id: checkout.id,
        amount: checkout.amount,
        currency,
        external_id: ExternalId::new(external_id),
        name: non_empty(checkout.customer.name),
        email,
        click_id: non_empty(checkout.click_id).map(ClickId::new),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bytes(v: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn booking_created_parses() {
        let event = parse_provider_event(
            Provider::Scheduling,
            &bytes(json!({
                "triggerEvent": "BOOKING_CREATED",
                "payload": {
                    "uid": "bk_1",
                    "title": "Intro call",
                    "attendee": {"name": "Ada", "email": " ada@example.com "},
                    "clickId": "clk_1"
                }
            })),
        )
        .unwrap()
        .unwrap();
        let ProviderEvent::BookingCreated(b) = event else {
            panic!("wrong event");
        };
        assert_eq!(b.external_id, ExternalId::new("ada@example.com"));
        assert_eq!(b.event_name, "Intro call");
        assert_eq!(b.click_id, Some(ClickId::new("clk_1")));
    }

    #[test]
    fn other_scheduling_events_are_ignored() {
        let result = parse_provider_event(
            Provider::Scheduling,
            &bytes(json!({"triggerEvent": "BOOKING_CANCELLED"})),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn checkout_completed_parses() {
        let event = parse_provider_event(
            Provider::Payment,
            &bytes(json!({
                "type": "checkout.completed",
                "data": {
                    "id": "cs_1",
                    "amount": 4900,
                    "currency": "eur",
                    "customer": {"email": "ada@example.com"},
                    "clickId": ""
                }
            })),
        )
        .unwrap()
        .unwrap();
        let ProviderEvent::CheckoutCompleted(c) = event else {
            panic!("wrong event");
        };
        assert_eq!(c.invoice_id, InvoiceId::new("cs_1"));
        assert_eq!(c.currency.as_str(), "EUR");
        assert_eq!(c.external_id, ExternalId::new("ada@example.com"));
        assert_eq!(c.click_id, None);
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(matches!(
            parse_provider_event(Provider::Payment, b"not json"),
            Err(ParseError::Json(_))
        ));
        assert!(matches!(
            parse_provider_event(
                Provider::Payment,
                &bytes(json!({
                    "type": "checkout.completed",
                    "data": {"id": "cs_1", "amount": 1, "currency": "dollars", "customer": {"externalId": "u1"}}
                }))
            ),
            Err(ParseError::InvalidField { field: "data.currency", .. })
        ));
        assert!(matches!(
            parse_provider_event(
                Provider::Payment,
                &bytes(json!({
                    "type": "checkout.completed",
                    "data": {"id": "cs_1", "amount": 1, "currency": "usd", "customer": {}}
                }))
            ),
            Err(ParseError::InvalidField { field: "data.customer", .. })
        ));
    }

    #[test]
    fn provider_names() {
        assert_eq!(Provider::parse("payment"), Some(Provider::Payment));
        assert_eq!(Provider::parse("crm"), None);
        assert_eq!(Provider::Scheduling.to_string(), "scheduling");
    }
}
