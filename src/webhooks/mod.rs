//! Inbound provider webhooks and the thank-you page.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256), also used to
//!   sign outbound workspace webhooks
//! - Typed provider events and their parser
//! - Handlers that turn provider events into leads and sales, reconciling
//!   events that arrive without a click id

pub mod events;
pub mod handlers;
pub mod parser;
pub mod signature;

pub use events::{BookingCreated, CheckoutCompleted, Provider, ProviderEvent};
pub use handlers::{
    ProviderWebhookError, ThankYouOutcome, ThankYouRequest, WebhookOutcome,
    handle_provider_webhook, handle_thank_you, process_event,
};
pub use parser::{ParseError, parse_provider_event};
pub use signature::{
    SIGNATURE_HEADER, compute_signature, derive_workspace_secret, format_signature_header,
    parse_signature_header, sign, verify_signature,
};
