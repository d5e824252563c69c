//! Handlers for provider webhooks and thank-you page hits.
//!
//! | Provider | Event | Conversion |
//! |----------|-------|------------|
//! | `scheduling` | `BOOKING_CREATED` | lead, via [`crate::conversion::track_lead`] |
//! | `payment` | `checkout.completed` | sale, via [`crate::conversion::track_sale`] |
//!
//! An event carrying a `clickId` converts immediately. One without goes to
//! the thank-you reconciler, which either supplies a recent visitor's click
//! or defers the webhook until a visitor shows up.

mod payment;
mod scheduling;
mod thank_you;

use thiserror::Error;
use tracing::{debug, warn};

use super::events::{Provider, ProviderEvent};
use super::parser::{ParseError, parse_provider_event};
use super::signature::{derive_workspace_secret, verify_signature};
use crate::conversion::{ConversionError, LeadResponse, SaleOutcome};
use crate::pipeline::Pipeline;
use crate::reconcile::{self, ReconcileError, WebhookReconciliation};
use crate::types::{ClickId, WorkspaceId};

pub use thank_you::{ThankYouOutcome, ThankYouRequest, handle_thank_you};

pub const MISSING_CLICK_REASON: &str = "no clickId in payload and no visitor within the reconciliation window";

#[derive(Debug, Error)]
pub enum ProviderWebhookError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("missing signature header")]
    MissingSignature,

    #[error("signature does not match payload")]
    InvalidSignature,

    #[error("malformed payload: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("no click known for this visitor")]
    NoClick,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// The provider event does not produce a conversion.
    Ignored,
    Lead(LeadResponse),
    Sale(SaleOutcome),
    /// Waiting for a visitor hit.
    Deferred { entry_id: String },
}

/// Verifies, parses, and converts one provider webhook.
///
/// The signature is checked against the workspace secret derived from
/// `master_secret` before the body is looked at.
pub async fn handle_provider_webhook(
    pipeline: &Pipeline,
    master_secret: &[u8],
    provider: &str,
    workspace_id: &WorkspaceId,
    signature: Option<&str>,
    body: &[u8],
) -> Result<WebhookOutcome, ProviderWebhookError> {
    let provider = Provider::parse(provider)
        .ok_or_else(|| ProviderWebhookError::UnknownProvider(provider.to_string()))?;

    let signature = signature.ok_or(ProviderWebhookError::MissingSignature)?;
    let secret = derive_workspace_secret(master_secret, workspace_id);
    if !verify_signature(body, signature, secret.as_bytes()) {
        warn!(workspace_id = %workspace_id, provider = %provider, "Rejected provider webhook: bad signature");
        return Err(ProviderWebhookError::InvalidSignature);
    }

    let Some(event) = parse_provider_event(provider, body)? else {
        debug!(workspace_id = %workspace_id, provider = %provider, "Provider event ignored");
        return Ok(WebhookOutcome::Ignored);
    };

    if let Some(click_id) = event.click_id().cloned() {
        return Ok(process_event(pipeline, workspace_id, event, click_id).await?);
    }

    let raw: serde_json::Value = serde_json::from_slice(body).map_err(ParseError::from)?;
    match reconcile::handle_reconciliation(
        pipeline,
        workspace_id,
        provider.as_str(),
        raw,
        MISSING_CLICK_REASON,
    )
    .await?
    {
        WebhookReconciliation::Matched(hit) => {
            Ok(process_event(pipeline, workspace_id, event, hit.click_id).await?)
        }
        WebhookReconciliation::Deferred { entry_id } => Ok(WebhookOutcome::Deferred { entry_id }),
    }
}

/// Converts a provider event attributed to `click_id`.
pub async fn process_event(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    event: ProviderEvent,
    click_id: ClickId,
) -> Result<WebhookOutcome, ConversionError> {
    match event {
        ProviderEvent::BookingCreated(booking) => {
            scheduling::convert(pipeline, workspace_id, booking, click_id).await
        }
        ProviderEvent::CheckoutCompleted(checkout) => {
            payment::convert(pipeline, workspace_id, checkout, click_id).await
        }
    }
}
