//! Checkout completed -> sale.
//!
//! A checkout may be the first thing we hear about a customer. When no
//! customer exists yet, one is created from the attributed click so the sale
//! has someone to belong to.

use serde_json::json;
use tracing::info;

use super::WebhookOutcome;
use crate::click;
use crate::conversion::lead::{display_name, ensure_customer};
use crate::conversion::{ConversionError, TrackSaleRequest, track_sale};
use crate::pipeline::Pipeline;
use crate::types::{ClickId, WorkspaceId};
use crate::webhooks::events::{CheckoutCompleted, Provider};

pub(super) async fn convert(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    checkout: CheckoutCompleted,
    click_id: ClickId,
) -> Result<WebhookOutcome, ConversionError> {
    if pipeline
        .db
        .find_customer(workspace_id, &checkout.external_id)
        .await?
        .is_none()
    {
        let click = click::find_click(pipeline, &click_id)
            .await
            .filter(|c| &c.workspace_id == workspace_id)
            .ok_or_else(|| ConversionError::ClickNotFound(click_id.clone()))?;
        let name = checkout
            .name
            .clone()
            .unwrap_or_else(|| display_name(&checkout.external_id));
        let customer = ensure_customer(
            pipeline,
            &click,
            &checkout.external_id,
            name,
            checkout.email.clone(),
            None,
        )
        .await?;
        info!(
            workspace_id = %workspace_id,
            customer_id = %customer.id,
            "Customer created from checkout"
        );
    }

    let request = TrackSaleRequest {
        external_id: checkout.external_id,
        invoice_id: Some(checkout.invoice_id),
        amount: checkout.amount,
        currency: checkout.currency,
        payment_processor: Provider::Payment.as_str().to_string(),
        event_name: "Purchase".to_string(),
        lead_event_name: None,
        metadata: json!({
            "provider": Provider::Payment.as_str(),
            "checkoutId": checkout.checkout_id,
        }),
    };
    let outcome = track_sale(pipeline, workspace_id, request).await?;
    Ok(WebhookOutcome::Sale(outcome))
}
