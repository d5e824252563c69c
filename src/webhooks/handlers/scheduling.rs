//! Booking created -> lead.

use serde_json::json;

use super::WebhookOutcome;
use crate::conversion::{ConversionError, LeadMode, TrackLeadRequest, track_lead};
use crate::pipeline::Pipeline;
use crate::types::{ClickId, WorkspaceId};
use crate::webhooks::events::{BookingCreated, Provider};

pub(super) async fn convert(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    booking: BookingCreated,
    click_id: ClickId,
) -> Result<WebhookOutcome, ConversionError> {
    let request = TrackLeadRequest {
        click_id,
        event_name: booking.event_name,
        external_id: booking.external_id,
        customer_name: booking.name,
        customer_email: booking.email,
        customer_avatar: None,
        event_quantity: 1,
        metadata: json!({
            "provider": Provider::Scheduling.as_str(),
            "bookingId": booking.booking_id,
        }),
        mode: LeadMode::Sync,
    };
    let response = track_lead(pipeline, workspace_id, request).await?;
    Ok(WebhookOutcome::Lead(response))
}
