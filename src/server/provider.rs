//! Provider webhook ingress and the webhook registry invalidation hook.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::debug;

use super::{ApiError, ApiWorkspace, AppState};
use crate::conversion::SaleOutcome;
use crate::types::WorkspaceId;
use crate::webhooks::{SIGNATURE_HEADER, WebhookOutcome, handle_provider_webhook};

/// Renders a conversion outcome. Deferred webhooks answer 202.
pub(super) fn outcome_response(outcome: &WebhookOutcome) -> Response {
    let body = match outcome {
        WebhookOutcome::Ignored => json!({ "status": "ignored" }),
        WebhookOutcome::Lead(lead) => json!({ "status": "lead", "lead": lead }),
        WebhookOutcome::Sale(SaleOutcome::Recorded(sale)) => json!({ "status": "sale", "sale": sale }),
        WebhookOutcome::Sale(SaleOutcome::AlreadyProcessed { invoice_id }) => {
            json!({ "status": "already_processed", "invoiceId": invoice_id })
        }
        WebhookOutcome::Sale(SaleOutcome::NoCustomer(sale)) => {
            json!({ "status": "no_customer", "sale": sale })
        }
        WebhookOutcome::Deferred { entry_id } => {
            return (
                StatusCode::ACCEPTED,
                Json(json!({ "status": "deferred", "entryId": entry_id })),
            )
                .into_response();
        }
    };
    Json(body).into_response()
}

/// `POST /webhooks/{provider}/{workspace_id}`.
///
/// The signature in [`SIGNATURE_HEADER`] is checked against the raw body
/// before anything else.
pub async fn provider_webhook_handler(
    State(state): State<AppState>,
    Path((provider, workspace_id)): Path<(String, WorkspaceId)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    debug!(provider = %provider, workspace_id = %workspace_id, bytes = body.len(), "Received provider webhook");
    let outcome = handle_provider_webhook(
        state.pipeline(),
        state.master_secret(),
        &provider,
        &workspace_id,
        signature,
        &body,
    )
    .await?;
    Ok(outcome_response(&outcome))
}

/// `POST /workspaces/{workspace_id}/webhooks/invalidate`.
///
/// Called by the webhook admin after it changes a workspace's registrations.
pub async fn invalidate_webhooks_handler(
    State(state): State<AppState>,
    ApiWorkspace(caller): ApiWorkspace,
    Path(workspace_id): Path<WorkspaceId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if caller != workspace_id {
        return Err(ApiError::Unauthorized("API key does not belong to this workspace"));
    }
    let invalidated = state.pipeline().webhooks.invalidate(&workspace_id).await;
    Ok(Json(json!({ "invalidated": invalidated })))
}
