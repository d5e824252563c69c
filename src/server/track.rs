//! Click, lead, sale, and thank-you ingress.
//!
//! Bodies are read as raw bytes and deserialized here so that every malformed
//! body is a 400 with the serde message, whatever the field.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequestParts, Query, State};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::info;

use super::provider::outcome_response;
use super::{ApiError, ApiWorkspace, AppState};
use crate::click::context::NO_TRACK_HEADER;
use crate::click::{self, ClickRequest, RequestContext, agent};
use crate::conversion::{self, SaleOutcome, TrackLeadRequest, TrackSaleRequest};
use crate::types::{AnonymousId, ClickEvent, ClickId, CustomerId};
use crate::webhooks::{ThankYouOutcome, ThankYouRequest, handle_thank_you};

pub(super) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    Ok(serde_json::from_slice(body)?)
}

fn is_automation_tool(headers: &HeaderMap) -> bool {
    agent::is_automation_tool(headers.get(USER_AGENT).and_then(|v| v.to_str().ok()))
}

/// The socket peer address, when the server was started with connect info.
pub struct PeerIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for PeerIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PeerIp(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string()),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackClickBody {
    pub domain: String,
    pub key: String,
    #[serde(default)]
    pub click_id: Option<ClickId>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anonymous_id: Option<AnonymousId>,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub skip_webhooks: bool,
}

/// `POST /track/click`. Answers the recorded click, or `null` when nothing
/// was recorded (no-track, bot, or a repeat inside the dedup window).
pub async fn click_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    PeerIp(peer_ip): PeerIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Option<ClickEvent>>, ApiError> {
    let body: TrackClickBody = parse_body(&body)?;
    let query_no_track = query
        .get(NO_TRACK_HEADER)
        .is_some_and(|v| matches!(v.as_str(), "1" | "true"));
    let ctx = RequestContext::from_headers(&headers, query_no_track, peer_ip);

    let link = click::resolve_link(state.pipeline(), &body.domain, &body.key).await?;
    let request = ClickRequest {
        click_id: body.click_id,
        url: body.url,
        anonymous_id: body.anonymous_id,
        customer_id: body.customer_id,
        skip_webhooks: body.skip_webhooks,
        ..ClickRequest::new(link)
    };
    Ok(Json(click::record_click(state.pipeline(), &ctx, request).await))
}

/// `POST /track/lead`.
pub async fn lead_handler(
    State(state): State<AppState>,
    ApiWorkspace(workspace_id): ApiWorkspace,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: TrackLeadRequest = parse_body(&body)?;
    let response = conversion::track_lead(state.pipeline(), &workspace_id, request)
        .await
        .map_err(|e| ApiError::from(e).soft_for(is_automation_tool(&headers)))?;
    Ok(Json(response).into_response())
}

/// `POST /track/sale`.
pub async fn sale_handler(
    State(state): State<AppState>,
    ApiWorkspace(workspace_id): ApiWorkspace,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: TrackSaleRequest = parse_body(&body)?;
    let event_name = request.event_name.clone();
    let outcome = conversion::track_sale(state.pipeline(), &workspace_id, request)
        .await
        .map_err(|e| ApiError::from(e).soft_for(is_automation_tool(&headers)))?;

    Ok(match outcome {
        SaleOutcome::Recorded(response) | SaleOutcome::NoCustomer(response) => {
            Json(response).into_response()
        }
        SaleOutcome::AlreadyProcessed { invoice_id } => {
            info!(workspace_id = %workspace_id, invoice_id = %invoice_id, "Sale already processed");
            Json(json!({
                "eventName": event_name,
                "customer": null,
                "sale": null,
                "alreadyProcessed": true,
            }))
            .into_response()
        }
    })
}

/// `POST /track/thank-you`. Answers 200 when a pending webhook converted,
/// 202 when the visitor was queued.
pub async fn thank_you_handler(
    State(state): State<AppState>,
    ApiWorkspace(workspace_id): ApiWorkspace,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: ThankYouRequest = parse_body(&body)?;
    match handle_thank_you(state.pipeline(), &workspace_id, request).await? {
        ThankYouOutcome::Converted(outcome) => Ok(outcome_response(&outcome)),
        ThankYouOutcome::Queued { entry_id } => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "status": "queued", "entryId": entry_id })),
        )
            .into_response()),
    }
}
