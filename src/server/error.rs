//! HTTP error mapping.
//!
//! | Error | Status |
//! |-------|--------|
//! | malformed body, invalid field, unsupported currency | 400 |
//! | missing/unknown API key, bad or missing signature | 401 |
//! | unknown link, click, lead, customer, provider | 404 |
//! | FX service unavailable | 502 |
//! | everything else | 500 |
//!
//! Not-found conversions from automation tools answer `200` with
//! `{"success": false, "error": ...}` instead; see [`ApiError::soft_for`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::click::ClickError;
use crate::conversion::{ConversionError, FxError};
use crate::db::DbError;
use crate::hotscore::HotScoreError;
use crate::webhooks::ProviderWebhookError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),

    /// A not-found reported to a caller that cannot handle non-2xx answers.
    #[error("{0}")]
    Soft(String),
}

impl ApiError {
    /// Downgrades not-found errors to [`ApiError::Soft`] for automation tools.
    pub fn soft_for(self, automation_tool: bool) -> Self {
        match self {
            ApiError::NotFound(message) if automation_tool => ApiError::Soft(message),
            other => other,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.to_string()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal(m) => {
                error!(error = %m, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            ApiError::Soft(m) => {
                return (StatusCode::OK, Json(json!({ "success": false, "error": m })))
                    .into_response();
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("invalid JSON body: {e}"))
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            DbError::Backend(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ClickError> for ApiError {
    fn from(e: ClickError) -> Self {
        match e {
            ClickError::LinkNotFound { .. } => ApiError::NotFound(e.to_string()),
            ClickError::Db(db) => db.into(),
        }
    }
}

impl From<ConversionError> for ApiError {
    fn from(e: ConversionError) -> Self {
        match &e {
            ConversionError::Invalid(_) => ApiError::BadRequest(e.to_string()),
            _ if e.is_not_found() => ApiError::NotFound(e.to_string()),
            ConversionError::Fx(FxError::MissingRate { .. } | FxError::InvalidRate { .. }) => {
                ApiError::BadRequest(e.to_string())
            }
            ConversionError::Fx(_) => ApiError::BadGateway(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ProviderWebhookError> for ApiError {
    fn from(e: ProviderWebhookError) -> Self {
        match e {
            ProviderWebhookError::UnknownProvider(_) | ProviderWebhookError::NoClick => {
                ApiError::NotFound(e.to_string())
            }
            ProviderWebhookError::MissingSignature => ApiError::Unauthorized("missing signature"),
            ProviderWebhookError::InvalidSignature => ApiError::Unauthorized("invalid signature"),
            ProviderWebhookError::Parse(_) => ApiError::BadRequest(e.to_string()),
            ProviderWebhookError::Conversion(inner) => inner.into(),
            ProviderWebhookError::Reconcile(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<HotScoreError> for ApiError {
    fn from(e: HotScoreError) -> Self {
        match e {
            HotScoreError::CustomerNotFound(_) => ApiError::NotFound(e.to_string()),
            HotScoreError::Db(db) => db.into(),
            HotScoreError::Store(_) => ApiError::Internal(e.to_string()),
        }
    }
}
