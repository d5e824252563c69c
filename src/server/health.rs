//! Health check endpoint for liveness probes.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use super::AppState;

/// Returns 200 with the background job counters.
///
/// ```ignore
/// GET /health HTTP/1.1
///
/// HTTP/1.1 200 OK
///
/// {"status":"ok","jobs":{"submitted":12,"succeeded":11,"failed":1}}
/// ```
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "jobs": state.pipeline().jobs.stats(),
    }))
}
