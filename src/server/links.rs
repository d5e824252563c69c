//! Destination URL checks.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;

use super::track::parse_body;
use super::{ApiError, ApiWorkspace, AppState};
use crate::probe::{ProbeReport, probe_redirect_chain};

#[derive(Debug, Deserialize)]
pub struct CheckDestinationBody {
    pub url: String,
}

/// `POST /links/check-destination`. The report is the answer even when the
/// chain is unusable; only a malformed body is an error.
pub async fn check_destination_handler(
    State(state): State<AppState>,
    ApiWorkspace(_): ApiWorkspace,
    body: Bytes,
) -> Result<Json<ProbeReport>, ApiError> {
    let CheckDestinationBody { url } = parse_body(&body)?;
    Ok(Json(
        probe_redirect_chain(state.probe(), &url, state.probe_config()).await,
    ))
}

#[cfg(test)]
mod tests {
    use crate::server::test_support::*;
    use crate::test_utils::TestPipeline;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn reports_single_hop_chain() {
        let h = TestPipeline::new();
        let response = send(
            app(&h),
            authed_post("/links/check-destination", json!({"url": "https://acme.com/pricing"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["success"], true);
        assert_eq!(report["finalStatus"], 200);
        assert_eq!(report["apexDomains"], json!(["acme.com"]));
        assert_eq!(report["hasMultipleApexDomains"], false);
    }

    #[tokio::test]
    async fn invalid_url_is_a_failed_report() {
        let h = TestPipeline::new();
        let response = send(
            app(&h),
            authed_post("/links/check-destination", json!({"url": "ftp://acme.com"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["success"], false);
    }
}
