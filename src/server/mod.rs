//! HTTP server for the attribution pipeline.
//!
//! This module implements the HTTP server that:
//! - Records clicks, leads, sales, and thank-you page hits
//! - Accepts signed provider webhooks and converts them
//! - Probes destination URLs and serves on-demand hot scores
//! - Provides health checks for liveness probes
//!
//! # Endpoints
//!
//! - `POST /track/click` - Records a click; the workspace comes from the link
//! - `POST /track/lead` - Tracks a lead (Bearer API key)
//! - `POST /track/sale` - Tracks a sale (Bearer API key)
//! - `POST /track/thank-you` - Thank-you page hit (Bearer API key)
//! - `POST /webhooks/{provider}/{workspace_id}` - Signed provider webhook
//! - `POST /links/check-destination` - Redirect chain probe (Bearer API key)
//! - `GET /customers/{customer_id}/hot-score` - On-demand hot score (Bearer API key)
//! - `POST /workspaces/{workspace_id}/webhooks/invalidate` - Drops cached webhook registrations
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

pub mod auth;
pub mod customers;
pub mod error;
pub mod health;
pub mod links;
pub mod provider;
pub mod track;

pub use auth::ApiWorkspace;
pub use error::ApiError;

use crate::pipeline::Pipeline;
use crate::probe::{HeadProbe, ProbeConfig};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pipeline: Pipeline,

    /// Root of the per-workspace provider webhook secrets.
    master_secret: Vec<u8>,

    probe: Arc<dyn HeadProbe>,
    probe_config: ProbeConfig,
}

impl AppState {
    pub fn new(
        pipeline: Pipeline,
        master_secret: impl Into<Vec<u8>>,
        probe: Arc<dyn HeadProbe>,
        probe_config: ProbeConfig,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                pipeline,
                master_secret: master_secret.into(),
                probe,
                probe_config,
            }),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub fn master_secret(&self) -> &[u8] {
        &self.inner.master_secret
    }

    pub fn probe(&self) -> &dyn HeadProbe {
        self.inner.probe.as_ref()
    }

    pub fn probe_config(&self) -> &ProbeConfig {
        &self.inner.probe_config
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/track/click", post(track::click_handler))
        .route("/track/lead", post(track::lead_handler))
        .route("/track/sale", post(track::sale_handler))
        .route("/track/thank-you", post(track::thank_you_handler))
        .route(
            "/webhooks/{provider}/{workspace_id}",
            post(provider::provider_webhook_handler),
        )
        .route("/links/check-destination", post(links::check_destination_handler))
        .route(
            "/customers/{customer_id}/hot-score",
            get(customers::hot_score_handler),
        )
        .route(
            "/workspaces/{workspace_id}/webhooks/invalidate",
            post(provider::invalidate_webhooks_handler),
        )
        .route("/health", get(health::health_handler))
        .with_state(app_state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, Response};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use url::Url;

    use super::*;
    use crate::probe::{HopResponse, ProbeError};
    use crate::test_utils::{TEST_API_KEY, TestPipeline};

    pub const MASTER_SECRET: &[u8] = b"test-master-secret";

    /// Every URL answers 200.
    pub struct FinalProbe;

    #[async_trait]
    impl HeadProbe for FinalProbe {
        async fn head(&self, _url: &Url, _timeout: Duration) -> Result<HopResponse, ProbeError> {
            Ok(HopResponse::Final { status: 200 })
        }
    }

    pub fn app(h: &TestPipeline) -> axum::Router {
        build_router(AppState::new(
            h.pipeline.clone(),
            MASTER_SECRET.to_vec(),
            Arc::new(FinalProbe),
            ProbeConfig::default(),
        ))
    }

    pub fn authed_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {TEST_API_KEY}"))
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    pub async fn send(app: axum::Router, request: Request<Body>) -> Response<Body> {
        app.oneshot(request).await.unwrap()
    }

    pub async fn json_body(response: Response<Body>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use crate::test_utils::TestPipeline;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[test]
    fn app_state_accessors_work() {
        let h = TestPipeline::new();
        let state = super::AppState::new(
            h.pipeline.clone(),
            MASTER_SECRET.to_vec(),
            std::sync::Arc::new(FinalProbe),
            crate::probe::ProbeConfig::default(),
        );
        let cloned = state.clone();
        assert_eq!(cloned.master_secret(), MASTER_SECRET);
        assert_eq!(cloned.probe_config().max_hops, 5);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let h = TestPipeline::new();
        let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let response = send(app(&h), request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_job_stats() {
        let h = TestPipeline::new();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = send(app(&h), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["jobs"]["failed"], 0);
    }
}
