//! Health endpoints for the match service.
//!
//! - `GET /health` - Liveness probe, 200 while the process serves HTTP
//! - `GET /ready` - Readiness probe with a small JSON report of the node
//!
//! The `/metrics` endpoint is merged in by the binary from the Prometheus
//! exporter handle.

use crate::actors::ActorMetrics;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Readiness of one match node.
#[derive(Debug)]
pub struct HealthState {
    node: String,
    /// Set once the registry is up, cleared when shutdown begins.
    accepting: AtomicBool,
    actor_metrics: Arc<ActorMetrics>,
}

/// Body of the `/ready` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub node: String,
    pub active_matches: usize,
}

impl HealthState {
    /// A node that is not accepting matches yet.
    #[must_use]
    pub fn new(node: impl Into<String>, actor_metrics: Arc<ActorMetrics>) -> Self {
        Self {
            node: node.into(),
            accepting: AtomicBool::new(false),
            actor_metrics,
        }
    }

    pub fn set_ready(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    /// Stop advertising readiness so traffic drains before the registry stops.
    pub fn set_not_ready(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Snapshot for the readiness endpoint.
    #[must_use]
    pub fn report(&self) -> ReadinessReport {
        ReadinessReport {
            status: if self.is_ready() { "ready" } else { "not_ready" },
            node: self.node.clone(),
            active_matches: self.actor_metrics.match_count(),
        }
    }
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn readiness_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<ReadinessReport>) {
    let report = state.report();
    let status = if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn state() -> Arc<HealthState> {
        Arc::new(HealthState::new("node-a", ActorMetrics::new()))
    }

    async fn get_path(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[test]
    fn test_report_tracks_readiness_and_matches() {
        let metrics = ActorMetrics::new();
        let state = HealthState::new("node-a", Arc::clone(&metrics));
        assert_eq!(state.report().status, "not_ready");

        state.set_ready();
        metrics.match_created();
        metrics.match_created();
        let report = state.report();
        assert_eq!(report.status, "ready");
        assert_eq!(report.node, "node-a");
        assert_eq!(report.active_matches, 2);

        state.set_not_ready();
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_liveness_is_always_ok() {
        let (status, body) = get_path(health_router(state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_readiness_follows_state() {
        let state = state();

        let (status, body) = get_path(health_router(Arc::clone(&state)), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");

        state.set_ready();
        let (status, body) = get_path(health_router(Arc::clone(&state)), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["node"], "node-a");
        assert_eq!(body["active_matches"], 0);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let (status, _) = get_path(health_router(state()), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
