//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  - Prometheus text format
//!   GET /healthz  - Liveness probe (always 200 if process is running)
//!   GET /readyz   - Readiness probe (200 if every backend is reachable)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::sync::Arc;
use zkv_storage::BackendPool;

type Labels = Vec<(String, String)>;

/// Counters and gauges updated by the API handlers and the sweep task.
#[derive(Clone, Default)]
pub struct DaemonMetrics {
    login_attempts: Family<Labels, Counter>,
    uploads: Family<Labels, Counter>,
    chunk_fetches: Family<Labels, Counter>,
    integrity_failures: Counter,
    live_challenges: Gauge,
    live_sessions: Gauge,
}

impl DaemonMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "zkv_login_attempts",
            "Second-move login attempts by outcome",
            metrics.login_attempts.clone(),
        );
        registry.register(
            "zkv_uploads",
            "Upload commits by outcome",
            metrics.uploads.clone(),
        );
        registry.register(
            "zkv_chunk_fetches",
            "Stored chunk reads served by outcome",
            metrics.chunk_fetches.clone(),
        );
        registry.register(
            "zkv_integrity_failures",
            "Uploads refused because a chunk or file hash did not match",
            metrics.integrity_failures.clone(),
        );
        registry.register(
            "zkv_live_challenges",
            "Pending login challenges at the last sweep",
            metrics.live_challenges.clone(),
        );
        registry.register(
            "zkv_live_sessions",
            "Live session tokens at the last sweep",
            metrics.live_sessions.clone(),
        );
        metrics
    }

    fn outcome(outcome: &str) -> Labels {
        vec![("outcome".to_string(), outcome.to_string())]
    }

    pub fn login(&self, outcome: &str) {
        self.login_attempts.get_or_create(&Self::outcome(outcome)).inc();
    }

    pub fn upload(&self, outcome: &str) {
        self.uploads.get_or_create(&Self::outcome(outcome)).inc();
    }

    pub fn chunk_fetch(&self, outcome: &str) {
        self.chunk_fetches.get_or_create(&Self::outcome(outcome)).inc();
    }

    pub fn integrity_failure(&self) {
        self.integrity_failures.inc();
    }

    pub fn set_live(&self, challenges: usize, sessions: usize) {
        self.live_challenges.set(challenges as i64);
        self.live_sessions.set(sessions as i64);
    }
}

/// Shared health state for the metrics server
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub pool: Arc<BackendPool>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9700")
pub async fn serve(addr: String, state: HealthState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness probe: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe: 200 if every backend answers, 503 otherwise.
async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let down: Vec<String> = state
        .pool
        .health()
        .await
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| name)
        .collect();
    if down.is_empty() {
        (StatusCode::OK, "ready".to_string())
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("backends unreachable: {}", down.join(", ")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;
    use zkv_storage::{memory_operator, Backend};

    fn health_state() -> (HealthState, DaemonMetrics) {
        let mut registry = Registry::default();
        let metrics = DaemonMetrics::new(&mut registry);
        let backend = Backend::new(
            "mem",
            "memory://mem",
            memory_operator().unwrap(),
            Duration::from_secs(5),
        );
        let state = HealthState {
            registry: Arc::new(registry),
            pool: Arc::new(BackendPool::new(vec![backend]).unwrap()),
        };
        (state, metrics)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn metrics_reflect_recorded_events() {
        let (state, metrics) = health_state();
        metrics.login("success");
        metrics.login("rejected");
        metrics.login("rejected");
        metrics.integrity_failure();
        metrics.set_live(2, 1);

        let (status, body) = get(router(state), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"zkv_login_attempts_total{outcome="rejected"} 2"#));
        assert!(body.contains("zkv_integrity_failures_total 1"));
        assert!(body.contains("zkv_live_challenges 2"));
    }

    #[tokio::test]
    async fn probes_report_ok_for_memory_backends() {
        let (state, _) = health_state();
        assert_eq!(get(router(state.clone()), "/healthz").await.0, StatusCode::OK);
        assert_eq!(get(router(state), "/readyz").await.0, StatusCode::OK);
    }
}
