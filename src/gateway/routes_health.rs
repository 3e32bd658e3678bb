//! # Health & Observability Endpoints
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /healthz` | Liveness: the process is up |
//! | `GET /readyz` | Readiness: the ledger answers |
//! | `GET /metrics` | Prometheus text exposition |
//!
//! `/readyz` runs the ledger health check with a 2-second timeout and
//! answers 503 while the ledger is unreachable.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use std::sync::Arc;
use std::time::Duration;

use super::AppState;

const LEDGER_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Always 200 while the process serves requests.
pub async fn handler_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn handler_readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match tokio::time::timeout(LEDGER_CHECK_TIMEOUT, state.db.health_check()).await {
        Ok(Ok(())) => (StatusCode::OK, "ok"),
        Ok(Err(_)) => (StatusCode::SERVICE_UNAVAILABLE, "ledger unreachable"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "ledger check timed out"),
    }
}

/// Refreshes the push-connection gauge, then encodes the registry.
pub async fn handler_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connections = state.connections.len() as i64;
    state.metrics.push_connections.set(connections);
    (
        [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
        state.metrics.encode(),
    )
}
