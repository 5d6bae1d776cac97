//! Prometheus metrics endpoint.
//!
//! Served on the health listener, next to `/health` and `/ready`. The
//! endpoint is unauthenticated; labels are bounded and carry no room or
//! connection identifiers.

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns 200 OK with Prometheus text format:
/// ```text
/// # TYPE signaling_connections_active gauge
/// signaling_connections_active 12
/// ```
#[tracing::instrument(skip_all, name = "sig.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

/// Router serving `/metrics` from `handle`.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(handle)
}
