//! Health and metrics endpoint integration tests.
//!
//! Drives the health and metrics routers in-process with
//! `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use signaling_service::handlers::metrics_router;
use signaling_service::observability::metrics as prom;
use signaling_service::observability::{health_router, HealthState};
use std::sync::Arc;
use tower::util::ServiceExt;

async fn status_of(state: &Arc<HealthState>, path: &str) -> Result<StatusCode, anyhow::Error> {
    let response = health_router(Arc::clone(state))
        .oneshot(Request::builder().uri(path).body(Body::empty())?)
        .await?;
    Ok(response.status())
}

/// Test that liveness reports 200 from startup.
#[tokio::test]
async fn test_health_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let state = Arc::new(HealthState::new());

    assert_eq!(status_of(&state, "/health").await?, StatusCode::OK);

    Ok(())
}

/// Test that readiness follows the startup and shutdown transitions.
#[tokio::test]
async fn test_ready_endpoint_transitions() -> Result<(), anyhow::Error> {
    let state = Arc::new(HealthState::new());
    assert_eq!(
        status_of(&state, "/ready").await?,
        StatusCode::SERVICE_UNAVAILABLE
    );

    state.set_ready();
    assert_eq!(status_of(&state, "/ready").await?, StatusCode::OK);

    state.set_not_ready();
    assert_eq!(
        status_of(&state, "/ready").await?,
        StatusCode::SERVICE_UNAVAILABLE
    );
    // Still live while draining
    assert_eq!(status_of(&state, "/health").await?, StatusCode::OK);

    Ok(())
}

/// Test that non-existent routes return 404.
#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<(), anyhow::Error> {
    let state = Arc::new(HealthState::new());

    assert_eq!(status_of(&state, "/nope").await?, StatusCode::NOT_FOUND);

    Ok(())
}

/// Test that /metrics renders recorded signaling metrics in Prometheus format.
#[tokio::test]
async fn test_metrics_endpoint_renders_signaling_metrics() -> Result<(), anyhow::Error> {
    // A local recorder; the global one can only be installed once per process.
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        prom::set_connections_active(3);
        prom::record_frame_rejected("malformed");
    });

    let response = metrics_router(handle)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await?.to_bytes();
    let text = String::from_utf8(body.to_vec())?;

    assert!(
        text.contains("signaling_connections_active 3"),
        "missing connections gauge in:\n{text}"
    );
    assert!(
        text.contains(r#"signaling_frames_rejected_total{reason="malformed"} 1"#),
        "missing rejected frames counter in:\n{text}"
    );

    Ok(())
}
