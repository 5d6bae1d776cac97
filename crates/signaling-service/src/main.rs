//! Signaling Service
//!
//! WebSocket rendezvous server for room membership, signal relay and chat.
//!
//! # Servers
//!
//! - WebSocket/HTTP server for clients, `GET /ws` (default: 0.0.0.0:8080)
//! - HTTP server for health and metrics endpoints (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Spawn the `RoomCoordinatorActor`
//! 4. Start health HTTP server (liveness, readiness, metrics)
//! 5. Start WebSocket server and mark ready
//! 6. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use signaling_service::actors::{ActorMetrics, RoomCoordinatorActorHandle};
use signaling_service::config::Config;
use signaling_service::handlers::metrics_router;
use signaling_service::observability::{health_router, init_metrics_recorder, HealthState};
use signaling_service::routes::{build_routes, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signaling_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Signaling Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        coordinator_mailbox = config.coordinator_mailbox,
        connection_mailbox = config.connection_mailbox,
        max_transcript_records = config.max_transcript_records,
        max_message_bytes = config.max_message_bytes,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    // Initialize actor system
    let actor_metrics = ActorMetrics::new();
    let coordinator = RoomCoordinatorActorHandle::new(
        config.instance_id.clone(),
        config.coordinator_mailbox,
        config.max_transcript_records,
        Arc::clone(&actor_metrics),
    );
    info!("Actor system initialized");

    // Shutdown token as child of the coordinator's token, so servers stop
    // when the coordinator does
    let shutdown_token = coordinator.child_token();

    // Start health HTTP server (liveness, readiness, /metrics)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_app =
        health_router(Arc::clone(&health_state)).merge(metrics_router(prometheus_handle));

    // Bind listener BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Start WebSocket server
    let bind_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_seconds);
    let state = Arc::new(AppState {
        coordinator: coordinator.clone(),
        config,
        metrics: actor_metrics,
    });
    let app = build_routes(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %bind_addr, "Failed to bind WebSocket server");
            format!("Failed to bind WebSocket server to {bind_addr}: {e}")
        })?;

    let ws_shutdown_token = shutdown_token.child_token();
    let ws_server = tokio::spawn(async move {
        info!(addr = %bind_addr, "WebSocket server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            ws_shutdown_token.cancelled().await;
            info!("WebSocket server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "WebSocket server failed");
        }
    });

    health_state.set_ready();
    info!("Signaling Service running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so k8s stops sending traffic
    health_state.set_not_ready();

    // Close every connection, then cancel the coordinator (and with it the
    // servers, which run on child tokens)
    if let Err(e) = coordinator.shutdown(shutdown_timeout).await {
        warn!(error = %e, "Actor system shutdown error");
    }
    shutdown_token.cancel();

    if tokio::time::timeout(shutdown_timeout, ws_server).await.is_err() {
        warn!("WebSocket server did not stop before the shutdown deadline");
    }

    info!("Signaling Service shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
