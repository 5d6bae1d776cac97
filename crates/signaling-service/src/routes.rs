//! HTTP routes for the Signaling Service.
//!
//! Defines the Axum router and application state.

use crate::actors::{ActorMetrics, RoomCoordinatorActorHandle};
use crate::config::Config;
use crate::handlers;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the room coordinator.
    pub coordinator: RoomCoordinatorActorHandle,

    /// Service configuration.
    pub config: Config,

    /// Shared actor metrics.
    pub metrics: Arc<ActorMetrics>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/ws` - WebSocket upgrade for signaling clients
/// - CorsLayer accepting any origin
/// - TraceLayer for request logging
pub fn build_routes(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/ws", get(handlers::ws_handler))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. CorsLayer - Answer preflight, add CORS headers (innermost)
    // 2. TraceLayer - Log request details
    routes
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
