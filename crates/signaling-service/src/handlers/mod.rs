//! HTTP request handlers for the Signaling Service.

pub mod metrics;
pub mod ws;

pub use metrics::{metrics_handler, metrics_router};
pub use ws::ws_handler;
