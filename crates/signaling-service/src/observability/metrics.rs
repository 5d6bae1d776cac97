//! Metrics definitions for the Signaling Service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `signaling_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded; room and connection identifiers are never labels.
//! - `actor_type`: 2 values (coordinator, connection)
//! - `event_type`: 5 values (connect, join, signal, chat, disconnect)
//! - `reason` (dropped deliveries): unknown_target, mailbox_full, connection_closed
//! - `reason` (rejected frames): binary, malformed

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling is in-memory; expect sub-millisecond
        .set_buckets_for_metric(
            Matcher::Prefix("signaling_event_processing".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set event processing buckets: {e}"))?
        // Sessions last from seconds to hours
        .set_buckets_for_metric(
            Matcher::Prefix("signaling_session_duration".to_string()),
            &[
                1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0,
            ],
        )
        .map_err(|e| format!("Failed to set session duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Set the number of registered WebSocket connections.
///
/// Metric: `signaling_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("signaling_connections_active").set(count as f64);
}

/// Set the number of non-empty rooms.
///
/// Metric: `signaling_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("signaling_rooms_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `signaling_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("signaling_actor_mailbox_depth", "actor_type" => actor_type.to_string())
        .set(depth as f64);
}

// ============================================================================
// Counters
// ============================================================================

/// Record a handled client event and its processing time.
///
/// Metrics: `signaling_events_total`, `signaling_event_processing_seconds`
/// Labels: `event_type`
pub fn record_event(event_type: &str, duration: Duration) {
    counter!("signaling_events_total", "event_type" => event_type.to_string()).increment(1);
    histogram!(
        "signaling_event_processing_seconds",
        "event_type" => event_type.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record an outbound event that was not delivered.
///
/// Metric: `signaling_deliveries_dropped_total`
/// Labels: `reason`
pub fn record_delivery_dropped(reason: &str) {
    counter!("signaling_deliveries_dropped_total", "reason" => reason.to_string()).increment(1);
}

/// Record an inbound frame that was ignored.
///
/// Metric: `signaling_frames_rejected_total`
/// Labels: `reason`
pub fn record_frame_rejected(reason: &str) {
    counter!("signaling_frames_rejected_total", "reason" => reason.to_string()).increment(1);
}

/// Record transcript records evicted by the per-room cap.
///
/// Metric: `signaling_transcript_evictions_total`
pub fn record_transcript_evictions(count: usize) {
    counter!("signaling_transcript_evictions_total").increment(count as u64);
}

// ============================================================================
// Histograms
// ============================================================================

/// Record how long a connection stayed in its last room.
///
/// Metric: `signaling_session_duration_seconds`
pub fn record_session_duration(duration: Duration) {
    histogram!("signaling_session_duration_seconds").record(duration.as_secs_f64());
}
