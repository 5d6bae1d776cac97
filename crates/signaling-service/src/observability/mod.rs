//! Observability for the Signaling Service.
//!
//! # Privacy by Default
//!
//! Run loops use `#[instrument(skip_all)]` with explicit fields. Chat text and
//! signal payloads are never logged, only their sizes. Metric labels are
//! bounded; room and connection identifiers never appear as labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `signaling_connections_active` | Gauge | none | Registered WebSocket connections |
//! | `signaling_rooms_active` | Gauge | none | Non-empty rooms |
//! | `signaling_actor_mailbox_depth` | Gauge | `actor_type` | Coordinator backlog |
//! | `signaling_events_total` | Counter | `event_type` | Handled client events |
//! | `signaling_event_processing_seconds` | Histogram | `event_type` | Handler latency |
//! | `signaling_deliveries_dropped_total` | Counter | `reason` | Undelivered outbound events |
//! | `signaling_frames_rejected_total` | Counter | `reason` | Ignored inbound frames |
//! | `signaling_transcript_evictions_total` | Counter | none | Records evicted by the cap |
//! | `signaling_session_duration_seconds` | Histogram | none | Time since last join at disconnect |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
