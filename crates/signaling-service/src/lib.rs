//! Signaling Service Library
//!
//! This library provides the core functionality for the Dark Tower
//! Signaling Service - a WebSocket rendezvous server for small video calls:
//!
//! - Room membership keyed by caller-chosen room identifiers
//! - Point-to-point relay of opaque connection-negotiation payloads
//! - Room-wide chat with a retained, replayed transcript
//! - Departure notification when a connection closes
//!
//! # Architecture
//!
//! ```text
//! /ws upgrade task (read half) ──► RoomCoordinatorActor ──► ConnectionActor (write half)
//!                                   owns RoomDirectory          one per socket
//! ```
//!
//! The coordinator is the single writer of room state; connection actors
//! only serialize events onto their socket.
//!
//! # Modules
//!
//! - [`actors`] - Coordinator and connection actors
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types
//! - [`handlers`] - WebSocket upgrade and `/metrics` handlers
//! - [`observability`] - Health endpoints and Prometheus metrics
//! - [`protocol`] - Wire events
//! - [`rooms`] - Room, transcript and membership tables
//! - [`routes`] - Router and application state
//! - [`types`] - Identifier types

pub mod actors;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod observability;
pub mod protocol;
pub mod rooms;
pub mod routes;
pub mod types;
