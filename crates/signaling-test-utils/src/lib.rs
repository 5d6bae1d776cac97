//! Test utilities for the Signaling Service.
//!
//! - [`server_harness`] - `TestSignalingServer`, a real server on a random port
//! - [`client`] - `TestClient`, a WebSocket client speaking the wire protocol

pub mod client;
pub mod server_harness;

pub use client::TestClient;
pub use server_harness::TestSignalingServer;
