//! Signaling Service error types.
//!
//! None of these reach other connections: relay and membership failures
//! degrade to "no-op, no notification". They are returned to callers of the
//! actor handles and logged server-side.

use thiserror::Error;

/// Signaling Service error type.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// No room with this ID (the member list is empty or was never created).
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// A connection's outbound mailbox is full; the event was dropped.
    #[error("Connection mailbox full")]
    MailboxFull,

    /// The receiving actor has stopped.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The service is shutting down and refuses new connections.
    #[error("Service is draining")]
    Draining,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SignalingError::Internal(_) => "An internal error occurred".to_string(),
            SignalingError::RoomNotFound(_) => "Room not found".to_string(),
            SignalingError::MailboxFull | SignalingError::ConnectionClosed => {
                "Connection unavailable".to_string()
            }
            SignalingError::Draining => "Server is shutting down, please reconnect".to_string(),
        }
    }
}
