//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Request-reply uses `tokio::sync::oneshot`. Client
//! events (join, signal, chat, disconnect) are fire-and-forget: their only
//! observable result is the outbound events they produce.

use crate::errors::SignalingError;
use crate::protocol::ServerEvent;
use crate::rooms::ChatRecord;
use crate::types::{ConnectionId, RoomId};

use super::connection::ConnectionActorHandle;

use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `RoomCoordinatorActor`.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// A connection opened; add it to the registry and send it `welcome`.
    Register {
        handle: ConnectionActorHandle,
        /// Fails with `Draining` once shutdown has started.
        respond_to: oneshot::Sender<Result<(), SignalingError>>,
    },

    /// Join (or create) a room.
    Join {
        connection_id: ConnectionId,
        room: RoomId,
    },

    /// Relay an opaque payload to one connection.
    Signal {
        from: ConnectionId,
        to: ConnectionId,
        payload: Value,
    },

    /// Post a chat message to the sender's room.
    Chat {
        from: ConnectionId,
        message: String,
        sender: String,
    },

    /// A connection closed.
    Disconnect { connection_id: ConnectionId },

    /// Snapshot of one room.
    GetRoom {
        room: RoomId,
        respond_to: oneshot::Sender<Result<RoomInfo, SignalingError>>,
    },

    /// Copy of a room identifier's transcript.
    GetTranscript {
        room: RoomId,
        respond_to: oneshot::Sender<Vec<ChatRecord>>,
    },

    /// Coordinator status (for health checks and tests).
    GetStatus {
        respond_to: oneshot::Sender<CoordinatorStatus>,
    },

    /// Initiate graceful shutdown.
    Shutdown {
        /// Upper bound on the time spent closing connections.
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), SignalingError>>,
    },
}

/// Messages sent to `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Write one event to the socket.
    Deliver { event: ServerEvent },

    /// Send a close frame and stop.
    Close { reason: String },
}

/// Snapshot of a room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    /// Member list in join order (duplicates included).
    pub members: Vec<ConnectionId>,
    /// Records currently held in the room's transcript.
    pub transcript_len: usize,
}

/// Coordinator status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStatus {
    /// Registered connections.
    pub connection_count: usize,
    /// Non-empty rooms.
    pub room_count: usize,
    /// Room identifiers that have a transcript.
    pub transcript_count: usize,
    /// Whether the coordinator refuses new connections.
    pub is_draining: bool,
    /// Current coordinator mailbox depth.
    pub mailbox_depth: usize,
}
