//! Actor model implementation for the Signaling Service.
//!
//! ```text
//! RoomCoordinatorActor (singleton per instance)
//! ├── owns RoomDirectory (rooms, transcripts, membership, session clock)
//! ├── owns the registry ConnectionId -> ConnectionActorHandle
//! └── N ConnectionActors (one per WebSocket, child cancellation tokens)
//!     └── owns the socket write half
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer**: only the coordinator touches room state
//! - **Non-blocking fan-out**: event delivery never waits on a connection mailbox
//! - **CancellationToken propagation**: connection actors run on child tokens
//! - **Message passing**: all inter-actor communication via `tokio::sync::mpsc`
//!
//! # Modules
//!
//! - [`coordinator`] - `RoomCoordinatorActor` singleton
//! - [`connection`] - `ConnectionActor` per WebSocket connection
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod connection;
pub mod coordinator;
pub mod messages;
pub mod metrics;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use coordinator::{RoomCoordinatorActor, RoomCoordinatorActorHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
