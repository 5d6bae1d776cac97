//! `RoomCoordinatorActor` - singleton owner of room state.
//!
//! The coordinator is the top-level actor:
//!
//! - Singleton per service instance
//! - Owns the [`RoomDirectory`] (rooms, transcripts, membership, session
//!   clock) and the registry of live connections
//! - Processes one client event at a time, so every handler observes and
//!   mutates the tables atomically
//! - Fans out with non-blocking `try_deliver`; a slow or closed connection
//!   loses the event instead of stalling the coordinator
//! - Owns the root `CancellationToken` for graceful shutdown
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the coordinator:
//! 1. Sets `accepting_new = false` (new registrations get `Draining`)
//! 2. Sends a close frame to every registered connection, bounded by the deadline
//! 3. Cancels the root `CancellationToken` (propagates to all connection actors)

use crate::errors::SignalingError;
use crate::observability::metrics as prom;
use crate::protocol::ServerEvent;
use crate::rooms::{ChatRecord, Delivery, RoomDirectory};
use crate::types::{ConnectionId, RoomId};

use super::connection::ConnectionActorHandle;
use super::messages::{CoordinatorMessage, CoordinatorStatus, RoomInfo};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to the `RoomCoordinatorActor`.
///
/// All methods are async. Client events are queued and return once the
/// coordinator has accepted them; queries return via oneshot channels.
#[derive(Clone, Debug)]
pub struct RoomCoordinatorActorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    cancel_token: CancellationToken,
}

impl RoomCoordinatorActorHandle {
    /// Create a new `RoomCoordinatorActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    ///
    /// # Arguments
    ///
    /// * `instance_id` - Service instance ID (log correlation)
    /// * `mailbox_capacity` - Coordinator mailbox size
    /// * `max_transcript_records` - Per-room transcript cap, 0 = unbounded
    /// * `metrics` - Shared actor metrics
    #[must_use]
    pub fn new(
        instance_id: String,
        mailbox_capacity: usize,
        max_transcript_records: usize,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(mailbox_capacity);
        let cancel_token = CancellationToken::new();

        let actor = RoomCoordinatorActor::new(
            instance_id,
            receiver,
            cancel_token.clone(),
            RoomDirectory::new(max_transcript_records),
            metrics,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    async fn send(&self, message: CoordinatorMessage) -> Result<(), SignalingError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| SignalingError::Internal(format!("channel send failed: {e}")))
    }

    /// Register a newly opened connection.
    ///
    /// The connection is sent `welcome` with its own ID before anything else.
    /// Fails with `Draining` once shutdown has started.
    pub async fn register(&self, handle: ConnectionActorHandle) -> Result<(), SignalingError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(CoordinatorMessage::Register {
            handle,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| SignalingError::Internal(format!("response receive failed: {e}")))?
    }

    /// Join (or create) a room.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        room: RoomId,
    ) -> Result<(), SignalingError> {
        self.send(CoordinatorMessage::Join {
            connection_id,
            room,
        })
        .await
    }

    /// Relay a signal payload to `to`. Unknown targets are dropped silently.
    pub async fn signal(
        &self,
        from: ConnectionId,
        to: ConnectionId,
        payload: Value,
    ) -> Result<(), SignalingError> {
        self.send(CoordinatorMessage::Signal { from, to, payload })
            .await
    }

    /// Post a chat message to the sender's current room.
    pub async fn chat(
        &self,
        from: ConnectionId,
        message: String,
        sender: String,
    ) -> Result<(), SignalingError> {
        self.send(CoordinatorMessage::Chat {
            from,
            message,
            sender,
        })
        .await
    }

    /// Report that a connection closed.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), SignalingError> {
        self.send(CoordinatorMessage::Disconnect { connection_id })
            .await
    }

    /// Get a snapshot of a room.
    pub async fn get_room(&self, room: RoomId) -> Result<RoomInfo, SignalingError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(CoordinatorMessage::GetRoom {
            room,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| SignalingError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get a copy of a room identifier's transcript.
    pub async fn get_transcript(&self, room: RoomId) -> Result<Vec<ChatRecord>, SignalingError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(CoordinatorMessage::GetTranscript {
            room,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| SignalingError::Internal(format!("response receive failed: {e}")))
    }

    /// Get the current coordinator status.
    pub async fn get_status(&self) -> Result<CoordinatorStatus, SignalingError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(CoordinatorMessage::GetStatus { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| SignalingError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), SignalingError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(CoordinatorMessage::Shutdown {
            deadline,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| SignalingError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for spawning connection actors.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The `RoomCoordinatorActor` implementation.
pub struct RoomCoordinatorActor {
    instance_id: String,
    receiver: mpsc::Receiver<CoordinatorMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    directory: RoomDirectory,
    /// Live connections by ID.
    connections: HashMap<ConnectionId, ConnectionActorHandle>,
    /// Whether new connections are accepted.
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomCoordinatorActor {
    fn new(
        instance_id: String,
        receiver: mpsc::Receiver<CoordinatorMessage>,
        cancel_token: CancellationToken,
        directory: RoomDirectory,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Coordinator, &instance_id);

        Self {
            instance_id,
            receiver,
            cancel_token,
            directory,
            connections: HashMap::new(),
            accepting_new: true,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sig.actor.coordinator", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "sig.actor.coordinator",
            instance_id = %self.instance_id,
            "RoomCoordinatorActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sig.actor.coordinator",
                        instance_id = %self.instance_id,
                        "RoomCoordinatorActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.process(message).await,
                        None => {
                            info!(
                                target: "sig.actor.coordinator",
                                instance_id = %self.instance_id,
                                "RoomCoordinatorActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sig.actor.coordinator",
            instance_id = %self.instance_id,
            rooms_remaining = self.directory.room_count(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomCoordinatorActor stopped"
        );
    }

    /// Handle one message taken off the mailbox, with depth bookkeeping.
    async fn process(&mut self, message: CoordinatorMessage) {
        self.mailbox.record_receive(self.receiver.len());
        self.handle_message(message).await;
        self.mailbox.record_processed();
        self.metrics.record_message_processed();
        prom::set_actor_mailbox_depth(ActorType::Coordinator.as_str(), self.receiver.len());
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::Register { handle, respond_to } => {
                let result = self.register(handle);
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::Join {
                connection_id,
                room,
            } => self.join(connection_id, room),

            CoordinatorMessage::Signal { from, to, payload } => self.signal(from, to, payload),

            CoordinatorMessage::Chat {
                from,
                message,
                sender,
            } => self.chat(from, message, sender),

            CoordinatorMessage::Disconnect { connection_id } => self.disconnect(connection_id),

            CoordinatorMessage::GetRoom { room, respond_to } => {
                let _ = respond_to.send(self.get_room(room));
            }

            CoordinatorMessage::GetTranscript { room, respond_to } => {
                let _ = respond_to.send(self.directory.transcript(&room));
            }

            CoordinatorMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            CoordinatorMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline).await;
                let _ = respond_to.send(result);
            }
        }
    }

    /// Add a connection to the registry and greet it.
    fn register(&mut self, handle: ConnectionActorHandle) -> Result<(), SignalingError> {
        if !self.accepting_new {
            return Err(SignalingError::Draining);
        }

        let start = Instant::now();
        let connection_id = handle.connection_id();

        self.connections.insert(connection_id, handle);
        self.dispatch(vec![Delivery {
            to: connection_id,
            event: ServerEvent::Welcome { connection_id },
        }]);

        self.metrics.connection_registered();
        prom::set_connections_active(self.connections.len());
        prom::record_event("connect", start.elapsed());

        debug!(
            target: "sig.actor.coordinator",
            instance_id = %self.instance_id,
            connection_id = %connection_id,
            total_connections = self.connections.len(),
            "Connection registered"
        );

        Ok(())
    }

    fn join(&mut self, connection_id: ConnectionId, room: RoomId) {
        if !self.connections.contains_key(&connection_id) {
            debug!(
                target: "sig.actor.coordinator",
                connection_id = %connection_id,
                "Ignoring join from unregistered connection"
            );
            return;
        }

        let start = Instant::now();
        let outcome = self.directory.join(connection_id, room.clone(), start);
        self.dispatch(outcome.deliveries);

        prom::set_rooms_active(self.directory.room_count());
        prom::record_event("join", start.elapsed());

        info!(
            target: "sig.actor.coordinator",
            connection_id = %connection_id,
            room_id = %room,
            left_room = outcome.left_room.as_ref().map(RoomId::as_str),
            member_count = outcome.member_count,
            replayed = outcome.replayed,
            "Connection joined room"
        );
    }

    fn signal(&self, from: ConnectionId, to: ConnectionId, payload: Value) {
        let start = Instant::now();
        self.dispatch(vec![RoomDirectory::relay_signal(from, to, payload)]);
        prom::record_event("signal", start.elapsed());

        debug!(
            target: "sig.actor.coordinator",
            from = %from,
            to = %to,
            "Signal relayed"
        );
    }

    fn chat(&mut self, from: ConnectionId, message: String, sender: String) {
        let start = Instant::now();
        let message_len = message.len();
        let outcome = self.directory.chat(from, message, sender);

        let Some(room) = outcome.room else {
            debug!(
                target: "sig.actor.coordinator",
                connection_id = %from,
                "Ignoring chat from connection in no room"
            );
            return;
        };

        let recipients = outcome.deliveries.len();
        self.dispatch(outcome.deliveries);

        if outcome.evicted > 0 {
            prom::record_transcript_evictions(outcome.evicted);
        }
        prom::record_event("chat", start.elapsed());

        debug!(
            target: "sig.actor.coordinator",
            connection_id = %from,
            room_id = %room,
            message_len = message_len,
            recipients = recipients,
            evicted = outcome.evicted,
            "Chat broadcast"
        );
    }

    fn disconnect(&mut self, connection_id: ConnectionId) {
        let start = Instant::now();
        let departure = self.directory.disconnect(connection_id, start);
        self.dispatch(departure.deliveries);

        if self.connections.remove(&connection_id).is_some() {
            self.metrics.connection_closed();
        }

        prom::set_connections_active(self.connections.len());
        prom::set_rooms_active(self.directory.room_count());
        prom::record_event("disconnect", start.elapsed());

        if let Some(duration) = departure.session_duration {
            prom::record_session_duration(duration);
        }

        info!(
            target: "sig.actor.coordinator",
            connection_id = %connection_id,
            room_id = departure.room.as_ref().map(RoomId::as_str),
            room_closed = departure.room_closed,
            session_secs = departure.session_duration.map(|d| d.as_secs_f64()),
            total_connections = self.connections.len(),
            "Connection disconnected"
        );
    }

    /// Push each delivery into its recipient's mailbox without waiting.
    fn dispatch(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            let event_type = delivery.event.kind();

            let Some(connection) = self.connections.get(&delivery.to) else {
                self.record_drop(delivery.to, event_type, "unknown_target");
                continue;
            };

            match connection.try_deliver(delivery.event) {
                Ok(()) => {}
                Err(SignalingError::MailboxFull) => {
                    warn!(
                        target: "sig.actor.coordinator",
                        connection_id = %delivery.to,
                        event_type = event_type,
                        "Connection mailbox full, dropping event"
                    );
                    self.record_drop(delivery.to, event_type, "mailbox_full");
                }
                Err(_) => self.record_drop(delivery.to, event_type, "connection_closed"),
            }
        }
    }

    fn record_drop(&self, to: ConnectionId, event_type: &str, reason: &str) {
        self.metrics.record_delivery_dropped();
        prom::record_delivery_dropped(reason);
        debug!(
            target: "sig.actor.coordinator",
            connection_id = %to,
            event_type = event_type,
            reason = reason,
            "Event dropped"
        );
    }

    fn get_room(&self, room: RoomId) -> Result<RoomInfo, SignalingError> {
        let members = self
            .directory
            .members(&room)
            .ok_or_else(|| SignalingError::RoomNotFound(room.to_string()))?
            .to_vec();

        Ok(RoomInfo {
            transcript_len: self.directory.transcript(&room).len(),
            members,
            room_id: room,
        })
    }

    fn get_status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            connection_count: self.connections.len(),
            room_count: self.directory.room_count(),
            transcript_count: self.directory.transcript_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.receiver.len(),
        }
    }

    /// Stop accepting connections, close the ones we have, then cancel.
    async fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), SignalingError> {
        info!(
            target: "sig.actor.coordinator",
            instance_id = %self.instance_id,
            connection_count = self.connections.len(),
            room_count = self.directory.room_count(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;

        let handles: Vec<ConnectionActorHandle> = self.connections.values().cloned().collect();
        let close_all = async {
            for handle in &handles {
                let _ = handle.close("server shutting down".to_string()).await;
            }
        };

        if tokio::time::timeout(deadline, close_all).await.is_err() {
            warn!(
                target: "sig.actor.coordinator",
                instance_id = %self.instance_id,
                deadline_secs = deadline.as_secs(),
                "Shutdown deadline reached before all connections were closed"
            );
        }

        // Cancel the root token (propagates to all connection actors)
        self.cancel_token.cancel();

        Ok(())
    }

    /// Cancel every connection actor and drop the registry.
    fn graceful_shutdown(&mut self) {
        self.accepting_new = false;

        for (connection_id, handle) in &self.connections {
            debug!(
                target: "sig.actor.coordinator",
                connection_id = %connection_id,
                "Cancelling connection actor"
            );
            handle.cancel();
        }

        let closed = self.connections.len();
        self.connections.clear();
        prom::set_connections_active(0);

        info!(
            target: "sig.actor.coordinator",
            instance_id = %self.instance_id,
            connections_closed = closed,
            "Graceful shutdown complete"
        );
    }
}
