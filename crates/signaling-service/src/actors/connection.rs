//! `ConnectionActor` - per-WebSocket connection writer.
//!
//! Each `ConnectionActor`:
//! - Owns the write half of exactly one WebSocket
//! - Serializes `ServerEvent`s to JSON text frames in mailbox order
//! - Is fed by the coordinator through a bounded mailbox (`try_deliver`
//!   never blocks the caller)
//!
//! The read half stays with the upgrade task in `handlers::ws`, which
//! forwards parsed client events to the coordinator.
//!
//! # Lifecycle
//!
//! 1. Spawned by the WebSocket handler when the upgrade completes
//! 2. Runs until closed, cancelled, or a socket write fails
//! 3. Cancellation via child token propagates from the coordinator

use crate::errors::SignalingError;
use crate::protocol::ServerEvent;
use crate::types::ConnectionId;

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use axum::extract::ws::{close_code, CloseFrame, Message};
use futures::{Sink, SinkExt};
use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
}

impl ConnectionActorHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue an event for the client without waiting.
    ///
    /// Fails with `MailboxFull` when the client is not keeping up and with
    /// `ConnectionClosed` once the actor has stopped.
    pub fn try_deliver(&self, event: ServerEvent) -> Result<(), SignalingError> {
        self.sender
            .try_send(ConnectionMessage::Deliver { event })
            .map_err(|e| match e {
                TrySendError::Full(_) => SignalingError::MailboxFull,
                TrySendError::Closed(_) => SignalingError::ConnectionClosed,
            })
    }

    /// Close the connection with a close frame carrying `reason`.
    pub async fn close(&self, reason: String) -> Result<(), SignalingError> {
        self.sender
            .send(ConnectionMessage::Close { reason })
            .await
            .map_err(|e| SignalingError::Internal(format!("channel send failed: {e}")))
    }

    /// Cancel the connection actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// A handle with no actor behind it; the caller reads the mailbox.
    #[cfg(test)]
    pub(crate) fn detached(
        connection_id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ConnectionMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                sender,
                cancel_token: CancellationToken::new(),
                connection_id,
            },
            receiver,
        )
    }
}

/// The `ConnectionActor` implementation.
///
/// Generic over the socket's write half so tests can substitute a channel.
pub struct ConnectionActor<S> {
    connection_id: ConnectionId,
    /// Write half of the WebSocket.
    sink: S,
    receiver: mpsc::Receiver<ConnectionMessage>,
    /// Cancellation token (child of the coordinator's token).
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
    is_closing: bool,
}

impl<S> ConnectionActor<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
{
    /// Spawn a new connection actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: ConnectionId,
        sink: S,
        mailbox_capacity: usize,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(mailbox_capacity);

        let actor = Self {
            connection_id,
            sink,
            receiver,
            cancel_token: cancel_token.clone(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Connection, connection_id.to_string()),
            is_closing: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "sig.actor.connection",
        fields(connection_id = %self.connection_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "sig.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sig.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    self.graceful_close("server shutting down").await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_receive(self.receiver.len());
                            let should_exit = self.handle_message(message).await;
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "sig.actor.connection",
                                connection_id = %self.connection_id,
                                "ConnectionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sig.actor.connection",
            connection_id = %self.connection_id,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Deliver { event } => self.handle_deliver(&event).await,

            ConnectionMessage::Close { reason } => {
                self.graceful_close(&reason).await;
                true
            }
        }
    }

    /// Write one event as a JSON text frame. Returns true if the socket is gone.
    async fn handle_deliver(&mut self, event: &ServerEvent) -> bool {
        if self.is_closing {
            warn!(
                target: "sig.actor.connection",
                connection_id = %self.connection_id,
                "Attempted to send event while closing"
            );
            return false;
        }

        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    target: "sig.actor.connection",
                    connection_id = %self.connection_id,
                    event_type = event.kind(),
                    error = %e,
                    "Failed to serialize event"
                );
                return false;
            }
        };

        debug!(
            target: "sig.actor.connection",
            connection_id = %self.connection_id,
            event_type = event.kind(),
            bytes = text.len(),
            "Sending event to client"
        );

        if let Err(e) = self.sink.send(Message::Text(text)).await {
            debug!(
                target: "sig.actor.connection",
                connection_id = %self.connection_id,
                error = %e,
                "Socket write failed, stopping"
            );
            self.is_closing = true;
            return true;
        }

        false
    }

    /// Send a close frame and close the write half.
    async fn graceful_close(&mut self, reason: &str) {
        if self.is_closing {
            return;
        }

        self.is_closing = true;

        debug!(
            target: "sig.actor.connection",
            connection_id = %self.connection_id,
            reason = %reason,
            "Closing connection"
        );

        let frame = CloseFrame {
            code: close_code::AWAY,
            reason: Cow::Owned(reason.to_string()),
        };

        if let Err(e) = self.sink.send(Message::Close(Some(frame))).await {
            debug!(
                target: "sig.actor.connection",
                connection_id = %self.connection_id,
                error = %e,
                "Close frame not sent"
            );
        }

        let _ = self.sink.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::channel::mpsc as socket;
    use futures::StreamExt;
    use std::time::Duration;

    type SocketRx = socket::UnboundedReceiver<Message>;

    fn spawn_actor(
        cancel_token: CancellationToken,
        capacity: usize,
    ) -> (ConnectionActorHandle, JoinHandle<()>, SocketRx) {
        let (sink, socket_rx) = socket::unbounded();
        let (handle, task) = ConnectionActor::spawn(
            ConnectionId::new(),
            sink,
            capacity,
            cancel_token,
            ActorMetrics::new(),
        );
        (handle, task, socket_rx)
    }

    async fn next_frame(socket_rx: &mut SocketRx) -> Message {
        tokio::time::timeout(Duration::from_secs(1), socket_rx.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
    }

    fn text_of(frame: Message) -> String {
        match frame {
            Message::Text(text) => Some(text),
            _ => None,
        }
        .expect("expected a text frame")
    }

    #[tokio::test]
    async fn test_deliver_writes_json_text_frame() {
        let (handle, _task, mut socket_rx) = spawn_actor(CancellationToken::new(), 8);
        let id = handle.connection_id();

        handle
            .try_deliver(ServerEvent::Welcome { connection_id: id })
            .unwrap();

        let text = text_of(next_frame(&mut socket_rx).await);
        let event: ServerEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(event, ServerEvent::Welcome { connection_id: id });

        handle.cancel();
    }

    #[tokio::test]
    async fn test_deliveries_keep_mailbox_order() {
        let (handle, _task, mut socket_rx) = spawn_actor(CancellationToken::new(), 8);
        let from = ConnectionId::new();

        for n in 0..3 {
            handle
                .try_deliver(ServerEvent::Chat {
                    message: format!("m{n}"),
                    sender: "Alice".to_string(),
                    from,
                })
                .unwrap();
        }

        for n in 0..3 {
            let event: ServerEvent =
                serde_json::from_str(&text_of(next_frame(&mut socket_rx).await)).unwrap();
            assert_eq!(
                event,
                ServerEvent::Chat {
                    message: format!("m{n}"),
                    sender: "Alice".to_string(),
                    from,
                }
            );
        }

        handle.cancel();
    }

    #[tokio::test]
    async fn test_close_sends_close_frame_and_stops() {
        let (handle, task, mut socket_rx) = spawn_actor(CancellationToken::new(), 8);

        handle.close("bye".to_string()).await.unwrap();

        let frame = next_frame(&mut socket_rx).await;
        assert_eq!(
            frame,
            Message::Close(Some(CloseFrame {
                code: close_code::AWAY,
                reason: Cow::Borrowed("bye"),
            }))
        );

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.is_ok());

        // Actor gone: further deliveries are refused.
        let err = handle
            .try_deliver(ServerEvent::MemberLeft {
                connection_id: ConnectionId::new(),
            })
            .unwrap_err();
        assert!(matches!(err, SignalingError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_actor() {
        let parent_token = CancellationToken::new();
        let (handle, task, _socket_rx) = spawn_actor(parent_token.child_token(), 8);

        parent_token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.is_ok());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_socket_write_failure_stops_actor() {
        let (handle, task, socket_rx) = spawn_actor(CancellationToken::new(), 8);
        drop(socket_rx);

        handle
            .try_deliver(ServerEvent::Welcome {
                connection_id: handle.connection_id(),
            })
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_try_deliver_reports_full_mailbox() {
        let (handle, _mailbox) = ConnectionActorHandle::detached(ConnectionId::new(), 1);
        let event = ServerEvent::MemberLeft {
            connection_id: ConnectionId::new(),
        };

        assert!(handle.try_deliver(event.clone()).is_ok());
        assert!(matches!(
            handle.try_deliver(event),
            Err(SignalingError::MailboxFull)
        ));
    }
}
