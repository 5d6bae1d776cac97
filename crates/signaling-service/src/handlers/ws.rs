//! WebSocket upgrade handler.
//!
//! One task per socket reads client frames and forwards parsed events to the
//! coordinator. The write half is handed to a `ConnectionActor`. When the
//! read loop ends (close frame, socket error, EOF or shutdown) the
//! coordinator is told the connection disconnected and the actor is stopped.

use crate::actors::{ActorType, ConnectionActor};
use crate::observability::metrics as prom;
use crate::protocol::{parse_client_event, ClientEvent, FrameRejection};
use crate::routes::AppState;
use crate::types::ConnectionId;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How long to wait for a connection actor to finish after the socket closes.
const ACTOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Upgrade `GET /ws` to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket connection from open to close.
#[instrument(skip_all, name = "sig.ws.connection", fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = ConnectionId::new();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));

    let (sink, mut stream) = socket.split();
    let cancel_token = state.coordinator.child_token();

    let (handle, task) = ConnectionActor::spawn(
        connection_id,
        sink,
        state.config.connection_mailbox,
        cancel_token.clone(),
        Arc::clone(&state.metrics),
    );

    if let Err(e) = state.coordinator.register(handle.clone()).await {
        warn!(
            target: "sig.ws",
            connection_id = %connection_id,
            error = %e,
            "Connection refused"
        );
        let _ = handle.close(e.client_message()).await;
        let _ = tokio::time::timeout(ACTOR_STOP_TIMEOUT, task).await;
        return;
    }

    info!(target: "sig.ws", connection_id = %connection_id, "WebSocket connected");

    loop {
        let frame = tokio::select! {
            () = cancel_token.cancelled() => break,
            frame = stream.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(_))) => {
                reject_frame(connection_id, FrameRejection::Binary);
                continue;
            }
            // Ping/pong is answered by the WebSocket layer.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                debug!(
                    target: "sig.ws",
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket read failed"
                );
                break;
            }
        };

        let event = match parse_client_event(&text) {
            Ok(event) => event,
            Err(rejection) => {
                reject_frame(connection_id, rejection);
                continue;
            }
        };

        if let Err(e) = forward(&state, connection_id, event).await {
            warn!(
                target: "sig.ws",
                connection_id = %connection_id,
                error = %e,
                "Coordinator unavailable, closing connection"
            );
            break;
        }
    }

    if let Err(e) = state.coordinator.disconnect(connection_id).await {
        debug!(
            target: "sig.ws",
            connection_id = %connection_id,
            error = %e,
            "Disconnect not delivered"
        );
    }

    handle.cancel();
    match tokio::time::timeout(ACTOR_STOP_TIMEOUT, task).await {
        Ok(Ok(())) => {}
        Ok(Err(join_error)) if join_error.is_panic() => {
            state.metrics.record_panic(ActorType::Connection);
        }
        Ok(Err(_)) => {}
        Err(_) => {
            warn!(
                target: "sig.ws",
                connection_id = %connection_id,
                "Connection actor did not stop in time"
            );
        }
    }

    info!(target: "sig.ws", connection_id = %connection_id, "WebSocket disconnected");
}

/// Hand a parsed client event to the coordinator.
async fn forward(
    state: &AppState,
    connection_id: ConnectionId,
    event: ClientEvent,
) -> Result<(), crate::errors::SignalingError> {
    match event {
        ClientEvent::Join { room } => state.coordinator.join(connection_id, room).await,
        ClientEvent::Signal { to, payload } => {
            state.coordinator.signal(connection_id, to, payload).await
        }
        ClientEvent::Chat { message, sender } => {
            state.coordinator.chat(connection_id, message, sender).await
        }
    }
}

fn reject_frame(connection_id: ConnectionId, rejection: FrameRejection) {
    prom::record_frame_rejected(rejection.as_str());
    debug!(
        target: "sig.ws",
        connection_id = %connection_id,
        reason = rejection.as_str(),
        "Ignoring inbound frame"
    );
}
