//! WebSocket test client.
//!
//! `TestClient` speaks the signaling protocol over a real socket. On connect
//! it consumes the `welcome` frame, so `id()` is the connection ID the server
//! assigned.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use signaling_service::protocol::{ClientEvent, ServerEvent};
use signaling_service::types::{ConnectionId, RoomId};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Default time to wait for an expected event.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Default time to wait when asserting that nothing arrives.
pub const DEFAULT_SILENCE_WINDOW: Duration = Duration::from_millis(200);

/// A connected signaling client.
pub struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    connection_id: ConnectionId,
}

impl TestClient {
    /// Connect to `url` and wait for the `welcome` frame.
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;

        let mut client = Self {
            stream,
            connection_id: ConnectionId::new(),
        };

        match client.recv_event().await? {
            ServerEvent::Welcome { connection_id } => client.connection_id = connection_id,
            other => anyhow::bail!("Expected welcome, got {:?}", other),
        }

        Ok(client)
    }

    /// The connection ID assigned by the server.
    pub fn id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Send a client event as a JSON text frame.
    pub async fn send(&mut self, event: &ClientEvent) -> Result<(), anyhow::Error> {
        let text = serde_json::to_string(event)?;
        self.send_raw(Message::Text(text)).await
    }

    /// Send an arbitrary frame (for malformed-input tests).
    pub async fn send_raw(&mut self, message: Message) -> Result<(), anyhow::Error> {
        self.stream
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send frame: {}", e))
    }

    /// Join (or create) a room.
    pub async fn join(&mut self, room: &str) -> Result<(), anyhow::Error> {
        self.send(&ClientEvent::Join {
            room: RoomId::from(room),
        })
        .await
    }

    /// Relay a payload to another connection.
    pub async fn signal(&mut self, to: ConnectionId, payload: Value) -> Result<(), anyhow::Error> {
        self.send(&ClientEvent::Signal { to, payload }).await
    }

    /// Post a chat message.
    pub async fn chat(&mut self, message: &str, sender: &str) -> Result<(), anyhow::Error> {
        self.send(&ClientEvent::Chat {
            message: message.to_string(),
            sender: sender.to_string(),
        })
        .await
    }

    /// Wait for the next server event (up to [`DEFAULT_RECV_TIMEOUT`]).
    pub async fn recv_event(&mut self) -> Result<ServerEvent, anyhow::Error> {
        self.recv_event_within(DEFAULT_RECV_TIMEOUT).await
    }

    /// Wait up to `timeout` for the next server event.
    pub async fn recv_event_within(
        &mut self,
        timeout: Duration,
    ) -> Result<ServerEvent, anyhow::Error> {
        tokio::time::timeout(timeout, self.next_event())
            .await
            .map_err(|_| anyhow::anyhow!("Timed out after {:?} waiting for event", timeout))?
    }

    /// Assert that no event arrives within [`DEFAULT_SILENCE_WINDOW`].
    pub async fn expect_silence(&mut self) -> Result<(), anyhow::Error> {
        match tokio::time::timeout(DEFAULT_SILENCE_WINDOW, self.next_event()).await {
            Err(_) => Ok(()),
            Ok(Ok(event)) => anyhow::bail!("Expected silence, got {:?}", event),
            Ok(Err(e)) => Err(e),
        }
    }

    /// Wait for the server to close the connection.
    ///
    /// Returns the close frame reason, if any. A dropped socket counts as
    /// closed with no reason.
    pub async fn expect_closed(&mut self) -> Result<Option<String>, anyhow::Error> {
        let wait = async {
            while let Some(frame) = self.stream.next().await {
                match frame {
                    Ok(Message::Close(frame)) => {
                        return Ok(frame.map(|f| f.reason.into_owned()));
                    }
                    // Events already in flight are skipped.
                    Ok(_) => continue,
                    Err(_) => return Ok(None),
                }
            }
            Ok::<_, anyhow::Error>(None)
        };

        tokio::time::timeout(DEFAULT_RECV_TIMEOUT, wait)
            .await
            .map_err(|_| anyhow::anyhow!("Timed out waiting for close"))?
    }

    /// Close the connection with a normal close frame.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.stream
            .close(None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close: {}", e))
    }

    async fn next_event(&mut self) -> Result<ServerEvent, anyhow::Error> {
        loop {
            let frame = self
                .stream
                .next()
                .await
                .ok_or_else(|| anyhow::anyhow!("Connection closed"))?
                .map_err(|e| anyhow::anyhow!("Read failed: {}", e))?;

            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| anyhow::anyhow!("Unparseable event {}: {}", text, e));
                }
                Message::Close(frame) => {
                    anyhow::bail!("Connection closed by server: {:?}", frame)
                }
                _ => continue,
            }
        }
    }
}
