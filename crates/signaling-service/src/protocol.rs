//! WebSocket wire protocol.
//!
//! Every frame is a JSON text frame tagged by a kebab-case `type` field.
//! Signal payloads are carried as arbitrary JSON and never inspected.
//!
//! ```text
//! client -> server   {"type":"join","room":"abc"}
//!                    {"type":"signal","to":"<connection-id>","payload":{...}}
//!                    {"type":"chat","message":"hi","sender":"Alice"}
//!
//! server -> client   {"type":"welcome","connection_id":"..."}
//!                    {"type":"member-joined","connection_id":"...","members":[...]}
//!                    {"type":"member-left","connection_id":"..."}
//!                    {"type":"signal","from":"...","payload":{...}}
//!                    {"type":"chat","message":"hi","sender":"Alice","from":"..."}
//! ```

use crate::types::{ConnectionId, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join (or create) a room.
    Join { room: RoomId },

    /// Relay an opaque negotiation payload to one connection.
    Signal { to: ConnectionId, payload: Value },

    /// Post a chat message to the sender's current room.
    Chat {
        message: String,
        /// Display name, caller-supplied and unauthenticated.
        #[serde(default)]
        sender: String,
    },
}

impl ClientEvent {
    /// Bounded label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::Signal { .. } => "signal",
            ClientEvent::Chat { .. } => "chat",
        }
    }
}

/// Events sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First frame on every connection, carrying the connection's own ID.
    Welcome { connection_id: ConnectionId },

    /// A connection joined the room; `members` is the full list after the join.
    MemberJoined {
        connection_id: ConnectionId,
        members: Vec<ConnectionId>,
    },

    /// A connection left the room.
    MemberLeft { connection_id: ConnectionId },

    /// Relayed signal payload.
    Signal { from: ConnectionId, payload: Value },

    /// Chat message, live or replayed from the transcript.
    Chat {
        message: String,
        sender: String,
        from: ConnectionId,
    },
}

impl ServerEvent {
    /// Bounded label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::MemberJoined { .. } => "member-joined",
            ServerEvent::MemberLeft { .. } => "member-left",
            ServerEvent::Signal { .. } => "signal",
            ServerEvent::Chat { .. } => "chat",
        }
    }
}

/// Why an inbound frame was not turned into a [`ClientEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRejection {
    /// Binary frame; the protocol is text only.
    Binary,
    /// Text that is not a recognised event.
    Malformed,
}

impl FrameRejection {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FrameRejection::Binary => "binary",
            FrameRejection::Malformed => "malformed",
        }
    }
}

/// Parse a text frame into a client event.
pub fn parse_client_event(text: &str) -> Result<ClientEvent, FrameRejection> {
    serde_json::from_str(text).map_err(|_| FrameRejection::Malformed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join() {
        let event = parse_client_event(r#"{"type":"join","room":"abc"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Join {
                room: RoomId::from("abc")
            }
        );
        assert_eq!(event.kind(), "join");
    }

    #[test]
    fn test_parse_signal_keeps_payload_verbatim() {
        let target = ConnectionId::new();
        let text = json!({
            "type": "signal",
            "to": target,
            "payload": "{\"sdp\":{\"type\":\"offer\",\"sdp\":\"v=0\"}}",
        })
        .to_string();

        assert_eq!(
            parse_client_event(&text).unwrap(),
            ClientEvent::Signal {
                to: target,
                payload: Value::String(
                    "{\"sdp\":{\"type\":\"offer\",\"sdp\":\"v=0\"}}".to_string()
                ),
            }
        );
    }

    #[test]
    fn test_parse_chat_sender_defaults_to_empty() {
        let event = parse_client_event(r#"{"type":"chat","message":"hi"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Chat {
                message: "hi".to_string(),
                sender: String::new(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_invalid() {
        assert_eq!(
            parse_client_event(r#"{"type":"teleport"}"#),
            Err(FrameRejection::Malformed)
        );
        assert_eq!(parse_client_event("not json"), Err(FrameRejection::Malformed));
        assert_eq!(
            parse_client_event(r#"{"type":"signal","to":"nope","payload":1}"#),
            Err(FrameRejection::Malformed)
        );
    }

    #[test]
    fn test_server_event_wire_shape() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        let joined = serde_json::to_value(ServerEvent::MemberJoined {
            connection_id: b,
            members: vec![a, b],
        })
        .unwrap();
        assert_eq!(
            joined,
            json!({
                "type": "member-joined",
                "connection_id": b,
                "members": [a, b],
            })
        );

        let chat = serde_json::to_value(ServerEvent::Chat {
            message: "hi".to_string(),
            sender: "Alice".to_string(),
            from: a,
        })
        .unwrap();
        assert_eq!(
            chat,
            json!({"type": "chat", "message": "hi", "sender": "Alice", "from": a})
        );
    }

    #[test]
    fn test_rejection_labels() {
        assert_eq!(FrameRejection::Binary.as_str(), "binary");
        assert_eq!(FrameRejection::Malformed.as_str(), "malformed");
    }
}
