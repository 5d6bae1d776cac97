//! End-to-end tests for the signaling protocol.
//!
//! Each test spawns a real server on a random port and drives it with
//! WebSocket clients.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use signaling_service::errors::SignalingError;
use signaling_service::protocol::ServerEvent;
use signaling_service::types::{ConnectionId, RoomId};
use signaling_test_utils::{TestClient, TestSignalingServer};
use std::collections::HashMap;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

fn member_joined(connection_id: ConnectionId, members: Vec<ConnectionId>) -> ServerEvent {
    ServerEvent::MemberJoined {
        connection_id,
        members,
    }
}

fn chat(message: &str, sender: &str, from: ConnectionId) -> ServerEvent {
    ServerEvent::Chat {
        message: message.to_string(),
        sender: sender.to_string(),
        from,
    }
}

/// Poll until the coordinator no longer has `room`.
async fn wait_for_room_closed(server: &TestSignalingServer, room: &str) -> Result<(), anyhow::Error> {
    for _ in 0..100 {
        match server.coordinator().get_room(RoomId::from(room)).await {
            Err(SignalingError::RoomNotFound(_)) => return Ok(()),
            Ok(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            Err(e) => return Err(e.into()),
        }
    }
    anyhow::bail!("room {} still open", room)
}

/// Join, chat and leave with two participants.
#[tokio::test]
async fn test_two_party_session() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn().await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;
    let mut bob = TestClient::connect(&server.ws_url()).await?;
    let (a, b) = (alice.id(), bob.id());

    alice.join("abc").await?;
    assert_eq!(alice.recv_event().await?, member_joined(a, vec![a]));

    bob.join("abc").await?;
    assert_eq!(alice.recv_event().await?, member_joined(b, vec![a, b]));
    assert_eq!(bob.recv_event().await?, member_joined(b, vec![a, b]));
    // Empty transcript: nothing replayed
    bob.expect_silence().await?;

    alice.chat("hi", "Alice").await?;
    assert_eq!(alice.recv_event().await?, chat("hi", "Alice", a));
    assert_eq!(bob.recv_event().await?, chat("hi", "Alice", a));

    bob.close().await?;
    assert_eq!(
        alice.recv_event().await?,
        ServerEvent::MemberLeft { connection_id: b }
    );

    let room = server.coordinator().get_room(RoomId::from("abc")).await?;
    assert_eq!(room.members, vec![a]);
    assert_eq!(room.transcript_len, 1);

    Ok(())
}

/// Every connection gets a distinct ID in its first frame.
#[tokio::test]
async fn test_welcome_assigns_unique_ids() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn().await?;
    let alice = TestClient::connect(&server.ws_url()).await?;
    let bob = TestClient::connect(&server.ws_url()).await?;

    assert_ne!(alice.id(), bob.id());

    let status = server.coordinator().get_status().await?;
    assert_eq!(status.connection_count, 2);
    assert_eq!(status.room_count, 0);
    assert!(!status.is_draining);

    Ok(())
}

/// A signal reaches its target and nobody else, with or without rooms.
#[tokio::test]
async fn test_signal_reaches_only_target() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn().await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;
    let mut bob = TestClient::connect(&server.ws_url()).await?;
    let mut carol = TestClient::connect(&server.ws_url()).await?;

    let offer = json!({"sdp": "v=0", "type": "offer"});
    alice.signal(bob.id(), offer.clone()).await?;

    assert_eq!(
        bob.recv_event().await?,
        ServerEvent::Signal {
            from: alice.id(),
            payload: offer,
        }
    );
    alice.expect_silence().await?;
    carol.expect_silence().await?;

    Ok(())
}

/// A signal to an unknown connection is dropped without an error frame.
#[tokio::test]
async fn test_signal_to_unknown_target_is_silent() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn().await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;
    let mut bob = TestClient::connect(&server.ws_url()).await?;

    alice.signal(ConnectionId::new(), json!({"candidate": "x"})).await?;
    alice.expect_silence().await?;
    bob.expect_silence().await?;

    // Connection is still usable
    alice.signal(bob.id(), json!(42)).await?;
    assert_eq!(
        bob.recv_event().await?,
        ServerEvent::Signal {
            from: alice.id(),
            payload: json!(42),
        }
    );

    Ok(())
}

/// The transcript outlives the room and is replayed to the next joiner.
#[tokio::test]
async fn test_transcript_replayed_after_room_closes() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn().await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;
    let a = alice.id();

    alice.join("abc").await?;
    alice.recv_event().await?;
    alice.chat("one", "Alice").await?;
    alice.chat("two", "Alice").await?;
    assert_eq!(alice.recv_event().await?, chat("one", "Alice", a));
    assert_eq!(alice.recv_event().await?, chat("two", "Alice", a));

    alice.close().await?;
    wait_for_room_closed(&server, "abc").await?;

    let transcript = server
        .coordinator()
        .get_transcript(RoomId::from("abc"))
        .await?;
    assert_eq!(transcript.len(), 2);

    let mut carol = TestClient::connect(&server.ws_url()).await?;
    let c = carol.id();
    carol.join("abc").await?;

    assert_eq!(carol.recv_event().await?, member_joined(c, vec![c]));
    assert_eq!(carol.recv_event().await?, chat("one", "Alice", a));
    assert_eq!(carol.recv_event().await?, chat("two", "Alice", a));
    carol.expect_silence().await?;

    Ok(())
}

/// Only the newest records are replayed when the transcript is capped.
#[tokio::test]
async fn test_transcript_cap_keeps_newest() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn_with_vars(HashMap::from([(
        "SIGNALING_MAX_TRANSCRIPT_RECORDS".to_string(),
        "2".to_string(),
    )]))
    .await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;
    let a = alice.id();

    alice.join("abc").await?;
    alice.recv_event().await?;
    for message in ["one", "two", "three"] {
        alice.chat(message, "Alice").await?;
        alice.recv_event().await?;
    }

    let mut bob = TestClient::connect(&server.ws_url()).await?;
    let b = bob.id();
    bob.join("abc").await?;

    assert_eq!(bob.recv_event().await?, member_joined(b, vec![a, b]));
    assert_eq!(bob.recv_event().await?, chat("two", "Alice", a));
    assert_eq!(bob.recv_event().await?, chat("three", "Alice", a));
    bob.expect_silence().await?;

    Ok(())
}

/// Binary and malformed frames are ignored and the connection stays open.
#[tokio::test]
async fn test_bad_frames_are_ignored() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn().await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;
    let a = alice.id();

    alice.send_raw(Message::Binary(vec![1, 2, 3])).await?;
    alice.send_raw(Message::Text("not json".to_string())).await?;
    alice
        .send_raw(Message::Text(r#"{"type":"teleport"}"#.to_string()))
        .await?;
    alice
        .send_raw(Message::Text(r#"{"type":"join"}"#.to_string()))
        .await?;
    alice.expect_silence().await?;

    alice.join("abc").await?;
    assert_eq!(alice.recv_event().await?, member_joined(a, vec![a]));

    Ok(())
}

/// Chat from a connection outside any room goes nowhere.
#[tokio::test]
async fn test_chat_outside_room_is_dropped() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn().await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;
    let mut bob = TestClient::connect(&server.ws_url()).await?;

    bob.join("abc").await?;
    bob.recv_event().await?;

    alice.chat("anyone?", "Alice").await?;
    alice.expect_silence().await?;
    bob.expect_silence().await?;

    let status = server.coordinator().get_status().await?;
    assert_eq!(status.transcript_count, 0);

    Ok(())
}

/// Joining a second room leaves the first one.
#[tokio::test]
async fn test_switching_rooms_notifies_old_room() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn().await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;
    let mut bob = TestClient::connect(&server.ws_url()).await?;
    let (a, b) = (alice.id(), bob.id());

    alice.join("first").await?;
    alice.recv_event().await?;
    bob.join("first").await?;
    alice.recv_event().await?;
    bob.recv_event().await?;

    alice.join("second").await?;
    assert_eq!(
        bob.recv_event().await?,
        ServerEvent::MemberLeft { connection_id: a }
    );
    assert_eq!(
        alice.recv_event().await?,
        ServerEvent::MemberLeft { connection_id: a }
    );
    assert_eq!(alice.recv_event().await?, member_joined(a, vec![a]));

    let first = server.coordinator().get_room(RoomId::from("first")).await?;
    assert_eq!(first.members, vec![b]);

    Ok(())
}

/// A frame over the size limit closes the sender, and its room hears about it.
#[tokio::test]
async fn test_oversized_frame_closes_connection() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn_with_vars(HashMap::from([(
        "SIGNALING_MAX_MESSAGE_BYTES".to_string(),
        "256".to_string(),
    )]))
    .await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;
    let mut bob = TestClient::connect(&server.ws_url()).await?;
    let a = alice.id();

    alice.join("abc").await?;
    alice.recv_event().await?;
    bob.join("abc").await?;
    alice.recv_event().await?;
    bob.recv_event().await?;

    alice.chat(&"x".repeat(4096), "Alice").await?;
    alice.expect_closed().await?;

    assert_eq!(
        bob.recv_event().await?,
        ServerEvent::MemberLeft { connection_id: a }
    );

    Ok(())
}

/// Shutdown closes open connections and refuses new ones.
#[tokio::test]
async fn test_shutdown_closes_connections() -> Result<(), anyhow::Error> {
    let server = TestSignalingServer::spawn().await?;
    let mut alice = TestClient::connect(&server.ws_url()).await?;

    server.coordinator().shutdown(Duration::from_secs(1)).await?;
    alice.expect_closed().await?;

    assert!(TestClient::connect(&server.ws_url()).await.is_err());

    Ok(())
}
