//! Room, transcript and session tables.
//!
//! `RoomDirectory` is plain synchronous state owned by the
//! `RoomCoordinatorActor`. Every operation applies its table updates and
//! returns the outbound [`Delivery`] list; the actor is responsible for
//! pushing those into connection mailboxes. Because the actor processes one
//! event at a time, each operation here is atomic with respect to the tables.
//!
//! # Tables
//!
//! | Table       | Key            | Value                               |
//! |-------------|----------------|-------------------------------------|
//! | rooms       | `RoomId`       | member list, insertion ordered      |
//! | transcripts | `RoomId`       | chat records, append ordered        |
//! | membership  | `ConnectionId` | the room the connection is in       |
//! | joined_at   | `ConnectionId` | when the connection last joined     |
//!
//! A room exists while its member list is non-empty. Transcripts outlive
//! their room so a re-used identifier replays its history.

use crate::protocol::ServerEvent;
use crate::types::{ConnectionId, RoomId};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// One outbound event addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Recipient.
    pub to: ConnectionId,
    /// Event to deliver.
    pub event: ServerEvent,
}

impl Delivery {
    fn new(to: ConnectionId, event: ServerEvent) -> Self {
        Self { to, event }
    }
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    /// Display name supplied by the sender.
    pub sender: String,
    /// Message text.
    pub message: String,
    /// Connection that sent the message.
    pub from: ConnectionId,
}

impl ChatRecord {
    /// The `chat` event for this record (same shape live and replayed).
    #[must_use]
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::Chat {
            message: self.message.clone(),
            sender: self.sender.clone(),
            from: self.from,
        }
    }
}

/// Result of a join.
#[derive(Debug, Default)]
pub struct JoinOutcome {
    /// `member-left` for a room the connection had to leave first, then
    /// `member-joined` for the new room, then transcript replay.
    pub deliveries: Vec<Delivery>,
    /// Room the connection was moved out of, if any.
    pub left_room: Option<RoomId>,
    /// Member list length after the join.
    pub member_count: usize,
    /// Number of transcript records replayed to the joiner.
    pub replayed: usize,
}

/// Result of a chat message.
#[derive(Debug, Default)]
pub struct ChatOutcome {
    /// Room the message was recorded in; `None` if the sender is in no room.
    pub room: Option<RoomId>,
    /// One `chat` event per member.
    pub deliveries: Vec<Delivery>,
    /// Records evicted from the transcript to honour the size cap.
    pub evicted: usize,
}

/// Result of a disconnect.
#[derive(Debug, Default)]
pub struct Departure {
    /// Room the connection was in, if any.
    pub room: Option<RoomId>,
    /// `member-left` for every member present at departure time.
    pub deliveries: Vec<Delivery>,
    /// Whether the room's member list became empty and was deleted.
    pub room_closed: bool,
    /// Time since the connection's last join (informational).
    pub session_duration: Option<Duration>,
}

/// In-memory room coordination tables.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<RoomId, Vec<ConnectionId>>,
    transcripts: HashMap<RoomId, VecDeque<ChatRecord>>,
    membership: HashMap<ConnectionId, RoomId>,
    joined_at: HashMap<ConnectionId, Instant>,
    /// Per-room transcript cap; 0 keeps every record.
    max_transcript_records: usize,
}

impl RoomDirectory {
    /// Create empty tables.
    ///
    /// `max_transcript_records` bounds each room's transcript, evicting the
    /// oldest records first. Zero disables the bound.
    #[must_use]
    pub fn new(max_transcript_records: usize) -> Self {
        Self {
            max_transcript_records,
            ..Self::default()
        }
    }

    /// Add `connection_id` to `room_id`.
    ///
    /// A connection already in another room leaves it first. Re-joining the
    /// same room appends a second member entry. Every member (joiner
    /// included) is sent the full member list; the joiner then receives the
    /// room's transcript in append order.
    pub fn join(&mut self, connection_id: ConnectionId, room_id: RoomId, now: Instant) -> JoinOutcome {
        let mut outcome = JoinOutcome::default();

        if let Some(current) = self.membership.get(&connection_id).cloned() {
            if current != room_id {
                let (deliveries, _) = self.depart(connection_id, &current);
                outcome.deliveries.extend(deliveries);
                outcome.left_room = Some(current);
            }
        }

        let members = self.rooms.entry(room_id.clone()).or_default();
        members.push(connection_id);
        let snapshot = members.clone();

        self.membership.insert(connection_id, room_id.clone());
        self.joined_at.insert(connection_id, now);

        outcome.member_count = snapshot.len();
        outcome
            .deliveries
            .extend(snapshot.iter().map(|member| {
                Delivery::new(
                    *member,
                    ServerEvent::MemberJoined {
                        connection_id,
                        members: snapshot.clone(),
                    },
                )
            }));

        if let Some(transcript) = self.transcripts.get(&room_id) {
            outcome.replayed = transcript.len();
            outcome.deliveries.extend(
                transcript
                    .iter()
                    .map(|record| Delivery::new(connection_id, record.to_event())),
            );
        }

        outcome
    }

    /// Address `payload` to `to`, tagged with the sender.
    ///
    /// The directory does not know which connections are live; the caller
    /// drops the delivery if `to` is not registered.
    #[must_use]
    pub fn relay_signal(from: ConnectionId, to: ConnectionId, payload: Value) -> Delivery {
        Delivery::new(to, ServerEvent::Signal { from, payload })
    }

    /// Record a chat message in the sender's room and fan it out to every
    /// member, sender included. Senders outside any room are ignored.
    pub fn chat(&mut self, from: ConnectionId, message: String, sender: String) -> ChatOutcome {
        let Some(room_id) = self.membership.get(&from).cloned() else {
            return ChatOutcome::default();
        };

        let record = ChatRecord {
            sender,
            message,
            from,
        };
        let event = record.to_event();

        let transcript = self.transcripts.entry(room_id.clone()).or_default();
        transcript.push_back(record);

        let mut evicted = 0;
        if self.max_transcript_records > 0 {
            while transcript.len() > self.max_transcript_records {
                transcript.pop_front();
                evicted += 1;
            }
        }

        let deliveries = self
            .rooms
            .get(&room_id)
            .map(|members| {
                members
                    .iter()
                    .map(|member| Delivery::new(*member, event.clone()))
                    .collect()
            })
            .unwrap_or_default();

        ChatOutcome {
            room: Some(room_id),
            deliveries,
            evicted,
        }
    }

    /// Remove a closing connection from its room.
    ///
    /// Members present before removal (the departing connection included)
    /// are notified. The room entry is deleted once empty; its transcript is
    /// kept.
    pub fn disconnect(&mut self, connection_id: ConnectionId, now: Instant) -> Departure {
        let session_duration = self
            .joined_at
            .remove(&connection_id)
            .map(|joined| now.saturating_duration_since(joined));

        let Some(room_id) = self.membership.get(&connection_id).cloned() else {
            return Departure {
                session_duration,
                ..Departure::default()
            };
        };

        let (deliveries, room_closed) = self.depart(connection_id, &room_id);

        Departure {
            room: Some(room_id),
            deliveries,
            room_closed,
            session_duration,
        }
    }

    /// Notify, remove every entry of `connection_id`, and drop the room if
    /// it is left empty.
    fn depart(&mut self, connection_id: ConnectionId, room_id: &RoomId) -> (Vec<Delivery>, bool) {
        self.membership.remove(&connection_id);

        let Some(members) = self.rooms.get_mut(room_id) else {
            return (Vec::new(), false);
        };

        let deliveries = members
            .iter()
            .map(|member| Delivery::new(*member, ServerEvent::MemberLeft { connection_id }))
            .collect();

        members.retain(|member| *member != connection_id);

        let room_closed = members.is_empty();
        if room_closed {
            self.rooms.remove(room_id);
        }

        (deliveries, room_closed)
    }

    /// Member list of a room, or `None` if the room does not exist.
    #[must_use]
    pub fn members(&self, room_id: &RoomId) -> Option<&[ConnectionId]> {
        self.rooms.get(room_id).map(Vec::as_slice)
    }

    /// The room a connection is currently in.
    #[must_use]
    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<&RoomId> {
        self.membership.get(connection_id)
    }

    /// Copy of a room's transcript (empty if none was ever written).
    #[must_use]
    pub fn transcript(&self, room_id: &RoomId) -> Vec<ChatRecord> {
        self.transcripts
            .get(room_id)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// When the connection last joined a room.
    #[must_use]
    pub fn joined_at(&self, connection_id: &ConnectionId) -> Option<Instant> {
        self.joined_at.get(connection_id).copied()
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of room identifiers with a transcript.
    #[must_use]
    pub fn transcript_count(&self) -> usize {
        self.transcripts.len()
    }
}
