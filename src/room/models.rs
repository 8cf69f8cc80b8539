use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::shared::UserId;

/// Stable identifier of a chat room, derived from its class schedule
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic room id for a class schedule: `class_<scheduleID>`
    pub fn for_schedule(schedule_id: i64) -> Self {
        Self(format!("class_{schedule_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bus topic carrying this room's cross-process traffic
    pub fn topic(&self) -> String {
        format!("room:{}", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one subscriber connection within a room
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh connection id for a user's stream
    pub fn for_user(user_id: UserId) -> Self {
        Self(format!("user-{user_id}-{}", Uuid::new_v4()))
    }

    /// Fresh connection id for an unauthenticated stream
    pub fn anonymous() -> Self {
        Self(format!("anon-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat message published to a room. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(room_id: RoomId, sender_id: UserId, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            body,
            timestamp: Utc::now(),
        }
    }
}

/// Why a subscriber stream was terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The room was deleted (explicitly or by the schedule reconciler)
    RoomDeleted,
    /// The subscriber could not keep up and its buffer overflowed
    Overflow,
    /// The same connection subscribed again
    Replaced,
    /// The server is shutting down
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::RoomDeleted => "room_deleted",
            CloseReason::Overflow => "overflow",
            CloseReason::Replaced => "replaced",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Item yielded by a room subscription
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Message(Message),
    /// Terminal signal; the stream ends right after it
    Closed(CloseReason),
}

/// Payload carried on a room's bus topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEnvelope {
    /// Instance that published the message
    pub origin: Uuid,
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_for_schedule() {
        let room_id = RoomId::for_schedule(42);
        assert_eq!(room_id.as_str(), "class_42");
        assert_eq!(room_id.topic(), "room:class_42");
    }

    #[test]
    fn test_room_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomId::for_schedule(7)).unwrap();
        assert_eq!(json, "\"class_7\"");
    }

    #[test]
    fn test_connection_ids_are_unique_per_stream() {
        assert_ne!(ConnectionId::for_user(1), ConnectionId::for_user(1));
    }

    #[test]
    fn test_close_reason_serialization() {
        let json = serde_json::to_string(&CloseReason::RoomDeleted).unwrap();
        assert_eq!(json, "\"room_deleted\"");
        assert_eq!(CloseReason::Overflow.as_str(), "overflow");
    }
}
