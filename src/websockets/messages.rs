use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::room::{CloseReason, Message};

/// Message types for WebSocket communication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // Client -> Server, and Server -> Client for room traffic
    Chat,

    // Server -> Client
    Closed,
    Error,
}

/// Metadata for WebSocket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessageMeta {
    pub timestamp: DateTime<Utc>,
}

/// Base structure for WebSocket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<WebSocketMessageMeta>,
}

/// Client-to-Server chat payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub content: String,
}

/// Server-to-Client payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPayload {
    pub reason: CloseReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl WebSocketMessage {
    fn new(message_type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            message_type,
            payload,
            meta: Some(WebSocketMessageMeta {
                timestamp: Utc::now(),
            }),
        }
    }

    /// A room message pushed to the client
    pub fn chat(message: &Message) -> Self {
        Self::new(MessageType::Chat, serde_json::json!(message))
    }

    /// Terminal frame sent before the server closes the socket
    pub fn closed(reason: CloseReason) -> Self {
        Self::new(
            MessageType::Closed,
            serde_json::json!(ClosedPayload { reason }),
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            MessageType::Error,
            serde_json::json!(ErrorPayload {
                message: message.into()
            }),
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
