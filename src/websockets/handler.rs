use async_trait::async_trait;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::messages::{ChatPayload, MessageType, WebSocketMessage};
use super::socket::{Connection, MessageHandler};
use crate::room::{ConnectionId, RoomId, RoomService};
use crate::shared::{AppError, AppState, UserId};

/// Publishes chat frames received from a client to its room
pub struct ChatMessageHandler {
    rooms: Arc<dyn RoomService>,
}

impl ChatMessageHandler {
    pub fn new(rooms: Arc<dyn RoomService>) -> Self {
        Self { rooms }
    }
}

#[async_trait]
impl MessageHandler for ChatMessageHandler {
    async fn handle_message(
        &self,
        user_id: UserId,
        room_id: &RoomId,
        message: String,
    ) -> Option<WebSocketMessage> {
        let ws_message = match serde_json::from_str::<WebSocketMessage>(&message) {
            Ok(ws_message) => ws_message,
            Err(e) => {
                warn!(
                    user_id = user_id,
                    room_id = %room_id,
                    error = %e,
                    "Failed to parse WebSocket message"
                );
                return Some(WebSocketMessage::error("Malformed message"));
            }
        };

        match ws_message.message_type {
            MessageType::Chat => {
                let content = match serde_json::from_value::<ChatPayload>(ws_message.payload) {
                    Ok(payload) if !payload.content.trim().is_empty() => payload.content,
                    _ => return Some(WebSocketMessage::error("Chat content is required")),
                };

                match self.rooms.publish(room_id, user_id, content).await {
                    Ok(_) => None,
                    Err(e) => {
                        warn!(
                            user_id = user_id,
                            room_id = %room_id,
                            error = %e,
                            "Failed to publish chat from socket"
                        );
                        Some(WebSocketMessage::error(e.to_string()))
                    }
                }
            }
            other => {
                debug!(message_type = ?other, "Unhandled message type");
                Some(WebSocketMessage::error("Unsupported message type"))
            }
        }
    }
}

/// WebSocket endpoint for a class chat room
/// GET /api/chat/ws/:scheduleId/:userId
pub async fn chat_socket_handler(
    ws: WebSocketUpgrade,
    Path((schedule_id, user_id)): Path<(i64, UserId)>,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    let room_id = RoomId::for_schedule(schedule_id);

    // Subscribe before upgrading so a missing room is a plain 404
    let subscription = app_state
        .rooms
        .subscribe(&room_id, ConnectionId::for_user(user_id))
        .await?;

    info!(
        room_id = %room_id,
        user_id = user_id,
        "Establishing chat WebSocket connection"
    );

    let handler = Arc::new(ChatMessageHandler::new(Arc::clone(&app_state.rooms)));
    Ok(ws.on_upgrade(move |socket| async move {
        let connection = Connection::new(user_id, Box::new(socket), subscription, handler);
        if let Err(e) = connection.run().await {
            warn!(room_id = %room_id, user_id = user_id, error = ?e, "Chat WebSocket ended with error");
        }
        debug!(room_id = %room_id, user_id = user_id, "Chat WebSocket closed");
    }))
}
