use serde::{Deserialize, Serialize};

use super::models::RoomId;
use crate::shared::UserId;

/// Request payload for publishing a chat message
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub sender_id: UserId,
    pub body: String,
}

/// Response for room creation
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room_id: RoomId,
    /// False when the room already existed
    pub created: bool,
}

/// Response for room deletion
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomDeletedResponse {
    pub room_id: RoomId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_response_serialization() {
        let response = RoomResponse {
            room_id: RoomId::for_schedule(42),
            created: true,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"room_id":"class_42","created":true}"#);
    }

    #[test]
    fn test_publish_request_requires_sender() {
        let result: Result<PublishRequest, _> = serde_json::from_str(r#"{"body":"hi"}"#);
        assert!(result.is_err());
    }
}
