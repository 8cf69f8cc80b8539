use serde::{Deserialize, Serialize};

use crate::room::RoomId;
use crate::shared::UserId;

/// Point-in-time view of a room's screen share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenShareState {
    pub room_id: RoomId,
    /// None while nobody is presenting
    pub presenter_id: Option<UserId>,
    pub viewer_count: usize,
}

/// Emitted on a presenter feed whenever the presenter changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenterChanged {
    pub room_id: RoomId,
    pub presenter_id: Option<UserId>,
}

/// Request payload for creating a room from the live-class surface
#[derive(Debug, Deserialize)]
pub struct CreateLiveRoomRequest {
    pub schedule_id: i64,
}

/// Response for live room creation
#[derive(Debug, Serialize, Deserialize)]
pub struct LiveRoomResponse {
    pub room_id: RoomId,
    /// False when the room already existed
    pub created: bool,
}
