use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::room::RoomId;

/// Read-only view of a scheduled class session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ClassSchedule {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl ClassSchedule {
    pub fn room_id(&self) -> RoomId {
        RoomId::for_schedule(self.id)
    }
}
