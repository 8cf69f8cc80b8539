use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::shared::UserId;

/// Direction-independent key for a two-user conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairKey(String);

impl PairKey {
    /// Same key for (a, b) and (b, a): lower id first
    pub fn canonical(a: UserId, b: UserId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{low}:{high}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: Uuid,
    pub pair_key: PairKey,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Request payload for sending a direct message
#[derive(Debug, Deserialize)]
pub struct SendDirectMessageRequest {
    pub body: String,
}
