use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::models::{DirectMessage, PairKey};
use crate::shared::{AppError, UserId};

/// Default number of messages kept per conversation
pub const DEFAULT_DM_HISTORY_CAPACITY: usize = 1000;

/// One-to-one messaging, independent of room lifecycle
#[async_trait]
pub trait DirectMessageService: Send + Sync {
    async fn send_direct_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        body: String,
    ) -> Result<DirectMessage, AppError>;

    /// The conversation between two users in send order. Symmetric in its arguments.
    async fn get_direct_messages(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Vec<DirectMessage>, AppError>;
}

/// In-memory conversation logs keyed by canonical pair
pub struct DirectMessageStore {
    conversations: RwLock<HashMap<PairKey, VecDeque<DirectMessage>>>,
    capacity: usize,
}

impl DirectMessageStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            capacity,
        }
    }
}

impl Default for DirectMessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_DM_HISTORY_CAPACITY)
    }
}

#[async_trait]
impl DirectMessageService for DirectMessageStore {
    #[instrument(skip(self, body))]
    async fn send_direct_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        body: String,
    ) -> Result<DirectMessage, AppError> {
        let pair_key = PairKey::canonical(sender_id, receiver_id);
        let message = DirectMessage {
            id: Uuid::new_v4(),
            pair_key: pair_key.clone(),
            sender_id,
            receiver_id,
            body,
            timestamp: Utc::now(),
        };

        let mut conversations = self.conversations.write().await;
        let log = conversations.entry(pair_key).or_default();
        while self.capacity > 0 && log.len() >= self.capacity {
            log.pop_front();
        }
        if self.capacity > 0 {
            log.push_back(message.clone());
        }

        debug!(
            pair_key = %message.pair_key,
            message_id = %message.id,
            conversation_length = log.len(),
            "Direct message stored"
        );

        Ok(message)
    }

    async fn get_direct_messages(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Vec<DirectMessage>, AppError> {
        let pair_key = PairKey::canonical(user_a, user_b);
        Ok(self
            .conversations
            .read()
            .await
            .get(&pair_key)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default())
    }
}
