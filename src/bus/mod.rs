// Cross-process publish/subscribe transport
//
// Rooms relay every locally published message onto a bus topic so that other
// server instances serving the same room can fan it out to their own
// subscribers. Any broker with publish/subscribe semantics can back it.

// Public API - what other modules can use
pub use memory::InMemoryMessageBus;
pub use redis_bus::RedisMessageBus;

// Internal modules
mod memory;
mod redis_bus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Stream of raw payloads received on a subscribed topic.
/// Dropping it unsubscribes from the topic.
pub type BusStream = BoxStream<'static, String>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        BusError::Unavailable(err.to_string())
    }
}

/// Minimal publish/subscribe capability shared by all process instances
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a payload to every current subscriber of `topic`
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError>;

    /// Subscribes to `topic`; the subscription lives as long as the stream
    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError>;
}
