use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, instrument, warn};

use super::{BusError, BusStream, MessageBus};

/// Redis pub/sub backed bus.
///
/// Publishes go through a shared, auto-reconnecting connection manager.
/// Each subscription opens its own pub/sub connection, which is closed
/// (and the channel unsubscribed) when the returned stream is dropped.
#[derive(Clone)]
pub struct RedisMessageBus {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisMessageBus {
    /// Connects to Redis at `url`
    #[instrument(skip(url))]
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_connection_manager().await?;

        info!("Connected to Redis message bus");

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl MessageBus for RedisMessageBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(topic, payload).await.map_err(|e| {
            warn!(topic = %topic, error = %e, "Redis publish failed");
            BusError::from(e)
        })?;

        debug!(topic = %topic, receivers = receivers, "Published to Redis channel");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        debug!(topic = %topic, "Subscribed to Redis channel");

        let topic = topic.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let decoded = msg.get_payload::<String>();
            let topic = topic.clone();
            async move {
                match decoded {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping undecodable Redis payload");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
