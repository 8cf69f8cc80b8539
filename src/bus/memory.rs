use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use super::{BusError, BusStream, MessageBus};

/// Per-topic channel capacity. Receivers that fall further behind skip ahead.
const TOPIC_CAPACITY: usize = 1024;

/// In-process bus backed by one broadcast channel per topic.
///
/// Several registries sharing one instance behave like several server
/// processes sharing a broker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageBus {
    /// Topic channels: topic -> sender
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of topics that currently have a live channel
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    async fn sender_for(&self, topic: &str) -> broadcast::Sender<String> {
        if let Some(sender) = self.topics.read().await.get(topic) {
            return sender.clone();
        }

        debug!(topic = %topic, "Creating new topic channel");
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        let topics = self.topics.read().await;

        let Some(sender) = topics.get(topic) else {
            debug!(topic = %topic, "Published to topic with no subscribers");
            return Ok(());
        };

        match sender.send(payload) {
            Ok(receivers) => {
                debug!(topic = %topic, receivers = receivers, "Bus payload published");
            }
            Err(_) => {
                // Every subscriber is gone; drop the channel so topics don't accumulate
                drop(topics);
                let mut topics = self.topics.write().await;
                if topics
                    .get(topic)
                    .is_some_and(|sender| sender.receiver_count() == 0)
                {
                    topics.remove(topic);
                    debug!(topic = %topic, "Removed topic with no subscribers");
                }
            }
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        let receiver = self.sender_for(topic).await.subscribe();
        let topic = topic.to_string();

        let stream = stream::unfold(receiver, move |mut receiver| {
            let topic = topic.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(payload) => return Some((payload, receiver)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped = skipped, "Bus subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_payloads_in_order() {
        let bus = InMemoryMessageBus::new();
        let mut stream = bus.subscribe("room:class_1").await.unwrap();

        bus.publish("room:class_1", "first".to_string()).await.unwrap();
        bus.publish("room:class_1", "second".to_string()).await.unwrap();

        assert_eq!(stream.next().await.as_deref(), Some("first"));
        assert_eq!(stream.next().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryMessageBus::new();
        let mut one = bus.subscribe("room:class_1").await.unwrap();
        let _two = bus.subscribe("room:class_2").await.unwrap();

        bus.publish("room:class_2", "not for one".to_string())
            .await
            .unwrap();
        bus.publish("room:class_1", "for one".to_string())
            .await
            .unwrap();

        assert_eq!(one.next().await.as_deref(), Some("for one"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryMessageBus::new();

        let result = bus.publish("room:nobody", "hello".to_string()).await;

        assert!(result.is_ok());
        assert_eq!(bus.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_subscription_releases_topic() {
        let bus = InMemoryMessageBus::new();
        let stream = bus.subscribe("room:class_9").await.unwrap();
        assert_eq!(bus.topic_count().await, 1);

        drop(stream);
        bus.publish("room:class_9", "late".to_string()).await.unwrap();

        assert_eq!(bus.topic_count().await, 0);
    }
}
