use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use classroom_realtime::bus::{BusError, BusStream, InMemoryMessageBus, MessageBus};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Bus whose broker is never reachable. Counts publish attempts.
#[derive(Default)]
pub struct UnreachableBus {
    publish_attempts: AtomicUsize,
}

impl UnreachableBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_attempts(&self) -> usize {
        self.publish_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBus for UnreachableBus {
    async fn publish(&self, _topic: &str, _payload: String) -> Result<(), BusError> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);
        Err(BusError::Unavailable("connection refused".to_string()))
    }

    async fn subscribe(&self, _topic: &str) -> Result<BusStream, BusError> {
        Err(BusError::Unavailable("connection refused".to_string()))
    }
}

/// How the first subscribe on a `RecoveringBus` misbehaves
#[derive(Debug, Clone, Copy)]
pub enum Outage {
    /// The broker refuses the subscription
    Refused,
    /// The subscription is accepted and then immediately dropped
    EndedStream,
}

/// Shares `inner` with other instances, but its first subscribe fails
pub struct RecoveringBus {
    inner: Arc<InMemoryMessageBus>,
    outage: Outage,
    subscribes: AtomicUsize,
}

impl RecoveringBus {
    pub fn new(inner: Arc<InMemoryMessageBus>, outage: Outage) -> Self {
        Self {
            inner,
            outage,
            subscribes: AtomicUsize::new(0),
        }
    }

    pub fn subscribe_attempts(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBus for RecoveringBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        if self.subscribes.fetch_add(1, Ordering::SeqCst) == 0 {
            return match self.outage {
                Outage::Refused => Err(BusError::Unavailable("connection refused".to_string())),
                Outage::EndedStream => Ok(stream::empty().boxed()),
            };
        }
        self.inner.subscribe(topic).await
    }
}
