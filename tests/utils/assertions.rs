//! Test assertion helpers - fluent API for verifying room streams
#![allow(dead_code)] // Test utilities may not all be used in every test

use futures::StreamExt;
use std::time::Duration;
use tokio::time::timeout;

use classroom_realtime::room::{CloseReason, Message, RoomEvent, Subscription};

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_WINDOW: Duration = Duration::from_millis(50);

// ============================================================================
// Assertion Helpers
// ============================================================================

pub struct StreamAssertion<'a> {
    subscription: &'a mut Subscription,
}

impl<'a> StreamAssertion<'a> {
    pub fn for_subscription(subscription: &'a mut Subscription) -> Self {
        Self { subscription }
    }

    async fn next_event(&mut self) -> RoomEvent {
        timeout(EVENT_TIMEOUT, self.subscription.next())
            .await
            .unwrap_or_else(|_| {
                panic!(
                    "{} timed out waiting for a room event",
                    self.subscription.connection_id()
                )
            })
            .unwrap_or_else(|| {
                panic!(
                    "{} stream ended without a terminal event",
                    self.subscription.connection_id()
                )
            })
    }

    /// Asserts the next event is a message and returns it
    pub async fn received_message(mut self) -> Message {
        match self.next_event().await {
            RoomEvent::Message(message) => message,
            RoomEvent::Closed(reason) => panic!("expected a message, stream closed: {:?}", reason),
        }
    }

    /// Asserts the next `count` events are messages and returns their bodies in order
    pub async fn received_bodies(mut self, count: usize) -> Vec<String> {
        let mut bodies = Vec::with_capacity(count);
        for _ in 0..count {
            match self.next_event().await {
                RoomEvent::Message(message) => bodies.push(message.body),
                RoomEvent::Closed(reason) => {
                    panic!(
                        "expected {} messages, stream closed after {}: {:?}",
                        count,
                        bodies.len(),
                        reason
                    )
                }
            }
        }
        bodies
    }

    /// Asserts the stream terminates with `reason` and then ends
    pub async fn closed_with(mut self, reason: CloseReason) {
        assert_eq!(self.next_event().await, RoomEvent::Closed(reason));
        assert!(
            self.subscription.next().await.is_none(),
            "stream must end after its terminal event"
        );
    }

    /// Asserts nothing arrives for a short window
    pub async fn received_nothing(self) {
        let result = timeout(SILENCE_WINDOW, self.subscription.next()).await;
        assert!(result.is_err(), "unexpected event: {:?}", result);
    }
}
