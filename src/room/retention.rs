use chrono::Utc;
use std::collections::VecDeque;
use std::time::Duration;

use super::models::Message;

/// Default number of messages a room keeps for history reads
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Storage for a room's recent message history.
///
/// Owned by the room actor, so implementations need no internal locking.
pub trait MessageLog: Send {
    fn append(&mut self, message: Message);

    /// Retained messages, oldest first
    fn recent(&self) -> Vec<Message>;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How rooms retain history; chosen by configuration
#[derive(Debug, Clone, PartialEq)]
pub enum RetentionPolicy {
    /// Keep the last `capacity` messages in memory, optionally also dropping
    /// messages older than `max_age`
    RingBuffer {
        capacity: usize,
        max_age: Option<Duration>,
    },
    /// Keep nothing in memory; history is served by durable storage elsewhere
    Disabled,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::RingBuffer {
            capacity: DEFAULT_HISTORY_CAPACITY,
            max_age: None,
        }
    }
}

impl RetentionPolicy {
    /// Builds an empty log for a new room
    pub fn build(&self) -> Box<dyn MessageLog> {
        match self {
            RetentionPolicy::RingBuffer { capacity, max_age } => {
                Box::new(RingBufferLog::new(*capacity, *max_age))
            }
            RetentionPolicy::Disabled => Box::new(NullLog),
        }
    }
}

/// Bounded in-memory log, oldest entries evicted first
pub struct RingBufferLog {
    capacity: usize,
    max_age: Option<chrono::Duration>,
    entries: VecDeque<Message>,
}

impl RingBufferLog {
    pub fn new(capacity: usize, max_age: Option<Duration>) -> Self {
        Self {
            capacity,
            max_age: max_age.and_then(|age| chrono::Duration::from_std(age).ok()),
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
        }
    }

    fn evict_expired(&mut self) {
        if let Some(max_age) = self.max_age {
            let cutoff = Utc::now() - max_age;
            while self
                .entries
                .front()
                .is_some_and(|oldest| oldest.timestamp < cutoff)
            {
                self.entries.pop_front();
            }
        }
    }
}

impl MessageLog for RingBufferLog {
    fn append(&mut self, message: Message) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
        self.evict_expired();
    }

    fn recent(&self) -> Vec<Message> {
        match self.max_age {
            Some(max_age) => {
                let cutoff = Utc::now() - max_age;
                self.entries
                    .iter()
                    .filter(|m| m.timestamp >= cutoff)
                    .cloned()
                    .collect()
            }
            None => self.entries.iter().cloned().collect(),
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Log that retains nothing
pub struct NullLog;

impl MessageLog for NullLog {
    fn append(&mut self, _message: Message) {}

    fn recent(&self) -> Vec<Message> {
        Vec::new()
    }

    fn clear(&mut self) {}

    fn len(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::models::RoomId;

    fn message(body: &str) -> Message {
        Message::new(RoomId::for_schedule(1), 1, body.to_string())
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut log = RingBufferLog::new(2, None);

        log.append(message("a"));
        log.append(message("b"));
        log.append(message("c"));

        let bodies: Vec<String> = log.recent().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["b", "c"]);
    }

    #[test]
    fn test_ring_buffer_drops_expired_messages() {
        let mut log = RingBufferLog::new(10, Some(Duration::from_secs(60)));
        let mut stale = message("stale");
        stale.timestamp = Utc::now() - chrono::Duration::minutes(5);

        log.append(stale);
        log.append(message("fresh"));

        let bodies: Vec<String> = log.recent().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["fresh"]);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_clear_empties_log() {
        let mut log = RetentionPolicy::default().build();
        log.append(message("a"));

        log.clear();

        assert!(log.is_empty());
    }

    #[test]
    fn test_disabled_policy_keeps_nothing() {
        let mut log = RetentionPolicy::Disabled.build();
        log.append(message("a"));

        assert!(log.recent().is_empty());
    }
}
