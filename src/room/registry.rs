use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::actor::{subscribe_topic, RoomActor, RoomHandle};
use super::models::{CloseReason, ConnectionId, Message, RoomId};
use super::retention::RetentionPolicy;
use super::subscription::Subscription;
use crate::bus::MessageBus;
use crate::live::LiveSessionRegistry;
use crate::shared::{AppError, UserId};

/// Default per-subscriber delivery buffer
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Default limit on a single bus subscribe or publish
pub const DEFAULT_BUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration shared by every room a registry creates
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub retention: RetentionPolicy,
    /// Messages a subscriber may fall behind before it is dropped
    pub subscriber_buffer: usize,
    /// A bus call that takes longer is treated as the bus being unavailable
    pub bus_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::default(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            bus_timeout: DEFAULT_BUS_TIMEOUT,
        }
    }
}

/// Room lifecycle and messaging operations consumed by handlers and the reconciler
#[async_trait]
pub trait RoomService: Send + Sync {
    /// Creates the room if absent. Returns true if this call created it.
    async fn create_room(&self, room_id: &RoomId) -> Result<bool, AppError>;

    /// Closes all subscribers, drops the room and retires its live session
    async fn delete_room(&self, room_id: &RoomId) -> Result<(), AppError>;

    async fn subscribe(
        &self,
        room_id: &RoomId,
        connection_id: ConnectionId,
    ) -> Result<Subscription, AppError>;

    async fn publish(
        &self,
        room_id: &RoomId,
        sender_id: UserId,
        body: String,
    ) -> Result<Message, AppError>;

    /// Messages currently retained for the room, oldest first
    async fn history(&self, room_id: &RoomId) -> Result<Vec<Message>, AppError>;

    async fn room_exists(&self, room_id: &RoomId) -> bool;
}

/// Owns every room served by this process.
///
/// The map lock is only held to look up, insert or remove a handle; all
/// per-room work happens on the room's own actor.
pub struct RoomRegistry {
    instance_id: Uuid,
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
    bus: Arc<dyn MessageBus>,
    live_sessions: Option<Arc<LiveSessionRegistry>>,
    config: RoomConfig,
}

impl RoomRegistry {
    pub fn new(bus: Arc<dyn MessageBus>, config: RoomConfig) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            rooms: RwLock::new(HashMap::new()),
            bus,
            live_sessions: None,
            config,
        }
    }

    /// Open and retire live sessions together with their rooms
    pub fn with_live_sessions(mut self, live_sessions: Arc<LiveSessionRegistry>) -> Self {
        self.live_sessions = Some(live_sessions);
        self
    }

    /// Identifier this process stamps on the messages it relays
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn subscriber_count(&self, room_id: &RoomId) -> Result<usize, AppError> {
        self.handle(room_id).await?.subscriber_count().await
    }

    /// Closes every room with a shutdown signal. Used on process teardown.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = {
            let mut rooms = self.rooms.write().await;
            let drained: Vec<(RoomId, RoomHandle)> = rooms.drain().collect();
            if let Some(live_sessions) = &self.live_sessions {
                for (room_id, _) in &drained {
                    live_sessions.retire(room_id).await;
                }
            }
            drained.into_iter().map(|(_, handle)| handle).collect()
        };

        info!(rooms = handles.len(), "Closing all rooms for shutdown");

        for handle in handles {
            handle.close(CloseReason::Shutdown).await;
        }
    }

    async fn handle(&self, room_id: &RoomId) -> Result<RoomHandle, AppError> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))
    }
}

#[async_trait]
impl RoomService for RoomRegistry {
    #[instrument(skip(self))]
    async fn create_room(&self, room_id: &RoomId) -> Result<bool, AppError> {
        if self.rooms.read().await.contains_key(room_id) {
            debug!(room_id = %room_id, "Room already exists");
            return Ok(false);
        }

        // Subscribe before the room becomes visible so no peer traffic is missed
        // once create returns. Done outside the map lock.
        let inbound = subscribe_topic(self.bus.as_ref(), room_id, self.config.bus_timeout).await;
        if inbound.is_none() {
            warn!(
                room_id = %room_id,
                "Bus unavailable, room delivers locally until it reconnects"
            );
        }

        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(room_id) {
            debug!(room_id = %room_id, "Room created concurrently");
            return Ok(false);
        }

        let (handle, _task) = RoomActor::spawn(
            room_id.clone(),
            self.instance_id,
            self.config.retention.build(),
            Arc::clone(&self.bus),
            self.config.bus_timeout,
            inbound,
            self.config.subscriber_buffer,
        );
        rooms.insert(room_id.clone(), handle);
        // Under the map lock so a concurrent delete cannot retire it first
        if let Some(live_sessions) = &self.live_sessions {
            live_sessions.open(room_id).await;
        }

        info!(room_id = %room_id, "Room created");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn delete_room(&self, room_id: &RoomId) -> Result<(), AppError> {
        let handle = {
            let mut rooms = self.rooms.write().await;
            let handle = rooms.remove(room_id).ok_or_else(|| {
                debug!(room_id = %room_id, "Delete requested for unknown room");
                AppError::NotFound(format!("Room {} not found", room_id))
            })?;
            if let Some(live_sessions) = &self.live_sessions {
                live_sessions.retire(room_id).await;
            }
            handle
        };

        handle.close(CloseReason::RoomDeleted).await;

        info!(room_id = %room_id, "Room deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(
        &self,
        room_id: &RoomId,
        connection_id: ConnectionId,
    ) -> Result<Subscription, AppError> {
        self.handle(room_id).await?.subscribe(connection_id).await
    }

    #[instrument(skip(self, body))]
    async fn publish(
        &self,
        room_id: &RoomId,
        sender_id: UserId,
        body: String,
    ) -> Result<Message, AppError> {
        let message = self.handle(room_id).await?.publish(sender_id, body).await?;

        debug!(
            room_id = %room_id,
            message_id = %message.id,
            sender_id = sender_id,
            "Message published"
        );
        Ok(message)
    }

    #[instrument(skip(self))]
    async fn history(&self, room_id: &RoomId) -> Result<Vec<Message>, AppError> {
        self.handle(room_id).await?.history().await
    }

    async fn room_exists(&self, room_id: &RoomId) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }
}
