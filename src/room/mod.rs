// Public API - what other modules can use
pub use handlers::{
    create_room, delete_room, get_messages, publish_message, stream_room, subscribe_room,
};
pub use models::{CloseReason, ConnectionId, Message, RoomEvent, RoomId};
pub use registry::{
    RoomConfig, RoomRegistry, RoomService, DEFAULT_BUS_TIMEOUT, DEFAULT_SUBSCRIBER_BUFFER,
};
pub use retention::{MessageLog, RetentionPolicy, RingBufferLog};
pub use subscription::Subscription;

// Internal modules
mod actor;
mod handlers;
pub mod models;
mod registry;
pub mod retention;
mod subscription;
mod types;
