// Library crate for the classroom real-time server
// This file exposes the public API for the binary and integration tests

pub mod auth;
pub mod bus;
pub mod config;
pub mod direct;
pub mod live;
pub mod room;
pub mod routes;
pub mod schedule;
pub mod shared;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use bus::{InMemoryMessageBus, MessageBus, RedisMessageBus};
pub use live::{LiveSessionRegistry, LiveSessionService};
pub use room::{CloseReason, Message, RoomConfig, RoomEvent, RoomId, RoomRegistry, RoomService};
pub use schedule::{ClassSchedule, ReconcilerConfig, ScheduleReconciler};
pub use shared::{AppError, AppState, UserId};
