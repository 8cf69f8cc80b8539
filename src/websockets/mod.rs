// Public API
pub use handler::{chat_socket_handler, ChatMessageHandler};
pub use messages::{MessageType, WebSocketMessage};
pub use socket::{Connection, MessageHandler, SocketError, SocketWrapper};

// Internal modules
mod handler;
mod messages;
mod socket;
