// Public API - what other modules can use
pub use handlers::{get_direct_messages, send_direct_message};
pub use models::{DirectMessage, PairKey};
pub use store::{DirectMessageService, DirectMessageStore, DEFAULT_DM_HISTORY_CAPACITY};

// Internal modules
mod handlers;
mod models;
mod store;
