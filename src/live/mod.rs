// Public API - what other modules can use
pub use handlers::{
    create_live_room, start_screen_share, stop_screen_share, view_screen_share,
    watch_screen_share,
};
pub use models::{PresenterChanged, ScreenShareState};
pub use registry::{LiveSessionRegistry, LiveSessionService, PresenterFeed};

// Internal modules
mod handlers;
mod models;
mod registry;
