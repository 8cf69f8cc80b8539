use async_trait::async_trait;
use futures::{stream, Stream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};

use super::models::{PresenterChanged, ScreenShareState};
use crate::room::RoomId;
use crate::shared::{AppError, UserId};

/// Screen-share coordination for live classes
#[async_trait]
pub trait LiveSessionService: Send + Sync {
    /// Makes `user_id` the presenter. Conflict if someone else is presenting.
    async fn start_screen_share(
        &self,
        room_id: &RoomId,
        user_id: UserId,
    ) -> Result<ScreenShareState, AppError>;

    /// Clears the presenter. Conflict unless `user_id` is presenting.
    async fn stop_screen_share(
        &self,
        room_id: &RoomId,
        user_id: UserId,
    ) -> Result<ScreenShareState, AppError>;

    async fn view_screen_share(&self, room_id: &RoomId) -> Result<ScreenShareState, AppError>;

    /// Joins `user_id` to the viewer set and returns a feed of presenter changes,
    /// seeded with the current presenter. Dropping the feed leaves the viewer set.
    async fn watch_presenter(
        &self,
        room_id: &RoomId,
        user_id: UserId,
    ) -> Result<PresenterFeed, AppError>;
}

struct LiveSession {
    presenter: Option<UserId>,
    /// Open feeds per viewer
    viewers: HashMap<UserId, usize>,
    updates: Option<watch::Sender<Option<UserId>>>,
    retired: bool,
}

impl LiveSession {
    fn new() -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            presenter: None,
            viewers: HashMap::new(),
            updates: Some(updates),
            retired: false,
        }
    }

    fn snapshot(&self, room_id: &RoomId) -> ScreenShareState {
        ScreenShareState {
            room_id: room_id.clone(),
            presenter_id: self.presenter,
            viewer_count: self.viewers.len(),
        }
    }

    fn set_presenter(&mut self, presenter: Option<UserId>) {
        self.presenter = presenter;
        if let Some(updates) = &self.updates {
            updates.send_replace(presenter);
        }
    }
}

type SharedSession = Arc<Mutex<LiveSession>>;

fn lock(session: &SharedSession) -> MutexGuard<'_, LiveSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn retired_error(room_id: &RoomId) -> AppError {
    AppError::NotFound(format!("Live session for room {} has ended", room_id))
}

/// Per-room presenter state machine.
///
/// Sessions are opened when their room is created and retired when the room
/// is deleted; calls for any other room are NotFound. Each session is guarded by its own
/// mutex, so transitions on one room never wait on another.
pub struct LiveSessionRegistry {
    sessions: RwLock<HashMap<RoomId, SharedSession>>,
}

impl LiveSessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens an idle session for a room that has just been created.
    /// No-op if the room already has one.
    pub async fn open(&self, room_id: &RoomId) {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(room_id) {
            sessions.insert(room_id.clone(), Arc::new(Mutex::new(LiveSession::new())));
            debug!(room_id = %room_id, "Live session opened");
        }
    }

    /// Sessions exist only between `open` and `retire`
    async fn session(&self, room_id: &RoomId) -> Result<SharedSession, AppError> {
        self.sessions
            .read()
            .await
            .get(room_id)
            .map(Arc::clone)
            .ok_or_else(|| {
                AppError::NotFound(format!("No live session for room {}", room_id))
            })
    }

    /// Clears presenter and viewers and ends every open feed for the room
    #[instrument(skip(self))]
    pub async fn retire(&self, room_id: &RoomId) {
        let Some(session) = self.sessions.write().await.remove(room_id) else {
            return;
        };

        let mut session = lock(&session);
        session.set_presenter(None);
        session.viewers.clear();
        session.updates = None;
        session.retired = true;

        info!(room_id = %room_id, "Live session retired");
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for LiveSessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveSessionService for LiveSessionRegistry {
    #[instrument(skip(self))]
    async fn start_screen_share(
        &self,
        room_id: &RoomId,
        user_id: UserId,
    ) -> Result<ScreenShareState, AppError> {
        let session = self.session(room_id).await?;
        let mut session = lock(&session);
        if session.retired {
            return Err(retired_error(room_id));
        }

        match session.presenter {
            Some(presenter) if presenter == user_id => {
                debug!(room_id = %room_id, user_id = user_id, "Already presenting");
            }
            Some(presenter) => {
                warn!(
                    room_id = %room_id,
                    user_id = user_id,
                    presenter_id = presenter,
                    "Screen share rejected, another user is presenting"
                );
                return Err(AppError::Conflict(format!(
                    "User {} is already presenting in room {}",
                    presenter, room_id
                )));
            }
            None => {
                session.set_presenter(Some(user_id));
                info!(room_id = %room_id, user_id = user_id, "Screen share started");
            }
        }

        Ok(session.snapshot(room_id))
    }

    #[instrument(skip(self))]
    async fn stop_screen_share(
        &self,
        room_id: &RoomId,
        user_id: UserId,
    ) -> Result<ScreenShareState, AppError> {
        let session = self.session(room_id).await?;
        let mut session = lock(&session);
        if session.retired {
            return Err(retired_error(room_id));
        }

        if session.presenter != Some(user_id) {
            warn!(
                room_id = %room_id,
                user_id = user_id,
                presenter_id = ?session.presenter,
                "Stop rejected, user is not presenting"
            );
            return Err(AppError::Conflict(format!(
                "User {} is not presenting in room {}",
                user_id, room_id
            )));
        }

        session.set_presenter(None);
        info!(room_id = %room_id, user_id = user_id, "Screen share stopped");

        Ok(session.snapshot(room_id))
    }

    async fn view_screen_share(&self, room_id: &RoomId) -> Result<ScreenShareState, AppError> {
        let session = self.session(room_id).await?;
        let session = lock(&session);
        if session.retired {
            return Err(retired_error(room_id));
        }
        Ok(session.snapshot(room_id))
    }

    #[instrument(skip(self))]
    async fn watch_presenter(
        &self,
        room_id: &RoomId,
        user_id: UserId,
    ) -> Result<PresenterFeed, AppError> {
        let shared = self.session(room_id).await?;
        let updates = {
            let mut session = lock(&shared);
            let updates = match (&session.updates, session.retired) {
                (Some(updates), false) => updates.subscribe(),
                _ => return Err(retired_error(room_id)),
            };
            *session.viewers.entry(user_id).or_insert(0) += 1;
            debug!(
                room_id = %room_id,
                user_id = user_id,
                viewers = session.viewers.len(),
                "Viewer joined"
            );
            updates
        };

        Ok(PresenterFeed {
            room_id: room_id.clone(),
            updates,
            seeded: false,
            _viewer: ViewerGuard {
                room_id: room_id.clone(),
                user_id,
                session: shared,
            },
        })
    }
}

/// Removes a viewer from its session when the feed is dropped
struct ViewerGuard {
    room_id: RoomId,
    user_id: UserId,
    session: SharedSession,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        let mut session = lock(&self.session);
        if let Some(open) = session.viewers.get_mut(&self.user_id) {
            *open -= 1;
            if *open == 0 {
                session.viewers.remove(&self.user_id);
            }
            debug!(room_id = %self.room_id, user_id = self.user_id, "Viewer left");
        }
    }
}

/// Presenter changes for one viewer. Ends when the room's session is retired.
pub struct PresenterFeed {
    room_id: RoomId,
    updates: watch::Receiver<Option<UserId>>,
    seeded: bool,
    _viewer: ViewerGuard,
}

impl PresenterFeed {
    /// The current presenter first, then one item per change
    pub async fn next_update(&mut self) -> Option<PresenterChanged> {
        if self.seeded {
            self.updates.changed().await.ok()?;
        }
        self.seeded = true;

        let presenter_id = *self.updates.borrow_and_update();
        Some(PresenterChanged {
            room_id: self.room_id.clone(),
            presenter_id,
        })
    }

    pub fn into_stream(self) -> impl Stream<Item = PresenterChanged> {
        stream::unfold(self, |mut feed| async move {
            let update = feed.next_update().await?;
            Some((update, feed))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn room() -> RoomId {
        RoomId::for_schedule(1)
    }

    async fn opened() -> LiveSessionRegistry {
        let registry = LiveSessionRegistry::new();
        registry.open(&room()).await;
        registry
    }

    #[tokio::test]
    async fn test_session_starts_idle() {
        let registry = opened().await;

        let state = registry.view_screen_share(&room()).await.unwrap();

        assert_eq!(state.presenter_id, None);
        assert_eq!(state.viewer_count, 0);
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let registry = opened().await;

        let started = registry.start_screen_share(&room(), 1).await.unwrap();
        assert_eq!(started.presenter_id, Some(1));

        let stopped = registry.stop_screen_share(&room(), 1).await.unwrap();
        assert_eq!(stopped.presenter_id, None);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_for_presenter() {
        let registry = opened().await;

        registry.start_screen_share(&room(), 1).await.unwrap();
        let again = registry.start_screen_share(&room(), 1).await.unwrap();

        assert_eq!(again.presenter_id, Some(1));
    }

    #[tokio::test]
    async fn test_start_conflicts_with_other_presenter() {
        let registry = opened().await;
        registry.start_screen_share(&room(), 1).await.unwrap();

        let result = registry.start_screen_share(&room(), 2).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        let state = registry.view_screen_share(&room()).await.unwrap();
        assert_eq!(state.presenter_id, Some(1));
    }

    #[tokio::test]
    async fn test_stop_by_non_presenter_conflicts() {
        let registry = opened().await;

        let idle = registry.stop_screen_share(&room(), 1).await;
        assert!(matches!(idle, Err(AppError::Conflict(_))));

        registry.start_screen_share(&room(), 1).await.unwrap();
        let other = registry.stop_screen_share(&room(), 2).await;
        assert!(matches!(other, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_sessions_are_independent_per_room() {
        let registry = opened().await;
        registry.open(&RoomId::for_schedule(2)).await;

        registry
            .start_screen_share(&RoomId::for_schedule(1), 1)
            .await
            .unwrap();
        let other = registry
            .start_screen_share(&RoomId::for_schedule(2), 2)
            .await
            .unwrap();

        assert_eq!(other.presenter_id, Some(2));
    }

    #[tokio::test]
    async fn test_feed_is_seeded_then_follows_changes() {
        let registry = opened().await;
        registry.start_screen_share(&room(), 1).await.unwrap();
        let mut feed = registry.watch_presenter(&room(), 5).await.unwrap();

        assert_eq!(feed.next_update().await.unwrap().presenter_id, Some(1));

        registry.stop_screen_share(&room(), 1).await.unwrap();
        let update = timeout(Duration::from_secs(1), feed.next_update())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.presenter_id, None);
    }

    #[tokio::test]
    async fn test_viewer_count_tracks_open_feeds() {
        let registry = opened().await;
        let first = registry.watch_presenter(&room(), 5).await.unwrap();
        let second = registry.watch_presenter(&room(), 5).await.unwrap();
        let other = registry.watch_presenter(&room(), 6).await.unwrap();

        assert_eq!(registry.view_screen_share(&room()).await.unwrap().viewer_count, 2);

        drop(first);
        assert_eq!(registry.view_screen_share(&room()).await.unwrap().viewer_count, 2);

        drop(second);
        drop(other);
        assert_eq!(registry.view_screen_share(&room()).await.unwrap().viewer_count, 0);
    }

    #[tokio::test]
    async fn test_retire_ends_feeds_and_clears_state() {
        let registry = opened().await;
        registry.start_screen_share(&room(), 1).await.unwrap();
        let mut feed = registry.watch_presenter(&room(), 5).await.unwrap();
        feed.next_update().await.unwrap();

        registry.retire(&room()).await;

        // Presenter cleared, then the feed ends
        let cleared = timeout(Duration::from_secs(1), feed.next_update())
            .await
            .unwrap();
        assert_eq!(cleared.map(|u| u.presenter_id), Some(None));
        let ended = timeout(Duration::from_secs(1), feed.next_update())
            .await
            .unwrap();
        assert!(ended.is_none());

        // Nothing is recreated until the room is opened again
        assert!(matches!(
            registry.start_screen_share(&room(), 2).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(registry.session_count().await, 0);

        registry.open(&room()).await;
        let state = registry.view_screen_share(&room()).await.unwrap();
        assert_eq!(state.presenter_id, None);
        assert_eq!(state.viewer_count, 0);
    }

    #[tokio::test]
    async fn test_unopened_room_has_no_session() {
        let registry = LiveSessionRegistry::new();

        assert!(matches!(
            registry.start_screen_share(&room(), 1).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            registry.watch_presenter(&room(), 5).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            registry.view_screen_share(&room()).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_open_keeps_existing_session() {
        let registry = opened().await;
        registry.start_screen_share(&room(), 1).await.unwrap();

        registry.open(&room()).await;

        let state = registry.view_screen_share(&room()).await.unwrap();
        assert_eq!(state.presenter_id, Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_starts_elect_single_presenter() {
        let registry = Arc::new(opened().await);

        let attempts: Vec<_> = (1..=16)
            .map(|user_id| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.start_screen_share(&room(), user_id).await })
            })
            .collect();

        let mut winners = Vec::new();
        let mut conflicts = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(state) => winners.push(state.presenter_id),
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts, 15);
        let state = registry.view_screen_share(&room()).await.unwrap();
        assert_eq!(state.presenter_id, winners[0]);
    }
}
