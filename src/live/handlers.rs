use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::{Stream, StreamExt};
use tracing::{info, instrument, warn};

use super::models::{CreateLiveRoomRequest, LiveRoomResponse, ScreenShareState};
use crate::auth::AuthenticatedUser;
use crate::room::RoomId;
use crate::shared::{AppError, AppState, UserId};

/// Screen-share calls are only valid for rooms that currently exist
async fn existing_room(state: &AppState, room_id: String) -> Result<RoomId, AppError> {
    let room_id = RoomId::new(room_id);
    if !state.rooms.room_exists(&room_id).await {
        return Err(AppError::NotFound(format!("Room {} not found", room_id)));
    }
    Ok(room_id)
}

fn ensure_caller(caller: UserId, user_id: UserId) -> Result<(), AppError> {
    if caller != user_id {
        warn!(
            caller_id = caller,
            user_id = user_id,
            "Caller attempted to act as another user"
        );
        return Err(AppError::Unauthorized(
            "Cannot act on behalf of another user".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/live/create-room
#[instrument(name = "create_live_room", skip(state))]
pub async fn create_live_room(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Json(request): Json<CreateLiveRoomRequest>,
) -> Result<Json<LiveRoomResponse>, AppError> {
    let room_id = RoomId::for_schedule(request.schedule_id);
    let created = state.rooms.create_room(&room_id).await?;

    info!(room_id = %room_id, caller_id = caller, created, "Live room requested");

    Ok(Json(LiveRoomResponse { room_id, created }))
}

/// GET /api/live/start-screen-share/:roomID/:userID
#[instrument(name = "start_screen_share", skip(state))]
pub async fn start_screen_share(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Path((room_id, user_id)): Path<(String, UserId)>,
) -> Result<Json<ScreenShareState>, AppError> {
    ensure_caller(caller, user_id)?;
    let room_id = existing_room(&state, room_id).await?;

    let screen_share = state
        .live_sessions
        .start_screen_share(&room_id, user_id)
        .await?;

    Ok(Json(screen_share))
}

/// GET /api/live/stop-screen-share/:roomID/:userID
#[instrument(name = "stop_screen_share", skip(state))]
pub async fn stop_screen_share(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Path((room_id, user_id)): Path<(String, UserId)>,
) -> Result<Json<ScreenShareState>, AppError> {
    ensure_caller(caller, user_id)?;
    let room_id = existing_room(&state, room_id).await?;

    let screen_share = state
        .live_sessions
        .stop_screen_share(&room_id, user_id)
        .await?;

    Ok(Json(screen_share))
}

/// GET /api/live/view-screen-share/:roomID
#[instrument(name = "view_screen_share", skip(state))]
pub async fn view_screen_share(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<ScreenShareState>, AppError> {
    let room_id = existing_room(&state, room_id).await?;
    let screen_share = state.live_sessions.view_screen_share(&room_id).await?;
    Ok(Json(screen_share))
}

/// GET /api/live/watch-screen-share/:roomID
///
/// Server-sent `presenter` events, starting with the current presenter.
/// The caller counts as a viewer while the stream is open.
#[instrument(name = "watch_screen_share", skip(state))]
pub async fn watch_screen_share(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let room_id = existing_room(&state, room_id).await?;
    let feed = state.live_sessions.watch_presenter(&room_id, caller).await?;

    let events = feed
        .into_stream()
        .map(|update| Event::default().event("presenter").json_data(&update));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
