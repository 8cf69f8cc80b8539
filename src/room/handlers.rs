use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use tracing::{info, instrument};

use super::{
    models::{ConnectionId, Message, RoomEvent, RoomId},
    subscription::Subscription,
    types::{PublishRequest, RoomDeletedResponse, RoomResponse},
};
use crate::shared::{AppError, AppState, UserId};

/// Maps a room subscription onto server-sent events.
///
/// Messages are sent as `message` events carrying the message JSON; the
/// terminal signal is a `closed` event whose data is the close reason.
pub(crate) fn sse_events(
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    subscription.map(|event| match event {
        RoomEvent::Message(message) => Event::default()
            .event("message")
            .id(message.id.to_string())
            .json_data(&message),
        RoomEvent::Closed(reason) => Ok(Event::default().event("closed").data(reason.as_str())),
    })
}

/// HTTP handler for creating a class chat room
///
/// POST /api/chat/create-room/:scheduleId
#[instrument(name = "create_room", skip(state))]
pub async fn create_room(
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
) -> Result<Json<RoomResponse>, AppError> {
    let room_id = RoomId::for_schedule(schedule_id);
    let created = state.rooms.create_room(&room_id).await?;

    info!(room_id = %room_id, created, "Create room request handled");

    Ok(Json(RoomResponse { room_id, created }))
}

/// HTTP handler streaming a room to a known user as server-sent events
///
/// GET /api/chat/room/:scheduleId/:userId
#[instrument(name = "subscribe_room", skip(state))]
pub async fn subscribe_room(
    State(state): State<AppState>,
    Path((schedule_id, user_id)): Path<(i64, UserId)>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let room_id = RoomId::for_schedule(schedule_id);
    let subscription = state
        .rooms
        .subscribe(&room_id, ConnectionId::for_user(user_id))
        .await?;

    info!(
        room_id = %room_id,
        user_id = user_id,
        connection_id = %subscription.connection_id(),
        "User subscribed to room"
    );

    Ok(Sse::new(sse_events(subscription)).keep_alive(KeepAlive::default()))
}

/// HTTP handler streaming a room without a user identity
///
/// GET /api/chat/stream/:scheduleId
#[instrument(name = "stream_room", skip(state))]
pub async fn stream_room(
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let room_id = RoomId::for_schedule(schedule_id);
    let subscription = state
        .rooms
        .subscribe(&room_id, ConnectionId::anonymous())
        .await?;

    Ok(Sse::new(sse_events(subscription)).keep_alive(KeepAlive::default()))
}

/// HTTP handler for publishing to a room
///
/// POST /api/chat/room/:scheduleId
#[instrument(name = "publish_message", skip(state, request))]
pub async fn publish_message(
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<Message>, AppError> {
    if request.body.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Message body must not be empty".to_string(),
        ));
    }

    let room_id = RoomId::for_schedule(schedule_id);
    let message = state
        .rooms
        .publish(&room_id, request.sender_id, request.body)
        .await?;

    Ok(Json(message))
}

/// HTTP handler for deleting a room
///
/// DELETE /api/chat/room/:scheduleId
#[instrument(name = "delete_room", skip(state))]
pub async fn delete_room(
    State(state): State<AppState>,
    Path(schedule_id): Path<i64>,
) -> Result<Json<RoomDeletedResponse>, AppError> {
    let room_id = RoomId::for_schedule(schedule_id);
    state.rooms.delete_room(&room_id).await?;

    info!(room_id = %room_id, "Room deleted by request");

    Ok(Json(RoomDeletedResponse { room_id }))
}

/// HTTP handler returning a room's retained messages, oldest first
///
/// GET /api/chat/messages/:roomId
#[instrument(name = "get_messages", skip(state))]
pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    let messages = state.rooms.history(&RoomId::new(room_id)).await?;
    Ok(Json(messages))
}
