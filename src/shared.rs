use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::IdentityProvider;
use crate::direct::DirectMessageService;
use crate::live::LiveSessionService;
use crate::room::RoomService;

/// Identifier of a platform user, as resolved by the identity collaborator
pub type UserId = u64;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<dyn RoomService>,
    pub live_sessions: Arc<dyn LiveSessionService>,
    pub direct_messages: Arc<dyn DirectMessageService>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        rooms: Arc<dyn RoomService>,
        live_sessions: Arc<dyn LiveSessionService>,
        direct_messages: Arc<dyn DirectMessageService>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            rooms,
            live_sessions,
            direct_messages,
            identity,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::JwtError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
