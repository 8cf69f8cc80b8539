use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, instrument};

use super::models::{DirectMessage, SendDirectMessageRequest};
use crate::shared::{AppError, AppState, UserId};

/// POST /api/chat/dm/:senderId/:receiverId
#[instrument(name = "send_direct_message", skip(state, request))]
pub async fn send_direct_message(
    State(state): State<AppState>,
    Path((sender_id, receiver_id)): Path<(UserId, UserId)>,
    Json(request): Json<SendDirectMessageRequest>,
) -> Result<Json<DirectMessage>, AppError> {
    if request.body.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Message body must not be empty".to_string(),
        ));
    }

    let message = state
        .direct_messages
        .send_direct_message(sender_id, receiver_id, request.body)
        .await?;

    info!(
        sender_id = sender_id,
        receiver_id = receiver_id,
        message_id = %message.id,
        "Direct message sent"
    );

    Ok(Json(message))
}

/// GET /api/chat/dm/:userId1/:userId2
#[instrument(name = "get_direct_messages", skip(state))]
pub async fn get_direct_messages(
    State(state): State<AppState>,
    Path((user_a, user_b)): Path<(UserId, UserId)>,
) -> Result<Json<Vec<DirectMessage>>, AppError> {
    let messages = state
        .direct_messages
        .get_direct_messages(user_a, user_b)
        .await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::post,
        Router,
    };
    use tower::ServiceExt; // for `oneshot`

    fn app(state: AppState) -> Router {
        Router::new()
            .route(
                "/dm/:user_a/:user_b",
                post(send_direct_message).get(get_direct_messages),
            )
            .with_state(state)
    }

    fn send(sender: UserId, receiver: UserId, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/dm/{sender}/{receiver}"))
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"body": "{body}"}}"#)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_then_read_from_either_side() {
        let app = app(AppStateBuilder::new().build().state);

        let response = app.clone().oneshot(send(1, 2, "hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(send(2, 1, "back")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .uri("/dm/2/1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let messages: Vec<DirectMessage> = serde_json::from_slice(&body).unwrap();
        let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["hello", "back"]);
    }

    #[tokio::test]
    async fn test_empty_body_is_bad_request() {
        let app = app(AppStateBuilder::new().build().state);

        let response = app.oneshot(send(1, 2, "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_numeric_user_is_rejected() {
        let app = app(AppStateBuilder::new().build().state);

        let request = Request::builder()
            .uri("/dm/abc/1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
