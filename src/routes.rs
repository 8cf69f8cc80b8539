//! HTTP routes.
//!
//! `/api/chat/*` routes are public; `/api/live/*` routes require a bearer token.

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::shared::AppState;
use crate::{auth, direct, live, room, websockets};

/// CORS policy allowing a single browser origin
pub fn cors_layer(origin: &str) -> Result<CorsLayer, header::InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(HeaderValue::from_str(origin)?)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true))
}

/// Build the application routes.
pub fn build_routes(state: AppState, cors: CorsLayer) -> Router {
    let chat_routes = Router::new()
        .route("/create-room/:schedule_id", post(room::create_room))
        .route(
            "/room/:schedule_id",
            post(room::publish_message).delete(room::delete_room),
        )
        .route("/room/:schedule_id/:user_id", get(room::subscribe_room))
        .route("/stream/:schedule_id", get(room::stream_room))
        .route("/messages/:room_id", get(room::get_messages))
        .route(
            "/dm/:user_a/:user_b",
            post(direct::send_direct_message).get(direct::get_direct_messages),
        )
        .route(
            "/ws/:schedule_id/:user_id",
            get(websockets::chat_socket_handler),
        );

    let live_routes = Router::new()
        .route("/create-room", post(live::create_live_room))
        .route(
            "/start-screen-share/:room_id/:user_id",
            get(live::start_screen_share),
        )
        .route(
            "/stop-screen-share/:room_id/:user_id",
            get(live::stop_screen_share),
        )
        .route("/view-screen-share/:room_id", get(live::view_screen_share))
        .route("/watch-screen-share/:room_id", get(live::watch_screen_share))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::jwt_auth));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api/chat", chat_routes)
        .nest("/api/live", live_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt; // for `oneshot`

    fn app() -> Router {
        let test_app = AppStateBuilder::new().build();
        build_routes(
            test_app.state,
            cors_layer("http://localhost:3000").unwrap(),
        )
    }

    #[test]
    fn test_invalid_cors_origin_is_rejected() {
        assert!(cors_layer("bad\norigin").is_err());
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_routes_are_public() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat/create-room/42")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_live_routes_require_token() {
        let request = Request::builder()
            .uri("/api/live/view-screen-share/class_42")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/chat/create-room/1")
            .header("Origin", "http://localhost:3000")
            .header("Access-Control-Request-Method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "http://localhost:3000"
        );
    }
}
