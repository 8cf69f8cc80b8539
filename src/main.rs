use classroom_realtime::{
    auth::{JwtIdentityProvider, TokenConfig},
    bus::{InMemoryMessageBus, MessageBus, RedisMessageBus},
    config::AppConfig,
    direct::DirectMessageStore,
    live::LiveSessionRegistry,
    room::RoomRegistry,
    routes,
    schedule::{InMemoryScheduleSource, PostgresScheduleSource, ScheduleReconciler, ScheduleSource},
    shared::AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classroom_realtime=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting classroom real-time server");

    let config = AppConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(config = ?config, "Configuration loaded successfully");
    if config.uses_development_secret() {
        warn!("JWT_SECRET is not set, using the development secret");
    }

    // Cross-process bus: Redis when configured, otherwise in-process only
    let bus: Arc<dyn MessageBus> = match &config.redis_url {
        Some(url) => {
            info!("Connecting to Redis message bus...");
            Arc::new(RedisMessageBus::connect(url).await.map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                e
            })?)
        }
        None => {
            warn!("REDIS_URL is not set, rooms will not relay across instances");
            Arc::new(InMemoryMessageBus::new())
        }
    };

    // Schedule feed: Postgres when configured, otherwise an empty in-memory feed
    let schedules: Arc<dyn ScheduleSource> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await
                .map_err(|e| {
                    error!("Failed to connect to database: {}", e);
                    e
                })?;
            info!("Database connection established");
            Arc::new(PostgresScheduleSource::new(pool))
        }
        None => {
            warn!("DATABASE_URL is not set, rooms will only be opened through the API");
            Arc::new(InMemoryScheduleSource::new())
        }
    };

    let live_sessions = Arc::new(LiveSessionRegistry::new());
    let rooms = Arc::new(
        RoomRegistry::new(bus, config.rooms.clone()).with_live_sessions(Arc::clone(&live_sessions)),
    );
    let tokens = TokenConfig::new(config.jwt_secret.clone(), 1);

    let app_state = AppState::new(
        rooms.clone(),
        live_sessions,
        Arc::new(DirectMessageStore::new(config.dm_history_capacity)),
        Arc::new(JwtIdentityProvider::new(tokens)),
    );

    let cancel_token = CancellationToken::new();
    let reconciler = ScheduleReconciler::new(rooms.clone(), schedules, config.reconciler.clone())
        .spawn(cancel_token.clone());

    let cors = routes::cors_layer(&config.cors_allowed_origin).map_err(|e| {
        error!("Invalid CORS_ALLOWED_ORIGIN: {}", e);
        e
    })?;
    let app = routes::build_routes(app_state, cors);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Server listening on {}", addr);

    // Open room streams keep connections alive, so rooms are closed as soon as
    // the signal arrives to let the server drain.
    let shutdown_rooms = rooms.clone();
    let shutdown_token = cancel_token.clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_token.cancel();
            shutdown_rooms.shutdown().await;
        })
        .await?;

    cancel_token.cancel();
    if let Err(e) = reconciler.await {
        error!("Schedule reconciler task failed: {}", e);
    }

    info!("Server shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
