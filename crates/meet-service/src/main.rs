//! Meeting Service
//!
//! HTTP API for meeting lifecycle and admission, plus WebSocket live rooms
//! for presence, chat and signaling relay.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (text or JSON per `LOG_FORMAT`)
//! 3. Initialize Prometheus metrics recorder
//! 4. Open the registry (PostgreSQL if `DATABASE_URL` is set, else in-memory)
//! 5. Start the room controller
//! 6. Serve HTTP until SIGINT/SIGTERM, then drain rooms

#![warn(clippy::pedantic)]

use common::secret::ExposeSecret;
use meet_service::actors::RoomControllerHandle;
use meet_service::broadcast::ChannelBroadcaster;
use meet_service::config::{Config, LogFormat};
use meet_service::observability::{init_metrics_recorder, HealthState};
use meet_service::registry::{InMemoryMeetingRegistry, MeetingRegistry, PgMeetingRegistry};
use meet_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config is read first so the log format is known; a config error is
    // still logged once tracing is up
    let config = Config::from_env();
    let log_format = config
        .as_ref()
        .map_or(LogFormat::Text, |config| config.log_format);

    let (text_layer, json_layer) = match log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meet_service=debug,meet=debug,tower_http=debug".into()),
        )
        .with(text_layer)
        .with(json_layer)
        .init();

    info!("Starting Meeting Service");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        service_id = %config.service_id,
        bind_address = %config.bind_address,
        max_participants = config.max_participants,
        persistent = config.database_url.is_some(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let registry: Arc<dyn MeetingRegistry> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(20)
                .min_connections(2)
                .acquire_timeout(Duration::from_secs(5))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
                .connect(database_url.expose_secret())
                .await
                .map_err(|e| {
                    error!("Failed to connect to database: {}", e);
                    e
                })?;

            sqlx::migrate!("../../migrations")
                .run(&pool)
                .await
                .map_err(|e| {
                    error!("Failed to run migrations: {}", e);
                    e
                })?;

            info!("Database connection established");
            Arc::new(PgMeetingRegistry::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, meetings are kept in memory and lost on restart");
            Arc::new(InMemoryMeetingRegistry::new())
        }
    };

    let rooms = RoomControllerHandle::new(
        Arc::clone(&registry),
        Arc::new(ChannelBroadcaster),
        config.room_config(),
    );
    let health = Arc::new(HealthState::new());

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;
    let drain_period = config.drain_period();

    let state = Arc::new(AppState {
        registry,
        rooms: rooms.clone(),
        config,
        health: Arc::clone(&health),
    });
    let app = routes::build_routes(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    health.set_ready();
    info!("Meeting Service listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(rooms, health, drain_period))
    .await?;

    info!("Meeting Service shutdown complete");

    Ok(())
}

/// Waits for SIGTERM/SIGINT, then stops accepting work and drains rooms.
///
/// Rooms flush pending chat before they stop; live connections close as
/// their room does, which lets the server's graceful shutdown complete.
async fn shutdown_signal(rooms: RoomControllerHandle, health: Arc<HealthState>, drain: Duration) {
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
        () = ctrl_c => {}
        () = terminate => {}
    }

    health.set_not_ready();

    warn!("Draining rooms for up to {} seconds...", drain.as_secs());
    if rooms.shutdown(drain).await {
        info!("All rooms stopped");
    } else {
        warn!("Drain period elapsed before every room stopped");
    }
}
