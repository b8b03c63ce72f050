//! HTTP routes for the meeting service.
//!
//! Defines the Axum router and application state.

use crate::actors::RoomControllerHandle;
use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::observability::HealthState;
use crate::registry::MeetingRegistry;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Meeting registry (PostgreSQL or in-memory).
    pub registry: Arc<dyn MeetingRegistry>,

    /// Live room supervisor.
    pub rooms: RoomControllerHandle,

    /// Service configuration.
    pub config: Config,

    /// Liveness/readiness flags.
    pub health: Arc<HealthState>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe
/// - `/ready` - Readiness probe (checks the registry)
/// - `/metrics` - Prometheus metrics endpoint
/// - `/api/v1/meetings` - Create meeting
/// - `/api/v1/meetings/:id` - Meeting info
/// - `/api/v1/meetings/:id/{join,leave,end,cancel}` - Lifecycle actions
/// - `/api/v1/meetings/:id/chat` - Persisted chat history
/// - `/api/v1/live` - WebSocket upgrade for live rooms
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/v1/meetings", post(handlers::create_meeting))
        .route("/api/v1/meetings/:id", get(handlers::get_meeting))
        .route("/api/v1/meetings/:id/join", post(handlers::join_meeting))
        .route("/api/v1/meetings/:id/leave", post(handlers::leave_meeting))
        .route("/api/v1/meetings/:id/end", post(handlers::end_meeting))
        .route("/api/v1/meetings/:id/cancel", post(handlers::cancel_meeting))
        .route("/api/v1/meetings/:id/chat", get(handlers::chat_history))
        .route("/api/v1/live", get(handlers::live_connection))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
