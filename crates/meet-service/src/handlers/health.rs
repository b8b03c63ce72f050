//! Health check handlers.
//!
//! - `/health`: liveness, true while the process runs
//! - `/ready`: readiness, false during startup and shutdown or when the
//!   registry cannot be reached

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler. Checks no dependencies.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.health.is_live() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT OK")
    }
}

/// Readiness probe handler.
///
/// Error details stay in the server log.
#[tracing::instrument(skip_all, name = "meet.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.health.is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                registry: None,
            }),
        );
    }

    if let Err(e) = state.registry.ping().await {
        tracing::warn!(target: "meet.health", error = %e, "Readiness check failed: registry error");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                registry: Some("unhealthy"),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            registry: Some("healthy"),
        }),
    )
}
