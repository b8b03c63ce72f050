//! Health endpoint integration tests.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use meet_test_utils::{SwitchableRegistry, TestMeetServer};
use serde_json::Value;
use std::sync::Arc;

#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<()> {
    let server = TestMeetServer::spawn().await?;

    let response = server.get("/health").await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "OK");

    Ok(())
}

#[tokio::test]
async fn test_ready_reports_registry_health() -> Result<()> {
    let registry = Arc::new(SwitchableRegistry::new());
    let server = TestMeetServer::spawn_with_registry(registry.clone()).await?;

    let response = server.get("/ready").await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["registry"], "healthy");

    registry.set_available(false);
    let response = server.get("/ready").await?;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["registry"], "unhealthy");
    // No error details leak to the caller
    assert!(!body.to_string().contains("connection refused"));

    Ok(())
}

#[tokio::test]
async fn test_ready_fails_while_draining() -> Result<()> {
    let server = TestMeetServer::spawn().await?;

    server.state().health.set_not_ready();
    let response = server.get("/ready").await?;
    assert_eq!(response.status(), 503);

    // Liveness is unaffected
    assert_eq!(server.get("/health").await?.status(), 200);

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_renders() -> Result<()> {
    let server = TestMeetServer::spawn().await?;

    let response = server.get("/metrics").await?;
    assert_eq!(response.status(), 200);

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_not_found() -> Result<()> {
    let server = TestMeetServer::spawn().await?;

    let response = server.get("/nonexistent").await?;
    assert_eq!(response.status(), 404);

    Ok(())
}
