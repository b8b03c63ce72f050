//! Test server harness for E2E testing
//!
//! Provides `TestMeetServer` for spawning real meeting service instances in
//! tests. Each instance gets its own registry, room controller and port.

use crate::fixtures::{join_body, TestMeeting};
use meet_service::actors::RoomControllerHandle;
use meet_service::broadcast::ChannelBroadcaster;
use meet_service::config::Config;
use meet_service::models::CreateMeetingResponse;
use meet_service::observability::HealthState;
use meet_service::registry::{InMemoryMeetingRegistry, MeetingRegistry};
use meet_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the meeting service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<(), anyhow::Error> {
///     let server = TestMeetServer::spawn().await?;
///
///     let response = server
///         .client()
///         .get(format!("{}/health", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestMeetServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    client: reqwest::Client,
    _handle: JoinHandle<()>,
}

impl TestMeetServer {
    /// Spawn a server backed by a fresh in-memory registry.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(Arc::new(InMemoryMeetingRegistry::new()), HashMap::new()).await
    }

    /// Spawn a server over the given registry.
    pub async fn spawn_with_registry(
        registry: Arc<dyn MeetingRegistry>,
    ) -> Result<Self, anyhow::Error> {
        Self::spawn_with(registry, HashMap::new()).await
    }

    /// Spawn a server over the given registry with extra config variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Use the cheapest bcrypt cost
    /// - Start the HTTP server in the background
    pub async fn spawn_with(
        registry: Arc<dyn MeetingRegistry>,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("BCRYPT_COST".to_string(), "4".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let rooms = RoomControllerHandle::new(
            Arc::clone(&registry),
            Arc::new(ChannelBroadcaster),
            config.room_config(),
        );
        let health = Arc::new(HealthState::new());
        health.set_ready();

        let state = Arc::new(AppState {
            registry,
            rooms,
            config,
            health,
        });

        // Recorder is not installed globally; several servers may run at once
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            client: reqwest::Client::new(),
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL of the live endpoint for `identity`.
    pub fn live_url(&self, identity: &str) -> String {
        format!("ws://{}/api/v1/live?identity={}", self.addr, identity)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Shared application state (registry, rooms, health).
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Create a meeting and return its ids. Fails on a non-201 response.
    pub async fn create_meeting(
        &self,
        meeting: TestMeeting,
    ) -> Result<CreateMeetingResponse, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/api/v1/meetings", self.url()))
            .json(&meeting.to_body())
            .send()
            .await?;
        anyhow::ensure!(
            response.status() == reqwest::StatusCode::CREATED,
            "create_meeting returned {}",
            response.status()
        );
        Ok(response.json().await?)
    }

    /// Send a join request and return the raw response.
    pub async fn join(
        &self,
        meeting_id: &str,
        identity: &str,
        password: Option<&str>,
    ) -> Result<reqwest::Response, anyhow::Error> {
        Ok(self
            .client
            .post(format!("{}/api/v1/meetings/{}/join", self.url(), meeting_id))
            .json(&join_body(identity, identity, password))
            .send()
            .await?)
    }

    /// POST a JSON body to `path` (relative to the base URL).
    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, anyhow::Error> {
        Ok(self
            .client
            .post(format!("{}{}", self.url(), path))
            .json(body)
            .send()
            .await?)
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response, anyhow::Error> {
        Ok(self
            .client
            .get(format!("{}{}", self.url(), path))
            .send()
            .await?)
    }
}

impl Drop for TestMeetServer {
    fn drop(&mut self) {
        // Stop live rooms and the HTTP task when the test completes
        self.state.rooms.cancel();
        self._handle.abort();
    }
}
