//! Test server harness for E2E testing
//!
//! Provides `TestSignalingServer` for spawning real Signaling Service
//! instances in tests.

use signaling_service::actors::{ActorMetrics, RoomCoordinatorActorHandle};
use signaling_service::config::Config;
use signaling_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the Signaling Service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_join_flow() -> Result<(), anyhow::Error> {
///     let server = TestSignalingServer::spawn().await?;
///     let mut alice = TestClient::connect(&server.ws_url()).await?;
///
///     alice.join("abc").await?;
///     let event = alice.recv_event().await?;
///     Ok(())
/// }
/// ```
pub struct TestSignalingServer {
    addr: SocketAddr,
    config: Config,
    coordinator: RoomCoordinatorActorHandle,
    metrics: Arc<ActorMetrics>,
    _handle: JoinHandle<()>,
}

impl TestSignalingServer {
    /// Spawn a server with default configuration.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(HashMap::new()).await
    }

    /// Spawn a server with configuration overrides (`SIGNALING_*` variables).
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start its own `RoomCoordinatorActor`
    /// - Serve the real router in the background
    pub async fn spawn_with_vars(mut vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        vars.entry("SIGNALING_BIND_ADDRESS".to_string())
            .or_insert_with(|| "127.0.0.1:0".to_string());
        vars.entry("SIGNALING_INSTANCE_ID".to_string())
            .or_insert_with(|| "sig-test".to_string());

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let metrics = ActorMetrics::new();
        let coordinator = RoomCoordinatorActorHandle::new(
            config.instance_id.clone(),
            config.coordinator_mailbox,
            config.max_transcript_records,
            Arc::clone(&metrics),
        );

        let state = Arc::new(AppState {
            coordinator: coordinator.clone(),
            config: config.clone(),
            metrics: Arc::clone(&metrics),
        });

        // Build routes using the service's real route builder
        let app = routes::build_routes(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            coordinator,
            metrics,
            _handle: handle,
        })
    }

    /// Get the WebSocket URL of the signaling endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Get the base HTTP URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the coordinator handle (for inspecting room state).
    pub fn coordinator(&self) -> &RoomCoordinatorActorHandle {
        &self.coordinator
    }

    /// Get the shared actor metrics.
    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.metrics
    }
}

impl Drop for TestSignalingServer {
    fn drop(&mut self) {
        // Stop the coordinator (and every connection actor) and the server task.
        self.coordinator.cancel();
        self._handle.abort();
    }
}
