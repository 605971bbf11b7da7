//! Test server harness for E2E testing
//!
//! Provides `TestPrerenderServer` for spawning real prerender server instances
//! in tests.

use prerender_metrics::{MetricRegistry, ServerHandle, UPKEEP_INTERVAL};
use prerender_service::config::Config;
use prerender_service::renderer::Renderer;
use prerender_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the prerender server in E2E tests.
///
/// # Example
/// ```rust,no_run
/// use prerender_test_utils::{MockRenderer, TestPrerenderServer};
/// use std::sync::Arc;
///
/// async fn render_flow_e2e() -> Result<(), anyhow::Error> {
///     let renderer = Arc::new(MockRenderer::html("<html></html>"));
///     let server = TestPrerenderServer::spawn(renderer.clone()).await?;
///
///     let response = reqwest::get(format!("{}/https://example.com/", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     assert_eq!(renderer.calls(), 1);
///     Ok(())
/// }
/// ```
pub struct TestPrerenderServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
    _upkeep: JoinHandle<()>,
}

impl TestPrerenderServer {
    /// Spawn a server with default configuration and process metrics off.
    pub async fn spawn(renderer: Arc<dyn Renderer>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(renderer, HashMap::new()).await
    }

    /// Spawn a server with extra configuration variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Initialize the plugin chain with the bound address
    /// - Start the HTTP server and registry upkeep in the background
    pub async fn spawn_with_vars(
        renderer: Arc<dyn Renderer>,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("PROCESS_METRICS".to_string(), "false".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::new(config, renderer)
                .map_err(|e| anyhow::anyhow!("Failed to build app state: {}", e))?,
        );

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        state.chain.init(&ServerHandle::new(addr.to_string()));

        // Build routes using the service's real route builder
        let app = routes::build_routes(Arc::clone(&state));

        // Spawn server in background
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        let upkeep = state.registry.spawn_upkeep(UPKEEP_INTERVAL);

        Ok(Self {
            addr,
            state,
            _handle: handle,
            _upkeep: upkeep,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metric registry behind the server's metrics path.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.state.registry
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Fetch the metrics exposition over HTTP.
    pub async fn scrape(&self) -> Result<String, anyhow::Error> {
        let url = format!("{}{}", self.url(), self.state.config.metrics_path);
        let body = reqwest::get(url).await?.error_for_status()?.text().await?;
        Ok(body)
    }
}

impl Drop for TestPrerenderServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so the port is released when the test ends.
        self._handle.abort();
        self._upkeep.abort();
    }
}
