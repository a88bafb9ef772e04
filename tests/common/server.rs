//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own data directory and cache.

use super::constants::*;
use super::fixtures::create_test_data;
use noise_catalog_server::host::{DeclaredHost, HostResolver};
use noise_catalog_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use noise_catalog_server::waveform::{
    AnalysisParams, SymphoniaDecoder, WaveformPipeline, WaveformService,
};
use noise_catalog_server::waveform_cache::WaveformCache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated data directory
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Directory served under /data/
    pub data_dir: PathBuf,

    /// Waveform cache shared with the running app
    pub cache: Arc<WaveformCache>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if fixture creation, port binding or startup fails.
    pub async fn spawn() -> Self {
        let (temp_dir, data_dir, assets_dir) =
            create_test_data().expect("Failed to create test data");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            data_dir: data_dir.clone(),
            assets_dir,
            ..ServerConfig::default()
        };

        let params = AnalysisParams {
            points: TEST_WAVEFORM_POINTS,
            ..AnalysisParams::default()
        };
        let cache = WaveformCache::open(data_dir.join("waveform_cache.json"), params.points);
        let pipeline = WaveformPipeline::standard(params, Arc::new(SymphoniaDecoder));
        let waveforms = Arc::new(WaveformService::new(pipeline, cache.clone()));
        // Only the caller's host, so tests never depend on the machine's network
        let host_resolver = HostResolver::with_providers(vec![Box::new(DeclaredHost)], port);

        let app = make_app(config, waveforms, host_resolver);

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            data_dir,
            cache,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Host the server writes into documents for requests from this process
    pub fn host(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
