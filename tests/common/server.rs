//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own library and database.

use super::constants::*;
use super::fixtures::{KeyValueInspector, ScriptedBackend};
use music_library_server::download_manager::{DownloadManager, JobScheduler};
use music_library_server::ingestion::{FileHandler, IngestionPipeline};
use music_library_server::library::{SqliteLibraryStore, StorageAccountant};
use music_library_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub struct TestServerOptions {
    pub max_concurrent: usize,
    pub quota_mb: f64,
    pub backend: ScriptedBackend,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            quota_mb: DEFAULT_TEST_QUOTA_MB,
            backend: ScriptedBackend::new(),
        }
    }
}

/// Test server instance with an isolated library
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Library store for direct database access in tests
    pub store: Arc<SqliteLibraryStore>,

    /// Root of the library directory (music/ and covers/ live below it)
    pub library_dir: std::path::PathBuf,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created, the port cannot be bound
    /// or the server doesn't become ready within timeout.
    pub async fn spawn(options: TestServerOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let library_dir = temp_dir.path().join("library");

        let store = Arc::new(
            SqliteLibraryStore::new(temp_dir.path().join("library.db"))
                .expect("Failed to open library store"),
        );
        let files = FileHandler::new(&library_dir, temp_dir.path().join("tmp"));
        files.init().await.expect("Failed to prepare library dirs");

        let pipeline = IngestionPipeline::new(
            store.clone(),
            StorageAccountant::new(store.clone(), options.quota_mb),
            files,
            Arc::new(KeyValueInspector),
        );
        let manager = Arc::new(DownloadManager::new(
            Arc::new(JobScheduler::new(options.max_concurrent)),
            Arc::new(options.backend),
            pipeline.clone(),
        ));

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
            ..Default::default()
        };
        let app = make_app(config, manager, pipeline).expect("Failed to build app");

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
            store,
            library_dir,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
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
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
