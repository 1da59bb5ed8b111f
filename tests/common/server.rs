//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own staging directory and
//! library database.

use super::constants::*;
use super::fixtures::FixtureExtractor;
use musicbox_server::extractor::ExtractionInvoker;
use musicbox_server::library::{LibraryStore, SqliteLibraryStore};
use musicbox_server::pipeline::ConversionPipeline;
use musicbox_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use musicbox_server::staging::StagingStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated storage
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Staging store for direct inspection in tests
    pub staging: Arc<StagingStore>,

    /// Library store for direct inspection in tests
    pub library: Arc<dyn LibraryStore>,

    extractor_calls: Arc<AtomicUsize>,

    // Keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if storage setup or port binding fails, or the server doesn't
    /// become ready within the timeout.
    pub async fn spawn() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let staging = Arc::new(
            StagingStore::new(
                temp_dir.path().join("downloads"),
                Duration::from_secs(STAGING_TTL_SECS),
            )
            .expect("Failed to create staging store"),
        );
        let library: Arc<dyn LibraryStore> = Arc::new(
            SqliteLibraryStore::open(temp_dir.path().join("library.db"))
                .expect("Failed to open library store"),
        );

        let (extractor, extractor_calls) = FixtureExtractor::new();
        let pipeline = Arc::new(ConversionPipeline::new(
            ExtractionInvoker::new(Arc::new(extractor)),
            staging.clone(),
            library.clone(),
            false,
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            content_cache_age_sec: 0,
            frontend_dir_path: None,
        };
        let app = make_app(config, pipeline);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
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
            staging,
            library,
            extractor_calls,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Number of times the extractor has been invoked
    pub fn extractor_calls(&self) -> usize {
        self.extractor_calls.load(Ordering::SeqCst)
    }

    /// Number of files currently in the staging area, sidecars included
    pub fn staged_file_count(&self) -> usize {
        count_files_below(self.staging.root())
    }

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

fn count_files_below(root: &std::path::Path) -> usize {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
