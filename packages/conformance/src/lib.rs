//! Shared helpers for the Net-Insight-Monitor conformance test suite.
//!
//! Provides [`spawn_server`], which binds a `TcpListener` on an ephemeral
//! port, wires up an in-process server over the given storage, and returns
//! the local URL. [`spawn_memory_server`] and [`spawn_sqlite_server`] cover
//! the two backends; both hand the storage back so tests can seed keys and
//! inspect rows without going through the HTTP layer.

use std::sync::Arc;
use std::time::Duration;

use netinsight_server::{build_router, MemoryStorage, ServerConfig, SqliteStorage, Storage};
use tempfile::TempDir;

/// Start an in-process server over `storage` and return its base URL, e.g.
/// `http://127.0.0.1:51234`.
///
/// # Panics
///
/// Panics if the TCP listener cannot be bound.
pub async fn spawn_server(storage: Arc<dyn Storage>, mut config: ServerConfig) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");
    config.bind_addr = addr;

    let router = build_router(storage, config);
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("conformance server error");
    });

    format!("http://{addr}")
}

/// In-memory server with default config.
pub async fn spawn_memory_server() -> (String, Arc<dyn Storage>) {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let url = spawn_server(Arc::clone(&storage), ServerConfig::default()).await;
    (url, storage)
}

/// SQLite server on a fresh file in a temporary directory.
///
/// Keep the returned [`TempDir`] alive for the duration of the test.
pub async fn spawn_sqlite_server(config: ServerConfig) -> (String, Arc<dyn Storage>, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let storage = SqliteStorage::open(
        dir.path().join("net_insight_monitor.sqlite"),
        Duration::from_millis(config.busy_timeout_ms),
    )
    .expect("open sqlite store");
    let storage: Arc<dyn Storage> = Arc::new(storage);
    let url = spawn_server(Arc::clone(&storage), config).await;
    (url, storage, dir)
}
