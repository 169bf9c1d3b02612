//! `netinsight-server` — metrics ingestion service for Net-Insight-Monitor.
//!
//! # Quick start
//!
//! ```sh
//! # In-memory server on the default port:
//! netinsight-server
//!
//! # Persistent SQLite server:
//! NETINSIGHT_DB=./net_insight_monitor.sqlite netinsight-server
//!
//! # Custom bind address, each hostname only writable with its own key:
//! NETINSIGHT_BIND=127.0.0.1:9000 NETINSIGHT_STRICT_KEY_BINDING=1 netinsight-server
//! ```
//!
//! # Environment variables
//!
//! See [`ServerConfig::from_env`] for the full list.

use std::sync::Arc;

use netinsight_server::{build_router, MemoryStorage, ServerConfig, SqliteStorage, Storage};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "netinsight_server=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env();

    let storage: Arc<dyn Storage> = match &config.db_path {
        Some(path) => {
            tracing::info!("storage: SQLite at {path}");
            Arc::new(
                SqliteStorage::open(path, config.busy_timeout())
                    .unwrap_or_else(|e| panic!("failed to open SQLite database at {path}: {e}")),
            )
        }
        None => {
            tracing::info!("storage: in-memory (data will not survive restart)");
            Arc::new(MemoryStorage::new())
        }
    };

    if config.strict_key_binding {
        tracing::info!("auth: strict key binding enabled");
    }

    let app = build_router(storage, config.clone());

    tracing::info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_addr));

    axum::serve(listener, app)
        .await
        .expect("server error");
}
