//! Assembles the Axum [`Router`] from all handler modules.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{
    config::ServerConfig,
    handlers::{export, metrics, profile, AppState},
    storage::Storage,
};

/// Build the complete application router with shared state.
pub fn build_router(storage: Arc<dyn Storage>, config: ServerConfig) -> Router {
    let state = AppState { storage, config };

    Router::new()
        // Ingestion
        .route("/v1/metrics", post(metrics::submit))
        // Agent configuration
        .route("/v1/profile/config", get(profile::config))
        // Reports
        .route("/v1/profiles/{id}/metrics.csv", get(export::metrics_csv))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
