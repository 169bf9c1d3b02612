//! HTTP request handlers for the ingestion service.
//!
//! Handlers are async functions that receive Axum extractors and return
//! `Result<impl IntoResponse, AppError>`. Credential checks run in the
//! [`ApiKey`](crate::middleware::auth::ApiKey) extractor before any handler
//! body; transactional work lives in storage.

pub mod export;
pub mod metrics;
pub mod profile;

use std::sync::Arc;

use crate::{config::ServerConfig, storage::Storage};

/// Shared application state threaded through all Axum handlers via [`axum::extract::State`].
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub config: ServerConfig,
}
