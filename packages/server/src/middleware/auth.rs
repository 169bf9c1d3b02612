//! API-key authentication.
//!
//! Every agent request carries its key in the `X-API-KEY` header. The
//! [`ApiKey`] extractor admits a request when that key is held by at least
//! one Profile, and rejects it before any handler work otherwise:
//!
//! - header absent or blank: 401 `API key missing`
//! - key unknown: 403 `Invalid API key`
//!
//! Admission is all the extractor decides. Which Profile a submission lands
//! in is resolved later from the submitted hostname.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use netinsight_api::{messages, StatusResponse, API_KEY_HEADER};
use rand::RngCore;

use crate::{
    handlers::AppState,
    storage::{ProfileRef, Storage, StorageError},
};

/// Bytes of entropy in a generated key; hex-encoded to twice as many chars.
pub const API_KEY_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Auth errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AuthError {
    /// No usable `X-API-KEY` header.
    MissingCredential,
    /// The key is not held by any Profile.
    InvalidCredential,
    /// The credential lookup itself failed.
    Storage(StorageError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingCredential => (StatusCode::UNAUTHORIZED, messages::API_KEY_MISSING),
            AuthError::InvalidCredential => (StatusCode::FORBIDDEN, messages::INVALID_API_KEY),
            AuthError::Storage(e) => {
                tracing::error!("auth: credential lookup failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, messages::INTERNAL_ERROR)
            }
        };
        (status, Json(StatusResponse::error(message))).into_response()
    }
}

// ---------------------------------------------------------------------------
// ApiKey extractor
// ---------------------------------------------------------------------------

/// Axum extractor that requires a known API key.
pub struct ApiKey {
    /// The presented key, trimmed.
    pub key: String,
    /// The first Profile holding `key`.
    pub profile: ProfileRef,
}

impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AuthError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let app_state = AppState::from_ref(state);
        let presented = presented_key(&parts.headers);
        async move { authorize(presented, &app_state.storage).await }
    }
}

/// Read the key from the request headers. Blank counts as absent.
pub fn presented_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

async fn authorize(
    presented: Option<String>,
    storage: &Arc<dyn Storage>,
) -> Result<ApiKey, AuthError> {
    let Some(key) = presented else {
        tracing::warn!("auth: request without {API_KEY_HEADER} header");
        return Err(AuthError::MissingCredential);
    };

    match storage.authenticate(&key).await {
        Ok(Some(profile)) => Ok(ApiKey { key, profile }),
        Ok(None) => {
            tracing::warn!("auth: unknown API key presented");
            Err(AuthError::InvalidCredential)
        }
        Err(e) => Err(AuthError::Storage(e)),
    }
}

/// Generate a fresh random key for operator provisioning.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
