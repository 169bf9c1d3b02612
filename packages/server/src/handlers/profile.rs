//! `GET /v1/profile/config`: threshold configuration for an agent.
//!
//! Without `?hostname=` the Profile is the one holding the presented key, and
//! an unknown key is answered 404 rather than 403. With `?hostname=` the key
//! must be known (403 otherwise) and the Profile is looked up by hostname.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use netinsight::escape_html;
use netinsight_api::{messages, ConfigQuery, ProfileConfig};

use crate::{error::AppError, middleware::auth::presented_key};

use super::AppState;

/// `GET /v1/profile/config`
pub async fn config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConfigQuery>,
) -> Result<Json<ProfileConfig>, AppError> {
    let key = presented_key(&headers).ok_or_else(|| {
        tracing::warn!("config: request without API key");
        AppError::Unauthorized(messages::API_KEY_MISSING.into())
    })?;

    let hostname = query
        .hostname
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty());

    let profile = match hostname {
        Some(hostname) => {
            if state.storage.authenticate(&key).await?.is_none() {
                tracing::warn!("config: unknown API key for hostname lookup");
                return Err(AppError::Forbidden(messages::INVALID_API_KEY.into()));
            }
            let profile = state
                .storage
                .find_profile_by_hostname(&escape_html(hostname))
                .await?;
            if let Some(p) = &profile {
                if state.config.strict_key_binding && p.api_key != key {
                    tracing::warn!(profile_id = p.id, "config: key not bound to hostname");
                    return Err(AppError::Forbidden(messages::HOSTNAME_NOT_BOUND.into()));
                }
            }
            profile
        }
        None => state.storage.find_profile_by_key(&key).await?,
    };

    let profile = profile.ok_or_else(|| {
        tracing::warn!("config: no profile for request");
        AppError::NotFound(messages::PROFILE_NOT_FOUND.into())
    })?;

    tracing::info!(
        profile_id = profile.id,
        agent_identifier = %profile.agent_identifier,
        "config: served thresholds"
    );
    Ok(Json(ProfileConfig::standard(profile.agent_name)))
}
