//! `POST /v1/metrics`: agent telemetry ingestion.
//!
//! The request passes through four gates in order, and nothing is written
//! unless all of them pass:
//!
//! 1. [`ApiKey`]: 401 when the key is missing, 403 when it is unknown.
//! 2. [`Submission::from_slice`]: 400 for a body that is not a JSON object,
//!    lacks `timestamp`, or lacks `agent_hostname`.
//! 3. [`MetricSample::from_submission`]: field extraction; cannot fail.
//! 4. [`Storage::ingest`](crate::storage::Storage::ingest): one write
//!    transaction. 403 when strict key binding rejects the hostname, 500 for
//!    anything else.
//!
//! A re-delivered sample is acknowledged with 200 like a new one.

use axum::{body::Bytes, extract::State, Json};
use netinsight::{MetricSample, Submission};
use netinsight_api::{messages, StatusResponse};

use crate::{error::AppError, middleware::auth::ApiKey, storage::IngestRequest};

use super::AppState;

/// `POST /v1/metrics`
pub async fn submit(
    State(state): State<AppState>,
    auth: ApiKey,
    body: Bytes,
) -> Result<Json<StatusResponse>, AppError> {
    let submission = Submission::from_slice(&body).map_err(|e| {
        tracing::warn!(
            credential_profile = auth.profile.profile_id,
            "metrics: rejected submission: {e}"
        );
        AppError::from(e)
    })?;

    let sample = MetricSample::from_submission(&submission);
    let hostname = submission.identity.hostname.clone();
    let timestamp = submission.timestamp.clone();

    let request = IngestRequest {
        identity: submission.identity,
        sample,
        api_key: auth.key,
        received_at: now_utc(),
        enforce_key_binding: state.config.strict_key_binding,
    };

    let receipt = state.storage.ingest(request).await.map_err(|e| {
        tracing::error!(hostname = %hostname, timestamp = %timestamp, "metrics: ingest failed: {e}");
        AppError::from(e)
    })?;

    if receipt.sample_inserted {
        tracing::info!(
            profile_id = receipt.profile_id,
            agent_id = receipt.agent_id,
            hostname = %hostname,
            timestamp = %timestamp,
            profile_created = receipt.profile_created,
            agent_created = receipt.agent_created,
            "metrics: sample stored"
        );
    } else {
        tracing::info!(
            profile_id = receipt.profile_id,
            agent_id = receipt.agent_id,
            hostname = %hostname,
            timestamp = %timestamp,
            "metrics: duplicate sample ignored"
        );
    }

    Ok(Json(StatusResponse::success(messages::METRICS_RECEIVED)))
}

/// Server receive time in the stored `YYYY-MM-DDTHH:MM:SSZ` form.
fn now_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
