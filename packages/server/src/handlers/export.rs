//! `GET /v1/profiles/{id}/metrics.csv`: a Profile's sample history as CSV.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    export::{export_filename, render_csv},
    middleware::auth::ApiKey,
};

use super::AppState;

/// `GET /v1/profiles/{id}/metrics.csv`
///
/// Any known key may read any Profile. Returns 404 for an unknown id.
pub async fn metrics_csv(
    State(state): State<AppState>,
    _auth: ApiKey,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .storage
        .get_profile(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {id} not found.")))?;

    let table = state.storage.export_samples(id).await?;
    tracing::info!(profile_id = id, rows = table.rows.len(), "export: csv");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_filename(&profile.agent_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        render_csv(&table),
    ))
}
