//! The `{status, message}` envelope returned by the ingestion endpoint and by
//! every error path.

use serde::{Deserialize, Serialize};

/// Outcome discriminator; serialises as `"success"` or `"error"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The JSON body for ingestion results and all error responses.
///
/// ```json
/// { "status": "error", "message": "Invalid API key" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: ResponseStatus,

    /// Human-readable description. Never carries internal error detail.
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }
}

/// Fixed client-facing messages.
///
/// | Message | HTTP status |
/// |---------|------------|
/// | [`METRICS_RECEIVED`](messages::METRICS_RECEIVED) | 200 |
/// | [`INVALID_PAYLOAD`](messages::INVALID_PAYLOAD) | 400 |
/// | [`MISSING_HOSTNAME`](messages::MISSING_HOSTNAME) | 400 |
/// | [`API_KEY_MISSING`](messages::API_KEY_MISSING) | 401 |
/// | [`INVALID_API_KEY`](messages::INVALID_API_KEY) | 403 |
/// | [`HOSTNAME_NOT_BOUND`](messages::HOSTNAME_NOT_BOUND) | 403 |
/// | [`PROFILE_NOT_FOUND`](messages::PROFILE_NOT_FOUND) | 404 |
/// | [`INTERNAL_ERROR`](messages::INTERNAL_ERROR) | 500 |
pub mod messages {
    pub const METRICS_RECEIVED: &str = "Metrics received.";
    pub const INVALID_PAYLOAD: &str = "Invalid JSON payload or missing timestamp.";
    pub const MISSING_HOSTNAME: &str = "agent_hostname is required.";
    pub const API_KEY_MISSING: &str = "API key missing";
    pub const INVALID_API_KEY: &str = "Invalid API key";
    pub const HOSTNAME_NOT_BOUND: &str = "API key is not valid for this agent_hostname.";
    pub const PROFILE_NOT_FOUND: &str = "Agent profile not found for the provided API key.";
    pub const INTERNAL_ERROR: &str = "Internal server error.";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let e = StatusResponse::error(messages::INVALID_API_KEY);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "status": "error", "message": "Invalid API key" })
        );

        let back: StatusResponse =
            serde_json::from_str(r#"{"status":"success","message":"Metrics received."}"#).unwrap();
        assert_eq!(back, StatusResponse::success(messages::METRICS_RECEIVED));
    }
}
