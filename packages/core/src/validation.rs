use std::net::IpAddr;

use serde_json::Value;
use thiserror::Error;

use crate::extract::escape_html;
use crate::types::{AgentIdentity, DEFAULT_AGENT_TYPE, INVALID_SOURCE_IP};

/// Reasons a submitted body is rejected before anything is written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("body is not a JSON object: {0}")]
    InvalidJson(String),

    #[error("timestamp is missing")]
    MissingTimestamp,

    #[error("agent_hostname is missing or empty")]
    MissingHostname,
}

/// A decoded submission whose required fields have been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Opaque caller-supplied timestamp, stored as given.
    pub timestamp: String,
    pub identity: AgentIdentity,
    /// The full decoded body, for field extraction.
    pub body: Value,
}

impl Submission {
    /// Decode and validate a request body.
    ///
    /// `timestamp` must be a non-empty string (a JSON number is accepted and
    /// kept in its JSON form). `agent_hostname` must be non-empty after
    /// trimming. Optional identity fields fall back to defaults: the
    /// identifier to the hostname, the type to [`DEFAULT_AGENT_TYPE`], and a
    /// source IP that is not an IP literal to [`INVALID_SOURCE_IP`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SubmissionError> {
        let body: Value = serde_json::from_slice(bytes)
            .map_err(|e| SubmissionError::InvalidJson(e.to_string()))?;
        let obj = body
            .as_object()
            .ok_or_else(|| SubmissionError::InvalidJson("expected an object".into()))?;

        let timestamp = match obj.get("timestamp") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(SubmissionError::MissingTimestamp),
        };

        let hostname = non_empty_str(obj.get("agent_hostname"))
            .ok_or(SubmissionError::MissingHostname)?;

        let identifier = non_empty_str(obj.get("agent_identifier")).unwrap_or(hostname);
        let agent_type = non_empty_str(obj.get("agent_type")).unwrap_or(DEFAULT_AGENT_TYPE);

        let source_ip = obj
            .get("agent_source_ip")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<IpAddr>().ok())
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| INVALID_SOURCE_IP.to_string());

        let identity = AgentIdentity {
            hostname: escape_html(hostname),
            identifier: escape_html(identifier),
            agent_type: escape_html(agent_type),
            source_ip,
        };

        Ok(Self {
            timestamp,
            identity,
            body,
        })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// --- tests -------------------------------------------------------------------
