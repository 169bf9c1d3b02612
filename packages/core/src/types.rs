//! Stored records for the ingestion registry.
//!
//! A [`Profile`] is the tenant boundary, looked up by the hostname agents
//! report. Each Profile owns any number of [`Agent`]s, keyed by
//! `(isp_profile_id, agent_hostname)`. Samples reference both but are owned by
//! neither; see [`crate::sample::MetricSample`].

use serde::{Deserialize, Serialize};

/// `agent_type` recorded when a submission does not name one.
pub const DEFAULT_AGENT_TYPE: &str = "Client";

/// Stored in place of `agent_source_ip` when the submitted value is not an
/// IPv4 or IPv6 literal.
pub const INVALID_SOURCE_IP: &str = "invalid";

/// A tenant-level record identified by agent hostname.
///
/// `api_key` is the credential the Profile was seeded with. It is never
/// serialised, so listings and exports cannot leak it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: i64,

    /// Natural lookup key: the hostname the owning agent reports.
    pub agent_name: String,

    /// Display identifier; defaults to the hostname.
    pub agent_identifier: String,

    pub agent_type: String,

    #[serde(skip_serializing, default)]
    pub api_key: String,

    pub is_active: bool,

    /// UTC, `YYYY-MM-DDTHH:MM:SSZ`.
    pub last_heard_from: Option<String>,

    pub last_reported_hostname: Option<String>,

    pub last_reported_source_ip: Option<String>,
}

/// A monitoring process or host under a [`Profile`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    pub id: i64,
    pub isp_profile_id: i64,
    pub agent_hostname: String,
    pub agent_source_ip: String,
    pub agent_type: String,
    pub first_seen: String,
    pub last_seen: String,
}

/// Who a submission claims to come from, after defaults and sanitisation.
///
/// Built by [`crate::Submission::from_slice`]; every text field has already
/// been HTML-escaped and `source_ip` is either a valid IP literal or
/// [`INVALID_SOURCE_IP`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub hostname: String,
    pub identifier: String,
    pub agent_type: String,
    pub source_ip: String,
}
