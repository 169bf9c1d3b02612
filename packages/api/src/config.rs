//! Threshold configuration served to agents: `GET /v1/profile/config`.

use serde::{Deserialize, Serialize};

use crate::status::ResponseStatus;

/// Query parameters for `GET /v1/profile/config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigQuery {
    /// Resolve the Profile by hostname instead of by the presented key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Classification thresholds an agent applies locally before reporting.
///
/// Each metric has a `degraded` and a `poor` bound. For latency-like metrics
/// (`rtt`, `loss`, `jitter`, `dns_time`, `http_time`) higher is worse; for
/// speedtest throughput lower is worse, so `poor < degraded`.
///
/// # Example
///
/// ```json
/// {
///   "status": "success",
///   "agent_name": "branch-office-1",
///   "rtt_degraded": 100.0,
///   "rtt_poor": 250.0,
///   "speedtest_dl_degraded": 60.0,
///   "speedtest_dl_poor": 30.0
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileConfig {
    pub status: ResponseStatus,
    pub agent_name: String,

    pub rtt_degraded: f64,
    pub rtt_poor: f64,

    pub loss_degraded: f64,
    pub loss_poor: f64,

    pub ping_jitter_degraded: f64,
    pub ping_jitter_poor: f64,

    pub dns_time_degraded: u32,
    pub dns_time_poor: u32,

    pub http_time_degraded: f64,
    pub http_time_poor: f64,

    pub speedtest_dl_degraded: f64,
    pub speedtest_dl_poor: f64,

    pub speedtest_ul_degraded: f64,
    pub speedtest_ul_poor: f64,
}

impl ProfileConfig {
    /// The standard thresholds, shared by every Profile.
    pub fn standard(agent_name: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            agent_name: agent_name.into(),
            rtt_degraded: 100.0,
            rtt_poor: 250.0,
            loss_degraded: 2.0,
            loss_poor: 10.0,
            ping_jitter_degraded: 30.0,
            ping_jitter_poor: 50.0,
            dns_time_degraded: 300,
            dns_time_poor: 800,
            http_time_degraded: 1.0,
            http_time_poor: 2.5,
            speedtest_dl_degraded: 60.0,
            speedtest_dl_poor: 30.0,
            speedtest_ul_degraded: 20.0,
            speedtest_ul_poor: 5.0,
        }
    }
}
