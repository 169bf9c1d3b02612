//! Assembly of one [`MetricSample`] from a validated submission.
//!
//! The measurement columns are described once, in [`SAMPLE_FIELDS`], as
//! `(column, path, kind)` rows. Storage builds its column lists from the same
//! table, so adding a measurement means adding one row here and one additive
//! migration step.

use serde::Serialize;

use crate::extract::{extract, FieldKind, FieldValue};
use crate::validation::Submission;

/// Stored when the submission carries no `detailed_health_summary`.
pub const UNKNOWN_HEALTH: &str = "UNKNOWN";

/// The only `current_sla_met_status` value that marks the interval as met.
const SLA_MET: &str = "MET";

/// One measurement column and where it comes from in the submitted body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Column name in `sla_metrics`.
    pub column: &'static str,
    /// Key path into the submitted JSON object.
    pub path: &'static [&'static str],
    pub kind: FieldKind,
}

const fn field(column: &'static str, path: &'static [&'static str], kind: FieldKind) -> FieldSpec {
    FieldSpec { column, path, kind }
}

/// Every measurement column, in storage order.
pub const SAMPLE_FIELDS: &[FieldSpec] = &[
    field("overall_connectivity", &["ping_summary", "status"], FieldKind::Text),
    field("avg_rtt_ms", &["ping_summary", "average_rtt_ms"], FieldKind::Float),
    field("avg_loss_percent", &["ping_summary", "average_packet_loss_percent"], FieldKind::Float),
    field("avg_jitter_ms", &["ping_summary", "average_jitter_ms"], FieldKind::Float),
    field("dns_status", &["dns_resolution", "status"], FieldKind::Text),
    field("dns_resolve_time_ms", &["dns_resolution", "resolve_time_ms"], FieldKind::Int),
    field("http_status", &["http_check", "status"], FieldKind::Text),
    field("http_response_code", &["http_check", "response_code"], FieldKind::Int),
    field("http_total_time_s", &["http_check", "total_time_s"], FieldKind::Float),
    field("speedtest_status", &["speed_test", "status"], FieldKind::Text),
    field("speedtest_download_mbps", &["speed_test", "download_mbps"], FieldKind::Float),
    field("speedtest_upload_mbps", &["speed_test", "upload_mbps"], FieldKind::Float),
    field("speedtest_ping_ms", &["speed_test", "ping_ms"], FieldKind::Float),
    field("speedtest_jitter_ms", &["speed_test", "jitter_ms"], FieldKind::Float),
    field("wifi_signal_percent", &["wifi_summary", "signal_percent"], FieldKind::Int),
    field("wifi_signal_dbm", &["wifi_summary", "signal_dbm"], FieldKind::Int),
    field("wifi_ssid", &["wifi_summary", "ssid"], FieldKind::Text),
    field("wifi_bssid", &["wifi_summary", "bssid"], FieldKind::Text),
    field("wifi_channel", &["wifi_summary", "channel"], FieldKind::Int),
    field("wifi_band", &["wifi_summary", "band"], FieldKind::Text),
    field("wifi_radio_type", &["wifi_summary", "radio_type"], FieldKind::Text),
    field("wifi_authentication", &["wifi_summary", "authentication"], FieldKind::Text),
];

/// One ingestion event, ready to persist.
///
/// `readings` is aligned index-for-index with [`SAMPLE_FIELDS`]; `None`
/// means the agent did not report that measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    /// Caller-supplied and opaque; part of the sample's identity.
    pub timestamp: String,
    pub readings: Vec<Option<FieldValue>>,
    pub detailed_health_summary: String,
    pub sla_met: bool,
}

impl MetricSample {
    /// Extract every measurement in [`SAMPLE_FIELDS`] from the submission body.
    pub fn from_submission(submission: &Submission) -> Self {
        let body = &submission.body;

        let readings = SAMPLE_FIELDS
            .iter()
            .map(|spec| extract(body, spec.path, spec.kind))
            .collect();

        let detailed_health_summary =
            match extract(body, &["detailed_health_summary"], FieldKind::Text) {
                Some(FieldValue::Text(s)) => s,
                _ => UNKNOWN_HEALTH.to_string(),
            };

        let sla_met = matches!(
            extract(body, &["current_sla_met_status"], FieldKind::Text),
            Some(FieldValue::Text(ref s)) if s == SLA_MET
        );

        Self {
            timestamp: submission.timestamp.clone(),
            readings,
            detailed_health_summary,
            sla_met,
        }
    }

    /// Look up a reading by its column name.
    pub fn reading(&self, column: &str) -> Option<&FieldValue> {
        SAMPLE_FIELDS
            .iter()
            .position(|spec| spec.column == column)
            .and_then(|i| self.readings.get(i))
            .and_then(Option::as_ref)
    }

    /// Number of measurements the agent actually reported.
    pub fn reported_count(&self) -> usize {
        self.readings.iter().filter(|r| r.is_some()).count()
    }
}

// --- tests -------------------------------------------------------------------
