//! Core library for Net-Insight-Monitor telemetry ingestion.
//!
//! Monitoring agents periodically submit a nested JSON document describing
//! latency, loss, jitter, DNS, HTTP, speedtest, and Wi-Fi health. This crate
//! turns that document into a typed, sanitised [`MetricSample`] without doing
//! any I/O; persistence lives in `netinsight-server`.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Stored records: [`Profile`], [`Agent`], [`AgentIdentity`] |
//! | [`extract`] | Typed path extraction over a JSON tree via [`extract()`] |
//! | [`sample`] | The declarative field table and [`MetricSample`] assembly |
//! | [`validation`] | Body decoding and validation via [`Submission::from_slice`] |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use netinsight::{MetricSample, Submission};
//!
//! let body = br#"{"timestamp":"2024-01-01T00:00:00Z","agent_hostname":"agent-1",
//!                 "ping_summary":{"status":"OK","average_rtt_ms":45.2}}"#;
//! let submission = Submission::from_slice(body)?;
//! let sample = MetricSample::from_submission(&submission);
//! assert_eq!(sample.reading("avg_rtt_ms").and_then(|v| v.as_f64()), Some(45.2));
//! ```

pub mod extract;
pub mod sample;
pub mod types;
pub mod validation;

pub use extract::{escape_html, extract, FieldKind, FieldValue};
pub use sample::{FieldSpec, MetricSample, SAMPLE_FIELDS};
pub use types::{Agent, AgentIdentity, Profile, DEFAULT_AGENT_TYPE, INVALID_SOURCE_IP};
pub use validation::{Submission, SubmissionError};
