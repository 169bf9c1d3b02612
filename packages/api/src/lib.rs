//! Request and response types for the Net-Insight-Monitor ingestion API.
//!
//! Agents and operator tooling share these types with the server so that
//! both ends agree on the JSON shapes.
//!
//! # Endpoints covered
//!
//! | Method | Path | Type |
//! |--------|------|------|
//! | POST | `/v1/metrics` | submission object → [`StatusResponse`] |
//! | GET | `/v1/profile/config` | [`ConfigQuery`] → [`ProfileConfig`] |
//! | GET | `/v1/profiles/{id}/metrics.csv` | → `text/csv` |
//!
//! Every error on every endpoint is a [`StatusResponse`] with
//! `status: "error"`.

pub mod config;
pub mod status;

pub use config::{ConfigQuery, ProfileConfig};
pub use status::{messages, ResponseStatus, StatusResponse};

/// Header carrying the agent's API key on every request.
pub const API_KEY_HEADER: &str = "x-api-key";
