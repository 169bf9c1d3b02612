//! Storage abstraction layer for the ingestion service.
//!
//! The [`Storage`] trait defines the contract between the HTTP handler layer
//! and persistence. Credential checks and response mapping live in the
//! handlers; storage owns atomicity. One call to [`Storage::ingest`] is one
//! write transaction covering the Profile upsert, the Agent upsert, and the
//! sample insert.
//!
//! # Implementations
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`MemoryStorage`] | Tests, ephemeral servers |
//! | [`SqliteStorage`] | Production; durable single-file database |
//!
//! [`MemoryStorage`]: memory::MemoryStorage
//! [`SqliteStorage`]: sqlite::SqliteStorage

pub mod memory;
mod registry;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use netinsight::{Agent, AgentIdentity, MetricSample, Profile, SAMPLE_FIELDS};

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Errors that storage operations can return.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested item does not exist.
    #[error("not found")]
    NotFound,

    /// Key binding is enforced and the presented key does not own the
    /// Profile for this hostname (or no such Profile exists).
    #[error("api key is not bound to hostname {0:?}")]
    Unbound(String),

    /// The write lock could not be acquired within the busy timeout.
    #[error("database busy: {0}")]
    Busy(String),

    /// An unexpected error in the underlying storage backend.
    #[error("internal storage error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// Proof that a presented credential belongs to some Profile.
///
/// It does not bind the caller to that Profile: the write path resolves its
/// Profile from the submitted hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRef {
    pub profile_id: i64,
    pub agent_name: String,
}

/// Everything [`Storage::ingest`] needs to persist one submission.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub identity: AgentIdentity,
    pub sample: MetricSample,
    /// The credential presented with this submission; seeds new Profiles.
    pub api_key: String,
    /// Server receive time, UTC `YYYY-MM-DDTHH:MM:SSZ`.
    pub received_at: String,
    /// Reject hostnames whose Profile holds a different key, and refuse to
    /// create Profiles for unseen hostnames.
    pub enforce_key_binding: bool,
}

/// What [`Storage::ingest`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    pub profile_id: i64,
    pub agent_id: i64,
    pub profile_created: bool,
    pub agent_created: bool,
    /// `false` when the sample was already stored and the insert was ignored.
    pub sample_inserted: bool,
}

/// A single exported value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

/// All samples for one Profile, ordered by timestamp ascending.
///
/// `columns` is always [`sample_columns`]; each row is aligned with it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Column order of `sla_metrics` as exported.
pub fn sample_columns() -> Vec<&'static str> {
    let mut columns = vec!["id", "isp_profile_id", "agent_id", "timestamp"];
    columns.extend(SAMPLE_FIELDS.iter().map(|f| f.column));
    columns.push("detailed_health_summary");
    columns.push("sla_met_interval");
    columns
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// The persistence contract for the ingestion service.
///
/// All methods are `async` and return `Result<_, StorageError>`. Implementations
/// must be `Send + Sync + 'static` so they can be held in an `Arc<dyn Storage>`.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    // --- Credentials ---------------------------------------------------------

    /// Return a [`ProfileRef`] if any Profile holds `api_key`, else `None`.
    async fn authenticate(&self, api_key: &str) -> Result<Option<ProfileRef>, StorageError>;

    // --- Ingestion -----------------------------------------------------------

    /// Atomically resolve (or create) the Profile and Agent for the
    /// submission and insert its sample.
    ///
    /// Re-submitting a sample with the same (profile, agent, timestamp) is
    /// not an error: the receipt reports `sample_inserted: false`. Any error
    /// leaves the store unchanged.
    async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt, StorageError>;

    // --- Profiles ------------------------------------------------------------

    async fn get_profile(&self, id: i64) -> Result<Option<Profile>, StorageError>;

    /// The authoritative Profile for `hostname` (lowest id when a legacy
    /// database holds duplicates).
    async fn find_profile_by_hostname(&self, hostname: &str)
        -> Result<Option<Profile>, StorageError>;

    /// The first Profile holding `api_key`.
    async fn find_profile_by_key(&self, api_key: &str) -> Result<Option<Profile>, StorageError>;

    /// All Profiles, ordered by id.
    async fn list_profiles(&self) -> Result<Vec<Profile>, StorageError>;

    /// Create a Profile for `hostname` holding `api_key`, or replace the key
    /// of the existing one. Used by operator tooling to issue credentials.
    async fn issue_key(&self, hostname: &str, api_key: &str) -> Result<Profile, StorageError>;

    // --- Agents --------------------------------------------------------------

    /// All Agents under a Profile, ordered by hostname.
    async fn list_agents(&self, profile_id: i64) -> Result<Vec<Agent>, StorageError>;

    // --- Samples -------------------------------------------------------------

    /// Every sample stored for `profile_id`, ordered by timestamp ascending.
    async fn export_samples(&self, profile_id: i64) -> Result<SampleTable, StorageError>;
}
