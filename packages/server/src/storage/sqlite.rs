//! SQLite-backed storage implementation.
//!
//! Uses `rusqlite` (with bundled SQLite). There is no shared connection: each
//! operation opens its own inside `tokio::task::spawn_blocking` and drops it
//! when the closure returns, so the handle is released on every exit path.
//! The database runs in WAL mode, which lets readers (config lookups, CSV
//! export) see the last committed state while an ingestion transaction holds
//! the write lock.
//!
//! # Schema
//!
//! - `isp_profiles`: tenants, looked up by `agent_name`.
//! - `agents`: monitoring hosts, unique on `(isp_profile_id, agent_hostname)`.
//! - `sla_metrics`: samples, unique on `(isp_profile_id, agent_id, timestamp)`.
//!
//! See [`super::schema`] for how the layout evolves.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use netinsight::{Agent, Profile};
use rusqlite::{
    params, types::ValueRef, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior,
};

use super::{
    registry, sample_columns, schema, Cell, IngestReceipt, IngestRequest, ProfileRef,
    SampleTable, Storage, StorageError,
};

// ---------------------------------------------------------------------------
// SqliteStorage
// ---------------------------------------------------------------------------

/// SQLite-backed implementation of [`Storage`].
pub struct SqliteStorage {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// `busy_timeout` bounds how long a transaction waits for the write lock
    /// before failing with [`StorageError::Busy`].
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StorageError> {
        let storage = Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout,
        };
        let mut conn = open_connection(&storage.path, storage.busy_timeout)?;
        let applied = schema::ensure_schema(&mut conn)?;
        if applied > 0 {
            tracing::info!(
                "storage: migrated {} to schema version {}",
                storage.path.display(),
                schema::SCHEMA_VERSION
            );
        }
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on a fresh connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;

        tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&path, busy_timeout)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StorageError::Internal(format!("task join error: {e}")))?
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection, StorageError> {
    let conn = Connection::open(path).map_err(map_err)?;
    conn.busy_timeout(busy_timeout).map_err(map_err)?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        .map_err(map_err)?;
    Ok(conn)
}

// ---------------------------------------------------------------------------
// Error conversions
// ---------------------------------------------------------------------------

pub(crate) fn map_err(e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StorageError::Busy(e.to_string())
        }
        _ => StorageError::Internal(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Dynamic query parameter helper
// ---------------------------------------------------------------------------

/// Typed SQL parameter for statements whose column list is built at runtime.
#[derive(Debug, PartialEq)]
pub(crate) enum SqlParam {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
}

impl rusqlite::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value};
        match self {
            SqlParam::Null => Ok(ToSqlOutput::Owned(Value::Null)),
            SqlParam::Text(s) => Ok(ToSqlOutput::Owned(Value::Text(s.clone()))),
            SqlParam::Integer(i) => Ok(ToSqlOutput::Owned(Value::Integer(*i))),
            SqlParam::Real(f) => Ok(ToSqlOutput::Owned(Value::Real(*f))),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const PROFILE_COLUMNS: &str = "id, agent_name, agent_identifier, agent_type, api_key, is_active,
     last_heard_from, last_reported_hostname, last_reported_source_ip";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    let agent_name: String = row.get(1)?;
    let agent_identifier: Option<String> = row.get(2)?;
    Ok(Profile {
        id: row.get(0)?,
        agent_identifier: agent_identifier.unwrap_or_else(|| agent_name.clone()),
        agent_name,
        agent_type: row.get(3)?,
        api_key: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        is_active: row.get::<_, i64>(5)? != 0,
        last_heard_from: row.get(6)?,
        last_reported_hostname: row.get(7)?,
        last_reported_source_ip: row.get(8)?,
    })
}

fn cell_from_ref(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => Cell::Null,
        ValueRef::Integer(i) => Cell::Integer(i),
        ValueRef::Real(f) => Cell::Real(f),
        ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Cell::Text(hex::encode(b)),
    }
}

fn query_profile(
    conn: &Connection,
    filter: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Option<Profile>, StorageError> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM isp_profiles WHERE {filter} ORDER BY id ASC LIMIT 1");
    conn.query_row(&sql, &[param], profile_from_row)
        .optional()
        .map_err(map_err)
}

// ---------------------------------------------------------------------------
// Storage impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Storage for SqliteStorage {
    // --- Credentials ---------------------------------------------------------

    async fn authenticate(&self, api_key: &str) -> Result<Option<ProfileRef>, StorageError> {
        let api_key = api_key.to_string();

        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, agent_name FROM isp_profiles WHERE api_key = ?1 ORDER BY id ASC LIMIT 1",
                params![api_key],
                |row| {
                    Ok(ProfileRef {
                        profile_id: row.get(0)?,
                        agent_name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(map_err)
        })
        .await
    }

    // --- Ingestion -----------------------------------------------------------

    async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt, StorageError> {
        self.with_conn(move |conn| {
            // Dropping `tx` without commit rolls back, so every `?` below
            // leaves the store untouched.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_err)?;

            schema::migrate(&tx)?;

            let (profile_id, profile_created) = registry::resolve_profile(
                &tx,
                &request.identity,
                &request.api_key,
                &request.received_at,
                request.enforce_key_binding,
            )?;
            let (agent_id, agent_created) =
                registry::resolve_agent(&tx, profile_id, &request.identity, &request.received_at)?;
            let sample_inserted = registry::write_sample(&tx, profile_id, agent_id, &request.sample)?;

            tx.commit().map_err(map_err)?;

            Ok(IngestReceipt {
                profile_id,
                agent_id,
                profile_created,
                agent_created,
                sample_inserted,
            })
        })
        .await
    }

    // --- Profiles ------------------------------------------------------------

    async fn get_profile(&self, id: i64) -> Result<Option<Profile>, StorageError> {
        self.with_conn(move |conn| query_profile(conn, "id = ?1", &id))
            .await
    }

    async fn find_profile_by_hostname(
        &self,
        hostname: &str,
    ) -> Result<Option<Profile>, StorageError> {
        let hostname = hostname.to_string();
        self.with_conn(move |conn| query_profile(conn, "agent_name = ?1", &hostname))
            .await
    }

    async fn find_profile_by_key(&self, api_key: &str) -> Result<Option<Profile>, StorageError> {
        let api_key = api_key.to_string();
        self.with_conn(move |conn| query_profile(conn, "api_key = ?1", &api_key))
            .await
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StorageError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM isp_profiles ORDER BY id ASC");
            let mut stmt = conn.prepare(&sql).map_err(map_err)?;
            let result = stmt
                .query_map([], profile_from_row)
                .map_err(map_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_err)?;
            Ok(result)
        })
        .await
    }

    async fn issue_key(&self, hostname: &str, api_key: &str) -> Result<Profile, StorageError> {
        let hostname = hostname.to_string();
        let api_key = api_key.to_string();

        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_err)?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM isp_profiles WHERE agent_name = ?1 ORDER BY id ASC LIMIT 1",
                    params![hostname],
                    |row| row.get(0),
                )
                .optional()
                .map_err(map_err)?;

            let id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE isp_profiles SET api_key = ?1, is_active = 1 WHERE id = ?2",
                        params![api_key, id],
                    )
                    .map_err(map_err)?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO isp_profiles (agent_name, agent_identifier, api_key, is_active)
                         VALUES (?1, ?1, ?2, 1)",
                        params![hostname, api_key],
                    )
                    .map_err(map_err)?;
                    tx.last_insert_rowid()
                }
            };

            let profile = query_profile(&tx, "id = ?1", &id)?.ok_or(StorageError::NotFound)?;
            tx.commit().map_err(map_err)?;
            Ok(profile)
        })
        .await
    }

    // --- Agents --------------------------------------------------------------

    async fn list_agents(&self, profile_id: i64) -> Result<Vec<Agent>, StorageError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, isp_profile_id, agent_hostname, agent_source_ip, agent_type,
                            first_seen, last_seen
                     FROM agents WHERE isp_profile_id = ?1 ORDER BY agent_hostname ASC",
                )
                .map_err(map_err)?;
            let result = stmt
                .query_map(params![profile_id], |row| {
                    Ok(Agent {
                        id: row.get(0)?,
                        isp_profile_id: row.get(1)?,
                        agent_hostname: row.get(2)?,
                        agent_source_ip: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        agent_type: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        first_seen: row.get(5)?,
                        last_seen: row.get(6)?,
                    })
                })
                .map_err(map_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_err)?;
            Ok(result)
        })
        .await
    }

    // --- Samples -------------------------------------------------------------

    async fn export_samples(&self, profile_id: i64) -> Result<SampleTable, StorageError> {
        self.with_conn(move |conn| {
            let columns = sample_columns();
            let sql = format!(
                "SELECT {} FROM sla_metrics WHERE isp_profile_id = ?1 ORDER BY timestamp ASC, id ASC",
                columns.join(", ")
            );
            let mut stmt = conn.prepare(&sql).map_err(map_err)?;
            let width = columns.len();
            let rows = stmt
                .query_map(params![profile_id], |row| {
                    (0..width)
                        .map(|i| row.get_ref(i).map(cell_from_ref))
                        .collect::<rusqlite::Result<Vec<Cell>>>()
                })
                .map_err(map_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_err)?;

            Ok(SampleTable {
                columns: columns.into_iter().map(String::from).collect(),
                rows,
            })
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
