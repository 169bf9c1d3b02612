//! Additive schema migrations for the SQLite store.
//!
//! The applied version lives in `PRAGMA user_version`. Every step only creates
//! structures or adds nullable columns, and each one checks before it acts, so
//! a database created by an older deployment that never set the marker is
//! upgraded in place with its rows intact.
//!
//! [`ensure_schema`] runs once when the store is opened. [`migrate`] is also
//! the first statement of every ingestion transaction; once the marker is
//! current that is a single pragma read.

use netinsight::{FieldKind, SAMPLE_FIELDS};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

use super::sqlite::map_err;
use super::StorageError;

/// Version reached after every step in [`MIGRATIONS`] has run.
pub const SCHEMA_VERSION: i64 = 4;

struct Migration {
    version: i64,
    description: &'static str,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "profile and sample tables",
        apply: create_base_tables,
    },
    Migration {
        version: 2,
        description: "agents table",
        apply: create_agents_table,
    },
    Migration {
        version: 3,
        description: "sample agent linkage",
        apply: add_sample_agent_link,
    },
    Migration {
        version: 4,
        description: "measurement columns",
        apply: add_measurement_columns,
    },
];

/// Bring the database up to [`SCHEMA_VERSION`] in its own immediate
/// transaction. Concurrent callers serialise on the write lock; the loser
/// finds the marker already current and does nothing.
pub fn ensure_schema(conn: &mut Connection) -> Result<usize, StorageError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(map_err)?;
    let applied = migrate(&tx)?;
    tx.commit().map_err(map_err)?;
    Ok(applied)
}

/// Apply every step newer than the stored marker inside `tx`.
///
/// Returns the number of steps applied.
pub fn migrate(tx: &Transaction<'_>) -> Result<usize, StorageError> {
    let current = schema_version(tx)?;
    let mut applied = 0;

    for step in MIGRATIONS.iter().filter(|m| m.version > current) {
        (step.apply)(tx).map_err(|e| {
            StorageError::Internal(format!(
                "schema migration {} ({}) failed: {e}",
                step.version, step.description
            ))
        })?;
        tx.execute_batch(&format!("PRAGMA user_version = {}", step.version))
            .map_err(map_err)?;
        tracing::info!(
            version = step.version,
            "schema: applied {}",
            step.description
        );
        applied += 1;
    }

    Ok(applied)
}

pub fn schema_version(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(map_err)
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn create_base_tables(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS isp_profiles (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_name              TEXT NOT NULL,
            agent_identifier        TEXT,
            agent_type              TEXT NOT NULL DEFAULT 'Client',
            api_key                 TEXT,
            is_active               INTEGER NOT NULL DEFAULT 1,
            last_heard_from         TEXT,
            last_reported_hostname  TEXT,
            last_reported_source_ip TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_isp_profiles_agent_name ON isp_profiles(agent_name);
        CREATE INDEX IF NOT EXISTS idx_isp_profiles_api_key    ON isp_profiles(api_key);

        CREATE TABLE IF NOT EXISTS sla_metrics (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            isp_profile_id          INTEGER NOT NULL REFERENCES isp_profiles(id),
            timestamp               TEXT NOT NULL,
            overall_connectivity    TEXT,
            avg_rtt_ms              REAL,
            avg_loss_percent        REAL,
            avg_jitter_ms           REAL,
            dns_status              TEXT,
            dns_resolve_time_ms     INTEGER,
            http_status             TEXT,
            http_response_code      INTEGER,
            http_total_time_s       REAL,
            speedtest_status        TEXT,
            speedtest_download_mbps REAL,
            speedtest_upload_mbps   REAL,
            speedtest_ping_ms       REAL,
            speedtest_jitter_ms     REAL,
            wifi_signal_percent     INTEGER,
            wifi_signal_dbm         INTEGER,
            detailed_health_summary TEXT,
            sla_met_interval        INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_sla_metrics_profile_ts ON sla_metrics(isp_profile_id, timestamp);
        ",
    )
}

fn create_agents_table(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS agents (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            isp_profile_id  INTEGER NOT NULL REFERENCES isp_profiles(id),
            agent_hostname  TEXT NOT NULL,
            agent_source_ip TEXT,
            agent_type      TEXT,
            first_seen      TEXT NOT NULL,
            last_seen       TEXT NOT NULL,
            UNIQUE (isp_profile_id, agent_hostname)
        );
        ",
    )
}

fn add_sample_agent_link(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    if !column_exists(tx, "sla_metrics", "agent_id")? {
        tx.execute_batch("ALTER TABLE sla_metrics ADD COLUMN agent_id INTEGER REFERENCES agents(id)")?;
    }
    // Legacy rows keep agent_id NULL; NULLs never collide in a unique index.
    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sla_metrics_sample
             ON sla_metrics(isp_profile_id, agent_id, timestamp)",
    )
}

fn add_measurement_columns(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    for spec in SAMPLE_FIELDS {
        if !column_exists(tx, "sla_metrics", spec.column)? {
            tx.execute_batch(&format!(
                "ALTER TABLE sla_metrics ADD COLUMN {} {}",
                spec.column,
                sql_type(spec.kind)
            ))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn column_exists(
    conn: &Connection,
    table: &str,
    column: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
}

fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text | FieldKind::Raw => "TEXT",
        FieldKind::Float => "REAL",
        FieldKind::Int => "INTEGER",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn fresh_database_reaches_current_version() {
        let mut conn = memory_conn();
        let applied = ensure_schema(&mut conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(column_exists(&conn, "sla_metrics", "agent_id").unwrap());
        assert!(column_exists(&conn, "sla_metrics", "wifi_bssid").unwrap());
        assert!(column_exists(&conn, "agents", "last_seen").unwrap());
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut conn = memory_conn();
        ensure_schema(&mut conn).unwrap();
        assert_eq!(ensure_schema(&mut conn).unwrap(), 0);
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn unmarked_legacy_database_is_upgraded_in_place() {
        let mut conn = memory_conn();
        conn.execute_batch(
            "
            CREATE TABLE isp_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_name TEXT NOT NULL,
                agent_identifier TEXT,
                agent_type TEXT NOT NULL DEFAULT 'Client',
                api_key TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_heard_from TEXT,
                last_reported_hostname TEXT,
                last_reported_source_ip TEXT
            );
            CREATE TABLE sla_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                isp_profile_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                avg_rtt_ms REAL,
                detailed_health_summary TEXT,
                sla_met_interval INTEGER NOT NULL DEFAULT 0
            );
            INSERT INTO isp_profiles (agent_name, api_key) VALUES ('legacy', 'k');
            INSERT INTO sla_metrics (isp_profile_id, timestamp, avg_rtt_ms) VALUES (1, 't0', 12.5);
            ",
        )
        .unwrap();

        ensure_schema(&mut conn).unwrap();

        let (rtt, agent_id): (f64, Option<i64>) = conn
            .query_row(
                "SELECT avg_rtt_ms, agent_id FROM sla_metrics WHERE timestamp = 't0'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(rtt, 12.5);
        assert_eq!(agent_id, None);
        for spec in SAMPLE_FIELDS {
            assert!(
                column_exists(&conn, "sla_metrics", spec.column).unwrap(),
                "missing {}",
                spec.column
            );
        }
    }

    #[test]
    fn partially_migrated_database_resumes_from_marker() {
        let mut conn = memory_conn();
        {
            let tx = conn.transaction().unwrap();
            create_base_tables(&tx).unwrap();
            tx.execute_batch("PRAGMA user_version = 1").unwrap();
            tx.commit().unwrap();
        }
        assert_eq!(ensure_schema(&mut conn).unwrap(), 3);
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
