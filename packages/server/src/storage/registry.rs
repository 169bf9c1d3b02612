//! Find-or-create of Profiles and Agents, and the idempotent sample insert.
//!
//! Every function here takes the ingestion [`Transaction`], which was opened
//! with `BEGIN IMMEDIATE`. Holding the write lock from the first statement is
//! what makes each select-then-insert atomic: a second submission for the same
//! hostname cannot read until this one commits or rolls back.

use std::sync::LazyLock;

use netinsight::{AgentIdentity, FieldValue, MetricSample, SAMPLE_FIELDS};
use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};

use super::sqlite::{map_err, SqlParam};
use super::StorageError;

/// Resolve the Profile for `identity.hostname`, creating it if unseen.
///
/// Returns `(profile_id, created)`.
pub(super) fn resolve_profile(
    tx: &Transaction<'_>,
    identity: &AgentIdentity,
    api_key: &str,
    now: &str,
    enforce_key_binding: bool,
) -> Result<(i64, bool), StorageError> {
    let existing: Option<(i64, Option<String>)> = tx
        .query_row(
            "SELECT id, api_key FROM isp_profiles
             WHERE agent_name = ?1 ORDER BY id ASC LIMIT 1",
            params![identity.hostname],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(map_err)?;

    match existing {
        Some((id, stored_key)) => {
            if enforce_key_binding && stored_key.as_deref() != Some(api_key) {
                return Err(StorageError::Unbound(identity.hostname.clone()));
            }
            tx.execute(
                "UPDATE isp_profiles SET
                   last_heard_from         = ?1,
                   agent_type              = ?2,
                   last_reported_hostname  = ?3,
                   last_reported_source_ip = ?4
                 WHERE id = ?5",
                params![
                    now,
                    identity.agent_type,
                    identity.hostname,
                    identity.source_ip,
                    id
                ],
            )
            .map_err(map_err)?;
            Ok((id, false))
        }
        None => {
            if enforce_key_binding {
                return Err(StorageError::Unbound(identity.hostname.clone()));
            }
            tx.execute(
                "INSERT INTO isp_profiles
                   (agent_name, agent_identifier, agent_type, api_key, is_active,
                    last_heard_from, last_reported_hostname, last_reported_source_ip)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7)",
                params![
                    identity.hostname,
                    identity.identifier,
                    identity.agent_type,
                    api_key,
                    now,
                    identity.hostname,
                    identity.source_ip
                ],
            )
            .map_err(map_err)?;
            Ok((tx.last_insert_rowid(), true))
        }
    }
}

/// Resolve the Agent for `(profile_id, identity.hostname)`, creating it if
/// unseen. Returns `(agent_id, created)`.
pub(super) fn resolve_agent(
    tx: &Transaction<'_>,
    profile_id: i64,
    identity: &AgentIdentity,
    now: &str,
) -> Result<(i64, bool), StorageError> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM agents WHERE isp_profile_id = ?1 AND agent_hostname = ?2",
            params![profile_id, identity.hostname],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_err)?;

    match existing {
        Some(id) => {
            tx.execute(
                "UPDATE agents SET last_seen = ?1, agent_source_ip = ?2, agent_type = ?3
                 WHERE id = ?4",
                params![now, identity.source_ip, identity.agent_type, id],
            )
            .map_err(map_err)?;
            Ok((id, false))
        }
        None => {
            tx.execute(
                "INSERT INTO agents
                   (isp_profile_id, agent_hostname, agent_source_ip, agent_type, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    profile_id,
                    identity.hostname,
                    identity.source_ip,
                    identity.agent_type,
                    now
                ],
            )
            .map_err(map_err)?;
            Ok((tx.last_insert_rowid(), true))
        }
    }
}

/// `INSERT OR IGNORE` over every column in [`SAMPLE_FIELDS`], keyed by the
/// unique index on `(isp_profile_id, agent_id, timestamp)`.
static INSERT_SAMPLE_SQL: LazyLock<String> = LazyLock::new(|| {
    let mut columns = vec!["isp_profile_id", "agent_id", "timestamp"];
    columns.extend(SAMPLE_FIELDS.iter().map(|f| f.column));
    columns.push("detailed_health_summary");
    columns.push("sla_met_interval");

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT OR IGNORE INTO sla_metrics ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
});

/// Insert the sample unless an identical (profile, agent, timestamp) row
/// already exists. Returns whether a row was written.
pub(super) fn write_sample(
    tx: &Transaction<'_>,
    profile_id: i64,
    agent_id: i64,
    sample: &MetricSample,
) -> Result<bool, StorageError> {
    let mut values: Vec<SqlParam> = Vec::with_capacity(SAMPLE_FIELDS.len() + 5);
    values.push(SqlParam::Integer(profile_id));
    values.push(SqlParam::Integer(agent_id));
    values.push(SqlParam::Text(sample.timestamp.clone()));
    values.extend(sample.readings.iter().map(|r| reading_param(r.as_ref())));
    values.push(SqlParam::Text(sample.detailed_health_summary.clone()));
    values.push(SqlParam::Integer(i64::from(sample.sla_met)));

    let changed = tx
        .execute(INSERT_SAMPLE_SQL.as_str(), params_from_iter(values.iter()))
        .map_err(map_err)?;
    Ok(changed == 1)
}

fn reading_param(value: Option<&FieldValue>) -> SqlParam {
    match value {
        None => SqlParam::Null,
        Some(FieldValue::Text(s)) => SqlParam::Text(s.clone()),
        Some(FieldValue::Float(f)) => SqlParam::Real(*f),
        Some(FieldValue::Int(i)) => SqlParam::Integer(*i),
        Some(FieldValue::Raw(v)) => match v {
            serde_json::Value::String(s) => SqlParam::Text(s.clone()),
            serde_json::Value::Bool(b) => SqlParam::Integer(i64::from(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Integer(i),
                None => n.as_f64().map(SqlParam::Real).unwrap_or(SqlParam::Null),
            },
            other => SqlParam::Text(other.to_string()),
        },
    }
}
