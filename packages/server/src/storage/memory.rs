//! In-memory storage implementation.
//!
//! All data is held in RAM behind a [`RwLock`] and is lost when the process
//! exits. Use this for tests and ephemeral servers.
//!
//! [`Storage::ingest`] takes the write lock for its whole duration, which
//! gives it the same all-or-nothing, one-writer-at-a-time behaviour as the
//! SQLite backend's immediate transaction.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use netinsight::{Agent, FieldValue, MetricSample, Profile};

use super::{
    sample_columns, Cell, IngestReceipt, IngestRequest, ProfileRef, SampleTable, Storage,
    StorageError,
};

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct StoredSample {
    id: i64,
    isp_profile_id: i64,
    agent_id: i64,
    sample: MetricSample,
}

#[derive(Default)]
struct Inner {
    /// Ordered by id; ids are assigned sequentially from 1.
    profiles: Vec<Profile>,
    agents: Vec<Agent>,
    samples: Vec<StoredSample>,
    /// (profile, agent, timestamp) of every stored sample.
    sample_keys: HashSet<(i64, i64, String)>,
}

impl Inner {
    fn profile_by_hostname_mut(&mut self, hostname: &str) -> Option<&mut Profile> {
        self.profiles.iter_mut().find(|p| p.agent_name == hostname)
    }

    fn next_profile_id(&self) -> i64 {
        self.profiles.last().map_or(1, |p| p.id + 1)
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Thread-safe, in-memory implementation of [`Storage`].
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Internal("memory storage lock poisoned".into())
}

// ---------------------------------------------------------------------------
// Storage impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Storage for MemoryStorage {
    // --- Credentials ---------------------------------------------------------

    async fn authenticate(&self, api_key: &str) -> Result<Option<ProfileRef>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .profiles
            .iter()
            .find(|p| p.api_key == api_key)
            .map(|p| ProfileRef {
                profile_id: p.id,
                agent_name: p.agent_name.clone(),
            }))
    }

    // --- Ingestion -----------------------------------------------------------

    async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt, StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let identity = &request.identity;
        let now = &request.received_at;

        // Check binding before touching anything so a rejection mutates nothing.
        if request.enforce_key_binding {
            let bound = inner
                .profiles
                .iter()
                .find(|p| p.agent_name == identity.hostname)
                .is_some_and(|p| p.api_key == request.api_key);
            if !bound {
                return Err(StorageError::Unbound(identity.hostname.clone()));
            }
        }

        let (profile_id, profile_created) = match inner.profile_by_hostname_mut(&identity.hostname)
        {
            Some(profile) => {
                profile.last_heard_from = Some(now.clone());
                profile.agent_type = identity.agent_type.clone();
                profile.last_reported_hostname = Some(identity.hostname.clone());
                profile.last_reported_source_ip = Some(identity.source_ip.clone());
                (profile.id, false)
            }
            None => {
                let id = inner.next_profile_id();
                inner.profiles.push(Profile {
                    id,
                    agent_name: identity.hostname.clone(),
                    agent_identifier: identity.identifier.clone(),
                    agent_type: identity.agent_type.clone(),
                    api_key: request.api_key.clone(),
                    is_active: true,
                    last_heard_from: Some(now.clone()),
                    last_reported_hostname: Some(identity.hostname.clone()),
                    last_reported_source_ip: Some(identity.source_ip.clone()),
                });
                (id, true)
            }
        };

        let existing_agent = inner
            .agents
            .iter_mut()
            .find(|a| a.isp_profile_id == profile_id && a.agent_hostname == identity.hostname);
        let (agent_id, agent_created) = match existing_agent {
            Some(agent) => {
                agent.last_seen = now.clone();
                agent.agent_source_ip = identity.source_ip.clone();
                agent.agent_type = identity.agent_type.clone();
                (agent.id, false)
            }
            None => {
                let id = inner.agents.last().map_or(1, |a| a.id + 1);
                inner.agents.push(Agent {
                    id,
                    isp_profile_id: profile_id,
                    agent_hostname: identity.hostname.clone(),
                    agent_source_ip: identity.source_ip.clone(),
                    agent_type: identity.agent_type.clone(),
                    first_seen: now.clone(),
                    last_seen: now.clone(),
                });
                (id, true)
            }
        };

        let key = (profile_id, agent_id, request.sample.timestamp.clone());
        let sample_inserted = inner.sample_keys.insert(key);
        if sample_inserted {
            let id = inner.samples.last().map_or(1, |s| s.id + 1);
            inner.samples.push(StoredSample {
                id,
                isp_profile_id: profile_id,
                agent_id,
                sample: request.sample.clone(),
            });
        }

        Ok(IngestReceipt {
            profile_id,
            agent_id,
            profile_created,
            agent_created,
            sample_inserted,
        })
    }

    // --- Profiles ------------------------------------------------------------

    async fn get_profile(&self, id: i64) -> Result<Option<Profile>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn find_profile_by_hostname(
        &self,
        hostname: &str,
    ) -> Result<Option<Profile>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .profiles
            .iter()
            .find(|p| p.agent_name == hostname)
            .cloned())
    }

    async fn find_profile_by_key(&self, api_key: &str) -> Result<Option<Profile>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.profiles.iter().find(|p| p.api_key == api_key).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.profiles.clone())
    }

    async fn issue_key(&self, hostname: &str, api_key: &str) -> Result<Profile, StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if let Some(profile) = inner.profile_by_hostname_mut(hostname) {
            profile.api_key = api_key.to_string();
            profile.is_active = true;
            return Ok(profile.clone());
        }

        let profile = Profile {
            id: inner.next_profile_id(),
            agent_name: hostname.to_string(),
            agent_identifier: hostname.to_string(),
            agent_type: netinsight::DEFAULT_AGENT_TYPE.to_string(),
            api_key: api_key.to_string(),
            is_active: true,
            last_heard_from: None,
            last_reported_hostname: None,
            last_reported_source_ip: None,
        };
        inner.profiles.push(profile.clone());
        Ok(profile)
    }

    // --- Agents --------------------------------------------------------------

    async fn list_agents(&self, profile_id: i64) -> Result<Vec<Agent>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut agents: Vec<Agent> = inner
            .agents
            .iter()
            .filter(|a| a.isp_profile_id == profile_id)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.agent_hostname.cmp(&b.agent_hostname));
        Ok(agents)
    }

    // --- Samples -------------------------------------------------------------

    async fn export_samples(&self, profile_id: i64) -> Result<SampleTable, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut stored: Vec<&StoredSample> = inner
            .samples
            .iter()
            .filter(|s| s.isp_profile_id == profile_id)
            .collect();
        stored.sort_by(|a, b| {
            a.sample
                .timestamp
                .cmp(&b.sample.timestamp)
                .then(a.id.cmp(&b.id))
        });

        let rows = stored.into_iter().map(row_of).collect();
        Ok(SampleTable {
            columns: sample_columns().into_iter().map(String::from).collect(),
            rows,
        })
    }
}

/// Flatten a stored sample in [`sample_columns`] order.
fn row_of(stored: &StoredSample) -> Vec<Cell> {
    let mut row = vec![
        Cell::Integer(stored.id),
        Cell::Integer(stored.isp_profile_id),
        Cell::Integer(stored.agent_id),
        Cell::Text(stored.sample.timestamp.clone()),
    ];
    row.extend(stored.sample.readings.iter().map(|r| match r {
        None => Cell::Null,
        Some(FieldValue::Text(s)) => Cell::Text(s.clone()),
        Some(FieldValue::Float(f)) => Cell::Real(*f),
        Some(FieldValue::Int(i)) => Cell::Integer(*i),
        Some(FieldValue::Raw(v)) => Cell::Text(v.to_string()),
    }));
    row.push(Cell::Text(stored.sample.detailed_health_summary.clone()));
    row.push(Cell::Integer(i64::from(stored.sample.sla_met)));
    row
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
