// ABOUTME: Immutable point-in-time captures of stack resources and variables.
// ABOUTME: Stored as individually addressable JSON documents with a retention sweep.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::document::{PhaseEntry, ResourceRecord, RollbackRecord, StackRecord};
use super::error::StateError;
use super::status::DeploymentState;
use super::variables::VarValue;
use crate::types::{DeploymentType, ResourceKind, SnapshotId, StackName};

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    PreRollback,
    PostRollback,
    Backup,
    StateDelete,
    Manual,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::PreRollback => "pre_rollback",
            SnapshotKind::PostRollback => "post_rollback",
            SnapshotKind::Backup => "backup",
            SnapshotKind::StateDelete => "state_delete",
            SnapshotKind::Manual => "manual",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The captured parts of one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackCapture {
    pub status: DeploymentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<DeploymentType>,
    pub phases: Vec<PhaseEntry>,
    pub resources: BTreeMap<ResourceKind, ResourceRecord>,
    pub variables: BTreeMap<String, VarValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackRecord>,
}

impl From<&StackRecord> for StackCapture {
    fn from(record: &StackRecord) -> Self {
        StackCapture {
            status: record.status,
            deployment_type: record.deployment_type,
            phases: record.phases.clone(),
            resources: record.resources.clone(),
            variables: record.variables.clone(),
            rollback: record.rollback.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// `None` for whole-document snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<StackName>,
    pub kind: SnapshotKind,
    pub created: DateTime<Utc>,
    pub stacks: BTreeMap<StackName, StackCapture>,
    #[serde(default)]
    pub global_variables: BTreeMap<String, VarValue>,
}

impl Snapshot {
    /// Snapshot id in `{stack}_{kind}_{timestamp}` form; `all` stands in for
    /// whole-document snapshots.
    pub fn make_id(stack: Option<&StackName>, kind: SnapshotKind, at: DateTime<Utc>) -> SnapshotId {
        let prefix = stack.map(StackName::as_str).unwrap_or("all");
        SnapshotId::new(format!(
            "{}_{}_{}",
            prefix,
            kind,
            at.format("%Y%m%dT%H%M%S%3fZ")
        ))
    }
}

enum Backend {
    Memory(Mutex<BTreeMap<SnapshotId, Snapshot>>),
    Dir(PathBuf),
}

/// Durable home for snapshots.
pub struct SnapshotStore {
    backend: Backend,
}

impl fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            Backend::Memory(_) => f.write_str("SnapshotStore(memory)"),
            Backend::Dir(dir) => write!(f, "SnapshotStore({})", dir.display()),
        }
    }
}

impl SnapshotStore {
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Dir(dir.into()),
        }
    }

    fn path_for(dir: &std::path::Path, id: &SnapshotId) -> PathBuf {
        dir.join(format!("{id}.json"))
    }

    async fn exists(&self, id: &SnapshotId) -> bool {
        match &self.backend {
            Backend::Memory(map) => map.lock().contains_key(id),
            Backend::Dir(dir) => tokio::fs::try_exists(Self::path_for(dir, id))
                .await
                .unwrap_or(false),
        }
    }

    /// Persist a snapshot, disambiguating its id if another snapshot already
    /// holds it. Returns the id actually used.
    pub async fn save(&self, mut snapshot: Snapshot) -> Result<SnapshotId, StateError> {
        let base = snapshot.id.as_str().to_string();
        let mut n = 1;
        while self.exists(&snapshot.id).await {
            snapshot.id = SnapshotId::new(format!("{base}-{n}"));
            n += 1;
        }

        let id = snapshot.id.clone();
        match &self.backend {
            Backend::Memory(map) => {
                map.lock().insert(id.clone(), snapshot);
            }
            Backend::Dir(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(StateError::io(dir))?;
                let path = Self::path_for(dir, &id);
                let json = serde_json::to_vec_pretty(&snapshot)?;
                tokio::fs::write(&path, json)
                    .await
                    .map_err(StateError::io(&path))?;
            }
        }

        tracing::debug!(snapshot = %id, "Snapshot saved");
        Ok(id)
    }

    pub async fn load(&self, id: &SnapshotId) -> Result<Snapshot, StateError> {
        match &self.backend {
            Backend::Memory(map) => map
                .lock()
                .get(id)
                .cloned()
                .ok_or_else(|| StateError::SnapshotNotFound(id.to_string())),
            Backend::Dir(dir) => {
                let path = Self::path_for(dir, id);
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(StateError::SnapshotNotFound(id.to_string()));
                    }
                    Err(e) => return Err(StateError::io(&path)(e)),
                };
                serde_json::from_slice(&bytes).map_err(|source| StateError::Corrupt { path, source })
            }
        }
    }

    /// All snapshots, oldest first, optionally limited to one stack.
    pub async fn list(&self, stack: Option<&StackName>) -> Result<Vec<Snapshot>, StateError> {
        let mut snapshots = match &self.backend {
            Backend::Memory(map) => map.lock().values().cloned().collect::<Vec<_>>(),
            Backend::Dir(dir) => {
                let mut snapshots = Vec::new();
                let mut entries = match tokio::fs::read_dir(dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
                    Err(e) => return Err(StateError::io(dir)(e)),
                };
                while let Some(entry) = entries.next_entry().await.map_err(StateError::io(dir))? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    let bytes = tokio::fs::read(&path).await.map_err(StateError::io(&path))?;
                    match serde_json::from_slice::<Snapshot>(&bytes) {
                        Ok(snapshot) => snapshots.push(snapshot),
                        Err(e) => {
                            tracing::warn!("Skipping unreadable snapshot {}: {}", path.display(), e);
                        }
                    }
                }
                snapshots
            }
        };

        if let Some(stack) = stack {
            snapshots.retain(|s| s.stacks.contains_key(stack));
        }
        snapshots.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(snapshots)
    }

    /// Delete snapshots older than `retention_days`. Returns how many were removed.
    pub async fn cleanup(&self, retention_days: u32) -> Result<usize, StateError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let expired: Vec<SnapshotId> = self
            .list(None)
            .await?
            .into_iter()
            .filter(|s| s.created < cutoff)
            .map(|s| s.id)
            .collect();

        for id in &expired {
            match &self.backend {
                Backend::Memory(map) => {
                    map.lock().remove(id);
                }
                Backend::Dir(dir) => {
                    let path = Self::path_for(dir, id);
                    tokio::fs::remove_file(&path)
                        .await
                        .map_err(StateError::io(&path))?;
                }
            }
        }

        if !expired.is_empty() {
            tracing::info!(
                "Removed {} snapshot(s) older than {} days",
                expired.len(),
                retention_days
            );
        }
        Ok(expired.len())
    }
}
