// ABOUTME: Rollback report: what was attempted, what happened, what remains.
// ABOUTME: Written as JSON under the state directory for post-mortem diagnosis.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::RollbackMode;
use crate::diagnostics::Warning;
use crate::types::{DeploymentType, ResourceId, ResourceKind, SnapshotId, StackName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionOutcome {
    Deleted,
    /// The provider no longer knew the resource.
    AlreadyGone,
    /// Kept because of an explicit retain directive.
    Retained,
    Failed,
    /// Still outstanding when the emergency timeout elapsed.
    TimedOut,
}

impl DeletionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            DeletionOutcome::Deleted | DeletionOutcome::AlreadyGone | DeletionOutcome::Retained
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceOutcome {
    pub kind: ResourceKind,
    pub id: ResourceId,
    pub attempts: u32,
    pub outcome: DeletionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub stack: StackName,
    pub deployment_type: Option<DeploymentType>,
    pub requested_mode: RollbackMode,
    pub effective_mode: RollbackMode,
    pub trigger_reason: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub duration_secs: f64,
    pub resources: Vec<ResourceOutcome>,
    /// Anything verification found still standing.
    pub leftovers: Vec<String>,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_rollback_snapshot: Option<SnapshotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_rollback_snapshot: Option<SnapshotId>,
}

impl RollbackReport {
    pub fn failed_resources(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.resources.iter().filter(|r| !r.outcome.is_success())
    }

    pub fn filename(&self) -> String {
        format!(
            "{}_rollback_{}.json",
            self.stack,
            self.started.format("%Y%m%dT%H%M%SZ")
        )
    }

    /// Write the report into `dir`, returning its path.
    pub async fn write(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.filename());
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}
