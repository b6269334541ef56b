// ABOUTME: The persisted, versioned state document and its per-stack records.
// ABOUTME: Layout: metadata, stacks keyed by name, and a global append-only history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::status::{DeploymentState, PhaseStatus};
use super::variables::VarValue;
use crate::types::{DeploymentType, Phase, ResourceId, ResourceKind, StackName};

/// Current document format version.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    pub metadata: Metadata,
    #[serde(default)]
    pub stacks: BTreeMap<StackName, StackRecord>,
    #[serde(default)]
    pub variables: BTreeMap<String, VarValue>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub version: u32,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl StateDocument {
    pub fn new() -> Self {
        let now = Utc::now();
        StateDocument {
            metadata: Metadata {
                version: DOCUMENT_VERSION,
                created: now,
                last_modified: now,
            },
            stacks: BTreeMap::new(),
            variables: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Append a history entry and bump modification times.
    pub(crate) fn record(&mut self, stack: Option<&StackName>, details: String) {
        let now = Utc::now();
        self.metadata.last_modified = now;

        let state = stack.map(|name| match self.stacks.get_mut(name) {
            Some(record) => {
                record.last_modified = now;
                record.status
            }
            None => DeploymentState::NotFound,
        });

        self.history.push(HistoryEntry {
            timestamp: now,
            stack: stack.cloned(),
            state,
            details,
        });
    }
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything known about one stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackRecord {
    pub status: DeploymentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<DeploymentType>,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub phases: Vec<PhaseEntry>,
    #[serde(default)]
    pub resources: BTreeMap<ResourceKind, ResourceRecord>,
    #[serde(default)]
    pub deployments: Vec<DeploymentRecord>,
    #[serde(default)]
    pub variables: BTreeMap<String, VarValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackRecord>,
}

impl StackRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        StackRecord {
            status: DeploymentState::Initializing,
            deployment_type: None,
            created: now,
            last_modified: now,
            phases: Vec::new(),
            resources: BTreeMap::new(),
            deployments: Vec::new(),
            variables: BTreeMap::new(),
            rollback: None,
        }
    }

    pub fn phase_status(&self, phase: Phase) -> Option<PhaseStatus> {
        self.phases
            .iter()
            .find(|entry| entry.phase == phase)
            .map(|entry| entry.status)
    }

    /// The deployment currently recorded as running, if any.
    pub fn current_deployment_mut(&mut self) -> Option<&mut DeploymentRecord> {
        self.deployments
            .last_mut()
            .filter(|deployment| deployment.finished.is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub phase: Phase,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

/// A provisioned resource as tracked in the registry.
///
/// Most kinds hold a single id. Multi-valued kinds (subnets, NAT gateways,
/// mount targets) keep every id in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub ids: Vec<ResourceId>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupDirective>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ResourceId>,
}

impl ResourceRecord {
    pub fn new(kind: ResourceKind, id: ResourceId, metadata: serde_json::Value) -> Self {
        ResourceRecord {
            kind,
            ids: vec![id],
            created: Utc::now(),
            metadata,
            cleanup: None,
            depends_on: Vec::new(),
        }
    }

    pub fn primary_id(&self) -> Option<&ResourceId> {
        self.ids.first()
    }
}

/// Explicit instruction for how rollback treats a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupDirective {
    /// Leave the resource in place; only drop it from the registry.
    Retain,
    /// Ask the provider to force deletion (skip graceful draining).
    Force,
}

/// One deployment attempt against a stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub deployment_type: DeploymentType,
    pub started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DeploymentState>,
}

/// Bookkeeping for the most recent rollback of a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub mode: String,
    pub trigger_reason: String,
    pub started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<StackName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DeploymentState>,
    pub details: String,
}
