// ABOUTME: Stack lifecycle states and the legal transitions between them.
// ABOUTME: Forward-only except for the rollback branch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a stack.
///
/// ```text
/// initializing -> in_progress -> completed
///                      |  \
///                      |   -> failed -> rolling_back
///                      v                    |
///                 rolling_back -> verifying -> rolled_back
///                      |              |
///                      +--> failed <--+
/// ```
///
/// `NotFound` is a read-side sentinel for unknown stacks and is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    NotFound,
    Initializing,
    InProgress,
    Completed,
    Failed,
    RollingBack,
    Verifying,
    RolledBack,
}

impl DeploymentState {
    pub const ALL: [DeploymentState; 8] = [
        DeploymentState::NotFound,
        DeploymentState::Initializing,
        DeploymentState::InProgress,
        DeploymentState::Completed,
        DeploymentState::Failed,
        DeploymentState::RollingBack,
        DeploymentState::Verifying,
        DeploymentState::RolledBack,
    ];

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(&self, next: DeploymentState) -> bool {
        use DeploymentState::*;
        matches!(
            (self, next),
            (NotFound, Initializing)
                | (RolledBack, Initializing)
                | (Initializing, InProgress)
                | (Initializing, Failed)
                | (Initializing, RollingBack)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, RollingBack)
                | (Completed, RollingBack)
                | (Failed, RollingBack)
                | (RollingBack, Verifying)
                | (RollingBack, Failed)
                | (Verifying, RolledBack)
                | (Verifying, Failed)
        )
    }

    /// A deployment is still moving forward.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DeploymentState::Initializing | DeploymentState::InProgress
        )
    }

    /// A rollback owns the stack.
    pub fn is_rolling_back(&self) -> bool {
        matches!(
            self,
            DeploymentState::RollingBack | DeploymentState::Verifying
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::NotFound => "not_found",
            DeploymentState::Initializing => "initializing",
            DeploymentState::InProgress => "in_progress",
            DeploymentState::Completed => "completed",
            DeploymentState::Failed => "failed",
            DeploymentState::RollingBack => "rolling_back",
            DeploymentState::Verifying => "verifying",
            DeploymentState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeploymentState::ALL
            .into_iter()
            .find(|state| state.as_str() == s.trim())
            .ok_or_else(|| format!("unknown deployment state: {s}"))
    }
}

/// Progress of one phase within a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

impl PhaseStatus {
    /// Phases that may own resources and therefore need unwinding.
    pub fn needs_rollback(&self) -> bool {
        matches!(
            self,
            PhaseStatus::InProgress | PhaseStatus::Completed | PhaseStatus::Failed
        )
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseStatus::Pending => "PENDING",
            PhaseStatus::InProgress => "IN_PROGRESS",
            PhaseStatus::Completed => "COMPLETED",
            PhaseStatus::Failed => "FAILED",
            PhaseStatus::RolledBack => "ROLLED_BACK",
        };
        f.write_str(s)
    }
}
