// ABOUTME: Rollback errors that stop the engine before or outside teardown.
// ABOUTME: Per-resource deletion failures are outcomes in the report, not errors.

use crate::state::{DeploymentState, StateError};

#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    /// The stack could not be prepared for rollback; nothing was deleted.
    #[error("rollback initialization failed for {stack}: {reason}")]
    InitializationFailed { stack: String, reason: String },

    /// The stack is in a state rollback cannot start from.
    #[error("stack {stack} cannot be rolled back from state {state}")]
    NotRollbackable {
        stack: String,
        state: DeploymentState,
    },

    #[error(transparent)]
    State(#[from] StateError),
}

impl RollbackError {
    /// True when the failure happened before any deletion was attempted.
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            RollbackError::InitializationFailed { .. } | RollbackError::NotRollbackable { .. }
        )
    }
}
