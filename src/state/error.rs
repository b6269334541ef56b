// ABOUTME: Error types for the state store, registry, and snapshots.
// ABOUTME: Distinguishes missing stacks, illegal transitions, and persistence failures.

use std::path::PathBuf;
use thiserror::Error;

use super::status::DeploymentState;
use super::variables::VariableError;
use crate::lock::LockError;
use crate::types::ResourceKind;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("stack not found: {0}")]
    StackNotFound(String),

    #[error("stack {stack} already exists (state {state})")]
    StackExists {
        stack: String,
        state: DeploymentState,
    },

    #[error("invalid state transition for {stack}: {from} -> {to}")]
    InvalidTransition {
        stack: String,
        from: DeploymentState,
        to: DeploymentState,
    },

    #[error("no {kind} registered for stack {stack}")]
    ResourceNotFound { stack: String, kind: ResourceKind },

    #[error("resource kind {0} holds a single id and cannot be appended to")]
    NotMultiValued(ResourceKind),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("snapshot {snapshot} does not contain stack {stack}")]
    SnapshotMissingStack { snapshot: String, stack: String },

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt document {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StateError {
        let path = path.into();
        move |source| StateError::Io { path, source }
    }
}
