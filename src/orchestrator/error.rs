// ABOUTME: Error types for deployment orchestration.
// ABOUTME: DeployErrorKind classifies failures for exit codes and reports.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::lock::LockError;
use crate::provider::ProviderError;
use crate::rollback::RollbackError;
use crate::state::StateError;
use crate::types::{Phase, ResourceId, ResourceKind};

/// Errors that can occur while deploying a stack.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Provider settings failed validation; nothing was touched.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Another deployment or rollback holds the stack.
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    State(#[from] StateError),

    /// A provisioning call failed.
    #[error("{phase} phase: failed to provision {kind}: {source}")]
    Provisioning {
        phase: Phase,
        kind: ResourceKind,
        #[source]
        source: ProviderError,
    },

    /// A provisioned instance never became available.
    #[error("{phase} phase: {kind} {id} not ready: {reason}")]
    NotReady {
        phase: Phase,
        kind: ResourceKind,
        id: ResourceId,
        reason: String,
    },

    /// A phase ran before the resources it builds on were registered.
    #[error("{phase} phase requires a {kind}, none is registered")]
    MissingDependency { phase: Phase, kind: ResourceKind },

    /// A rollback trigger stopped the deployment.
    #[error("deployment interrupted by trigger {trigger}")]
    Triggered { trigger: String },

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error("failed to create {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Failure classes for errors that end a deployment. A rollback that fails
/// verification is not an error here; it is reported through the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Configuration,
    Provisioning,
    RollbackInitialization,
    Lock,
    State,
    Interrupted,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Config(_) => DeployErrorKind::Configuration,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::State(StateError::Lock(_)) => DeployErrorKind::Lock,
            DeployError::State(StateError::StackExists { .. }) => DeployErrorKind::Configuration,
            DeployError::State(_) | DeployError::Io { .. } => DeployErrorKind::State,
            DeployError::Provisioning { .. }
            | DeployError::NotReady { .. }
            | DeployError::MissingDependency { .. } => DeployErrorKind::Provisioning,
            DeployError::Triggered { .. } => DeployErrorKind::Interrupted,
            DeployError::Rollback(e) if e.is_initialization() => {
                DeployErrorKind::RollbackInitialization
            }
            DeployError::Rollback(_) => DeployErrorKind::State,
        }
    }

    /// The component to record in `FAILED_COMPONENTS`, if the error names one.
    pub fn failed_component(&self) -> Option<crate::types::Component> {
        match self {
            DeployError::Provisioning { kind, .. }
            | DeployError::NotReady { kind, .. }
            | DeployError::MissingDependency { kind, .. } => Some(kind.component()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_errors_name_their_component() {
        let err = DeployError::Provisioning {
            phase: Phase::Infrastructure,
            kind: ResourceKind::SecurityGroup,
            source: ProviderError::rejected("provision security_group", "limit reached"),
        };
        assert_eq!(err.kind(), DeployErrorKind::Provisioning);
        assert_eq!(
            err.failed_component(),
            Some(crate::types::Component::SecurityGroups)
        );
    }

    #[test]
    fn config_errors_are_configuration_class() {
        let err = DeployError::from(ConfigError::MissingRegion);
        assert_eq!(err.kind(), DeployErrorKind::Configuration);
        assert_eq!(err.failed_component(), None);
    }

    #[test]
    fn rollback_initialization_is_distinct() {
        let err = DeployError::from(RollbackError::InitializationFailed {
            stack: "web".into(),
            reason: "stack not found".into(),
        });
        assert_eq!(err.kind(), DeployErrorKind::RollbackInitialization);
    }
}
