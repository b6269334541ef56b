// ABOUTME: Application-wide error types for stackroll.
// ABOUTME: Uses thiserror to fold subsystem errors into one CLI-facing enum.

use thiserror::Error;

use crate::config::ConfigError;
use crate::orchestrator::DeployError;
use crate::rollback::RollbackError;
use crate::state::{StateError, VariableError};
use crate::trigger::TriggerError;
use crate::types::{ParseDeploymentTypeError, StackNameError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid stack name: {0}")]
    StackName(#[from] StackNameError),

    #[error(transparent)]
    DeploymentType(#[from] ParseDeploymentTypeError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error("deployment of {stack} ended in state {state}")]
    DeploymentFailed { stack: String, state: String },

    #[error("rollback of {0} did not complete; manual intervention or an emergency rollback is required")]
    RollbackIncomplete(String),

    #[error("invalid rollback mode: {0}")]
    RollbackMode(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
