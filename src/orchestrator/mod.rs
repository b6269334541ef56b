// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports state markers, the Deployment struct, and the Orchestrator service.

mod deployment;
mod error;
mod monitor;
mod phases;
mod runner;
mod state;
mod transitions;

pub use deployment::Deployment;
pub use error::{DeployError, DeployErrorKind};
pub use monitor::TriggerMonitor;
pub use runner::{DeployReport, Orchestrator, RunOptions, StackStatus};
pub use state::{Completed, Initialized, Interrupted, Provisioned};
pub use transitions::{DEPLOYMENT_FAILURE, TransitionResult};
