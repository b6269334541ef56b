// ABOUTME: Persistent deployment state: lifecycle, resources, variables, snapshots.
// ABOUTME: StateStore is the single shared handle every component writes through.

mod document;
mod error;
mod snapshot;
mod status;
mod store;
mod variables;

pub use document::{
    CleanupDirective, DeploymentRecord, HistoryEntry, Metadata, PhaseEntry, ResourceRecord,
    RollbackRecord, StackRecord, StateDocument,
};
pub use error::StateError;
pub use snapshot::{Snapshot, SnapshotKind, SnapshotStore, StackCapture};
pub use status::{DeploymentState, PhaseStatus};
pub use store::{STATE_FILENAME, StateStore};
pub use variables::{
    COST_LIMIT, DEFAULT_DEPLOYMENT_TIMEOUT_SECS, DEPLOYMENT_COST, DEPLOYMENT_PHASES,
    DEPLOYMENT_START_TIME, DEPLOYMENT_TIMEOUT, DEPLOYMENT_TYPE, FAILED_COMPONENTS, HEALTH_STATUS,
    QUOTA_STATUS, Scope, USER_ABORT, VALIDATION_STATUS, VarType, VarValue, VariableDef,
    VariableError, VariableRegistry,
};
