// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Stack names, deployment types, phases, and the resource kind catalog.

mod deployment_type;
mod id;
mod resource_kind;
mod stack_name;

pub use deployment_type::{DeploymentType, ParseDeploymentTypeError, Phase};
pub use id::{Id, ResourceId, SnapshotId};
pub use resource_kind::{Component, ParseResourceKindError, ResourceKind, Settle};
pub use stack_name::{StackName, StackNameError};
