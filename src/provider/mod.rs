// ABOUTME: Boundary to the cloud API: provision, deprovision, describe, tag query.
// ABOUTME: The core only ever sees the CloudProvider trait; ExecProvider shells out.

mod error;
mod exec;

pub use error::ProviderError;
pub use exec::ExecProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::types::{ResourceId, ResourceKind, StackName};

/// Operations the orchestrator and rollback engine need from a cloud.
///
/// Implementations must be safe to call concurrently: emergency rollback
/// deprovisions many resources at once.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Create one resource. The returned id must identify it for deletion.
    async fn provision(
        &self,
        kind: ResourceKind,
        spec: &ProvisionSpec,
    ) -> Result<Provisioned, ProviderError>;

    /// Delete one resource. Deleting something already gone should report
    /// [`ProviderError::NotFound`].
    async fn deprovision(&self, kind: ResourceKind, id: &ResourceId) -> Result<(), ProviderError>;

    /// Current lifecycle status of one resource.
    async fn describe(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
    ) -> Result<ResourceStatus, ProviderError>;

    /// Identifiers of everything still tagged with the stack name.
    async fn query_by_tag(&self, stack: &StackName) -> Result<Vec<String>, ProviderError>;
}

/// Bound one provider call, turning expiry into [`ProviderError::Timeout`].
pub async fn with_timeout<T>(
    after: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    tokio::time::timeout(after, call)
        .await
        .unwrap_or(Err(ProviderError::Timeout { operation, after }))
}

/// Input to a provisioning call.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionSpec {
    pub stack: StackName,

    /// Ids of resources this one is created inside or attached to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ResourceId>,

    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ProvisionSpec {
    pub fn new(stack: &StackName) -> Self {
        Self {
            stack: stack.clone(),
            depends_on: Vec::new(),
            params: serde_json::Map::new(),
        }
    }

    pub fn depends_on(mut self, id: &ResourceId) -> Self {
        self.depends_on.push(id.clone());
        self
    }

    pub fn depends_on_all<'a>(mut self, ids: impl IntoIterator<Item = &'a ResourceId>) -> Self {
        self.depends_on.extend(ids.into_iter().cloned());
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }
}

/// Result of a successful provisioning call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provisioned {
    pub id: ResourceId,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Provisioned {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(id),
            metadata: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Available,
    Deleting,
    Gone,
    Failed,
    Unknown,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Available => "available",
            ResourceStatus::Deleting => "deleting",
            ResourceStatus::Gone => "gone",
            ResourceStatus::Failed => "failed",
            ResourceStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
