// ABOUTME: Stack-scoped catalog of provisioned cloud resources.
// ABOUTME: Thin typed layer over the state store's resource records.

use crate::state::{CleanupDirective, ResourceRecord, StateError, StateStore};
use crate::types::{ResourceId, ResourceKind, StackName};

/// The registry records every resource the moment it exists, so that a
/// rollback can find it no matter where a deployment stopped.
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    store: StateStore,
}

impl ResourceRegistry {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Record `id` as the resource of `kind`, replacing any earlier record.
    pub async fn register(
        &self,
        stack: &StackName,
        kind: ResourceKind,
        id: ResourceId,
        metadata: serde_json::Value,
    ) -> Result<(), StateError> {
        tracing::debug!(stack = %stack, "Registering {} {}", kind, id);
        self.store
            .put_resource(stack, ResourceRecord::new(kind, id, metadata))
            .await
    }

    /// Record a resource with an explicit cleanup directive.
    pub async fn register_with(
        &self,
        stack: &StackName,
        kind: ResourceKind,
        id: ResourceId,
        metadata: serde_json::Value,
        cleanup: CleanupDirective,
    ) -> Result<(), StateError> {
        let mut record = ResourceRecord::new(kind, id, metadata);
        record.cleanup = Some(cleanup);
        self.store.put_resource(stack, record).await
    }

    /// Add one member to a multi-valued kind (subnets, NAT gateways, mount targets).
    pub async fn append(
        &self,
        stack: &StackName,
        kind: ResourceKind,
        id: ResourceId,
        metadata: serde_json::Value,
    ) -> Result<(), StateError> {
        tracing::debug!(stack = %stack, "Registering {} {}", kind, id);
        self.store
            .append_resource_id(stack, kind, id, metadata)
            .await
    }

    /// Forget one id. Returns whether it was registered.
    pub async fn remove_member(
        &self,
        stack: &StackName,
        kind: ResourceKind,
        id: &ResourceId,
    ) -> Result<bool, StateError> {
        self.store.remove_resource_id(stack, kind, id).await
    }

    /// Forget every id of `kind`.
    pub async fn unregister(&self, stack: &StackName, kind: ResourceKind) -> Result<(), StateError> {
        self.store.delete_resource(stack, kind).await.map(|_| ())
    }

    pub async fn get(
        &self,
        stack: &StackName,
        kind: ResourceKind,
    ) -> Result<Option<ResourceRecord>, StateError> {
        Ok(self
            .store
            .list_resources(stack)
            .await?
            .into_iter()
            .find(|record| record.kind == kind))
    }

    pub async fn exists(&self, stack: &StackName, kind: ResourceKind) -> Result<bool, StateError> {
        Ok(self.get(stack, kind).await?.is_some())
    }

    /// All records for a stack, in teardown order.
    pub async fn list(&self, stack: &StackName) -> Result<Vec<ResourceRecord>, StateError> {
        self.store.list_resources(stack).await
    }

    pub async fn is_empty(&self, stack: &StackName) -> Result<bool, StateError> {
        Ok(self.list(stack).await?.is_empty())
    }
}
