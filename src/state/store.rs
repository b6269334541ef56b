// ABOUTME: The shared state store: stacks, resources, variables, history, snapshots.
// ABOUTME: Every mutation is a serialized read-modify-write of one persisted document.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::document::{
    DeploymentRecord, HistoryEntry, PhaseEntry, ResourceRecord, RollbackRecord, StackRecord,
    StateDocument,
};
use super::error::StateError;
use super::snapshot::{Snapshot, SnapshotKind, SnapshotStore, StackCapture};
use super::status::{DeploymentState, PhaseStatus};
use super::variables::{Scope, VarValue, VariableRegistry};
use crate::lock::LockFile;
use crate::types::{DeploymentType, Phase, ResourceId, ResourceKind, SnapshotId, StackName};

pub const STATE_FILENAME: &str = "state.json";

/// How long a writer waits for another process to finish its write.
const DOCUMENT_LOCK_WAIT: Duration = Duration::from_secs(10);

enum Backend {
    Memory,
    File { path: PathBuf, lock_path: PathBuf },
}

struct Inner {
    backend: Backend,
    cache: Mutex<StateDocument>,
    variables: Arc<VariableRegistry>,
    snapshots: SnapshotStore,
}

/// Handle to the state store. Cheap to clone; all clones share one document.
///
/// Writers are serialized twice: in-process by a mutex around the cached
/// document, and across processes by a lock file next to `state.json`. Each
/// mutation reloads the document from disk under both locks before applying,
/// so a monitor writing a signal from another process is never overwritten.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner.backend {
            Backend::Memory => f.write_str("StateStore(memory)"),
            Backend::File { path, .. } => write!(f, "StateStore({})", path.display()),
        }
    }
}

impl StateStore {
    /// A store that lives only as long as the process.
    pub fn in_memory(variables: Arc<VariableRegistry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend: Backend::Memory,
                cache: Mutex::new(StateDocument::new()),
                variables,
                snapshots: SnapshotStore::in_memory(),
            }),
        }
    }

    /// Open (or create) the store under `dir`.
    pub async fn open(dir: &Path, variables: Arc<VariableRegistry>) -> Result<Self, StateError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(StateError::io(dir))?;

        let path = dir.join(STATE_FILENAME);
        let lock_path = dir.join(format!("{STATE_FILENAME}.lock"));
        let document = match Self::read_file(&path).await? {
            Some(document) => document,
            None => {
                let document = StateDocument::new();
                Self::write_file(&path, &document).await?;
                tracing::info!("Initialized state document at {}", path.display());
                document
            }
        };

        Ok(Self {
            inner: Arc::new(Inner {
                backend: Backend::File { path, lock_path },
                cache: Mutex::new(document),
                variables,
                snapshots: SnapshotStore::in_dir(dir.join("snapshots")),
            }),
        })
    }

    pub fn variables(&self) -> &Arc<VariableRegistry> {
        &self.inner.variables
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.inner.snapshots
    }

    // =========================================================================
    // Persistence plumbing
    // =========================================================================

    async fn read_file(path: &Path) -> Result<Option<StateDocument>, StateError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StateError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::io(path)(e)),
        }
    }

    /// Write via a temp file and rename so readers never see a torn document.
    async fn write_file(path: &Path, document: &StateDocument) -> Result<(), StateError> {
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(StateError::io(&tmp))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(StateError::io(path))
    }

    async fn refresh(&self, cache: &mut StateDocument) -> Result<(), StateError> {
        if let Backend::File { path, .. } = &self.inner.backend
            && let Some(document) = Self::read_file(path).await?
        {
            *cache = document;
        }
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(&StateDocument) -> T) -> Result<T, StateError> {
        let mut cache = self.inner.cache.lock().await;
        self.refresh(&mut cache).await?;
        Ok(f(&cache))
    }

    /// Serialized read-modify-write. `f` returns its result plus the history
    /// details for the change; nothing is persisted if `f` fails.
    async fn mutate<T>(
        &self,
        stack: Option<&StackName>,
        f: impl FnOnce(&mut StateDocument) -> Result<(T, String), StateError>,
    ) -> Result<T, StateError> {
        let mut cache = self.inner.cache.lock().await;

        let _document_lock = match &self.inner.backend {
            Backend::Memory => None,
            Backend::File { lock_path, .. } => Some(
                LockFile::acquire_waiting(
                    lock_path,
                    "state document",
                    DOCUMENT_LOCK_WAIT,
                    LockFile::document_stale_after(),
                )
                .await?,
            ),
        };

        self.refresh(&mut cache).await?;

        let mut working = cache.clone();
        let (out, details) = f(&mut working)?;
        working.record(stack, details);

        if let Backend::File { path, .. } = &self.inner.backend {
            Self::write_file(path, &working).await?;
        }
        *cache = working;

        Ok(out)
    }

    // =========================================================================
    // Stack lifecycle
    // =========================================================================

    /// Create the stack record for a new deployment and lay out its phases.
    ///
    /// An existing stack may only be re-initialized once it has been rolled
    /// back; that starts a fresh deployment generation.
    pub async fn init(
        &self,
        stack: &StackName,
        deployment_type: DeploymentType,
    ) -> Result<(), StateError> {
        self.mutate(Some(stack), |doc| {
            let now = Utc::now();
            let existing = doc.stacks.get(stack).map(|record| record.status);
            if let Some(state) = existing
                && state != DeploymentState::RolledBack
            {
                return Err(StateError::StackExists {
                    stack: stack.to_string(),
                    state,
                });
            }

            let record = doc
                .stacks
                .entry(stack.clone())
                .or_insert_with(|| StackRecord::new(now));
            if existing.is_some() {
                record.status = DeploymentState::Initializing;
                record.variables.clear();
                record.rollback = None;
            }

            record.deployment_type = Some(deployment_type);
            record.phases = deployment_type
                .phases()
                .into_iter()
                .map(|phase| PhaseEntry {
                    phase,
                    status: PhaseStatus::Pending,
                    updated: None,
                })
                .collect();
            record.deployments.push(DeploymentRecord {
                id: format!("{}-{}", stack, now.format("%Y%m%d%H%M%S")),
                deployment_type,
                started: now,
                finished: None,
                outcome: None,
            });

            Ok(((), format!("stack initialized for {deployment_type} deployment")))
        })
        .await
    }

    /// Move a stack to `state`. Returns the previous state.
    ///
    /// Setting the state a stack is already in is a no-op; any other move must
    /// be an edge of the lifecycle graph.
    pub async fn set_state(
        &self,
        stack: &StackName,
        state: DeploymentState,
        details: Option<&str>,
    ) -> Result<DeploymentState, StateError> {
        let current = self.get_state(stack).await?;
        if current == state && current != DeploymentState::NotFound {
            return Ok(current);
        }

        let previous = self
            .mutate(Some(stack), |doc| {
                let record = doc
                    .stacks
                    .get_mut(stack)
                    .ok_or_else(|| StateError::StackNotFound(stack.to_string()))?;

                let from = record.status;
                if from != state && !from.can_transition_to(state) {
                    return Err(StateError::InvalidTransition {
                        stack: stack.to_string(),
                        from,
                        to: state,
                    });
                }
                record.status = state;

                let note = match details {
                    Some(details) => format!("state {from} -> {state}: {details}"),
                    None => format!("state {from} -> {state}"),
                };
                Ok((from, note))
            })
            .await?;

        tracing::info!(stack = %stack, "State {} -> {}", previous, state);
        Ok(previous)
    }

    /// Current state, or `NotFound` for unknown stacks.
    pub async fn get_state(&self, stack: &StackName) -> Result<DeploymentState, StateError> {
        self.read(|doc| {
            doc.stacks
                .get(stack)
                .map(|record| record.status)
                .unwrap_or(DeploymentState::NotFound)
        })
        .await
    }

    pub async fn stack(&self, stack: &StackName) -> Result<Option<StackRecord>, StateError> {
        self.read(|doc| doc.stacks.get(stack).cloned()).await
    }

    pub async fn require_stack(&self, stack: &StackName) -> Result<StackRecord, StateError> {
        self.stack(stack)
            .await?
            .ok_or_else(|| StateError::StackNotFound(stack.to_string()))
    }

    pub async fn stack_names(&self) -> Result<Vec<StackName>, StateError> {
        self.read(|doc| doc.stacks.keys().cloned().collect()).await
    }

    /// History entries for one stack, oldest first.
    pub async fn history(&self, stack: &StackName) -> Result<Vec<HistoryEntry>, StateError> {
        self.read(|doc| {
            doc.history
                .iter()
                .filter(|entry| entry.stack.as_ref() == Some(stack))
                .cloned()
                .collect()
        })
        .await
    }

    pub async fn set_phase_status(
        &self,
        stack: &StackName,
        phase: Phase,
        status: PhaseStatus,
    ) -> Result<(), StateError> {
        self.mutate(Some(stack), |doc| {
            let record = stack_mut(doc, stack)?;
            let now = Some(Utc::now());
            match record.phases.iter_mut().find(|entry| entry.phase == phase) {
                Some(entry) => {
                    entry.status = status;
                    entry.updated = now;
                }
                None => record.phases.push(PhaseEntry {
                    phase,
                    status,
                    updated: now,
                }),
            }
            Ok(((), format!("phase {phase} -> {status}")))
        })
        .await
    }

    /// Close the running deployment record with its outcome.
    pub async fn finish_deployment(
        &self,
        stack: &StackName,
        outcome: DeploymentState,
    ) -> Result<(), StateError> {
        self.mutate(Some(stack), |doc| {
            let record = stack_mut(doc, stack)?;
            if let Some(deployment) = record.current_deployment_mut() {
                deployment.finished = Some(Utc::now());
                deployment.outcome = Some(outcome);
            }
            Ok(((), format!("deployment finished: {outcome}")))
        })
        .await
    }

    pub async fn begin_rollback(
        &self,
        stack: &StackName,
        record: RollbackRecord,
    ) -> Result<(), StateError> {
        self.mutate(Some(stack), |doc| {
            let details = format!(
                "rollback started: mode={} reason={}",
                record.mode, record.trigger_reason
            );
            stack_mut(doc, stack)?.rollback = Some(record);
            Ok(((), details))
        })
        .await
    }

    pub async fn finish_rollback(
        &self,
        stack: &StackName,
        succeeded: bool,
        failure_reason: Option<String>,
    ) -> Result<(), StateError> {
        self.mutate(Some(stack), |doc| {
            let record = stack_mut(doc, stack)?;
            if let Some(rollback) = record.rollback.as_mut() {
                rollback.finished = Some(Utc::now());
                rollback.succeeded = Some(succeeded);
                rollback.failure_reason = failure_reason.clone();
            }
            let details = match failure_reason {
                Some(reason) => format!("rollback failed: {reason}"),
                None => "rollback succeeded".to_string(),
            };
            Ok(((), details))
        })
        .await
    }

    /// Remove a stack from the document after snapshotting it.
    pub async fn delete_stack(&self, stack: &StackName) -> Result<SnapshotId, StateError> {
        let snapshot_id = self.snapshot(Some(stack), SnapshotKind::StateDelete).await?;
        self.mutate(Some(stack), |doc| {
            doc.stacks
                .remove(stack)
                .ok_or_else(|| StateError::StackNotFound(stack.to_string()))?;
            Ok(((), format!("stack deleted (snapshot {snapshot_id})")))
        })
        .await?;
        tracing::info!(stack = %stack, "Stack state deleted, snapshot {}", snapshot_id);
        Ok(snapshot_id)
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Store a resource record, replacing any record of the same kind.
    pub async fn put_resource(
        &self,
        stack: &StackName,
        record: ResourceRecord,
    ) -> Result<(), StateError> {
        self.mutate(Some(stack), |doc| {
            let details = format!(
                "resource registered: {} [{}]",
                record.kind,
                join_ids(&record.ids)
            );
            stack_mut(doc, stack)?
                .resources
                .insert(record.kind, record);
            Ok(((), details))
        })
        .await
    }

    /// Add one id to a multi-valued resource kind, creating the record if needed.
    pub async fn append_resource_id(
        &self,
        stack: &StackName,
        kind: ResourceKind,
        id: ResourceId,
        metadata: serde_json::Value,
    ) -> Result<(), StateError> {
        if !kind.is_multi_valued() {
            return Err(StateError::NotMultiValued(kind));
        }
        self.mutate(Some(stack), |doc| {
            let details = format!("resource registered: {kind} [{id}]");
            let resources = &mut stack_mut(doc, stack)?.resources;
            match resources.get_mut(&kind) {
                Some(record) => {
                    if !record.ids.contains(&id) {
                        record.ids.push(id);
                    }
                }
                None => {
                    resources.insert(kind, ResourceRecord::new(kind, id, metadata));
                }
            }
            Ok(((), details))
        })
        .await
    }

    /// Drop the record for `kind`. Returns the removed record, if any.
    pub async fn delete_resource(
        &self,
        stack: &StackName,
        kind: ResourceKind,
    ) -> Result<Option<ResourceRecord>, StateError> {
        self.mutate(Some(stack), |doc| {
            let removed = stack_mut(doc, stack)?.resources.remove(&kind);
            Ok((removed, format!("resource removed: {kind}")))
        })
        .await
    }

    /// Drop one id from a record; the record goes away with its last id.
    /// Returns whether the id was present.
    pub async fn remove_resource_id(
        &self,
        stack: &StackName,
        kind: ResourceKind,
        id: &ResourceId,
    ) -> Result<bool, StateError> {
        self.mutate(Some(stack), |doc| {
            let resources = &mut stack_mut(doc, stack)?.resources;
            let mut found = false;
            if let Some(record) = resources.get_mut(&kind) {
                let before = record.ids.len();
                record.ids.retain(|existing| existing != id);
                found = record.ids.len() != before;
                if record.ids.is_empty() {
                    resources.remove(&kind);
                }
            }
            Ok((found, format!("resource removed: {kind} [{id}]")))
        })
        .await
    }

    /// Resource records for a stack in teardown order. Unknown stacks have none.
    pub async fn list_resources(&self, stack: &StackName) -> Result<Vec<ResourceRecord>, StateError> {
        self.read(|doc| {
            doc.stacks
                .get(stack)
                .map(|record| record.resources.values().cloned().collect())
                .unwrap_or_default()
        })
        .await
    }

    // =========================================================================
    // Variables
    // =========================================================================

    /// Set a registered variable. The value is type-checked and validated on
    /// every write.
    pub async fn set_variable(
        &self,
        scope: &Scope,
        name: &str,
        value: impl Into<VarValue>,
    ) -> Result<(), StateError> {
        let def = self.inner.variables.require(name)?;
        let value = def.check(value.into())?;

        self.mutate(scope.stack(), |doc| {
            let details = format!("variable {name} = {value}");
            let target = match scope {
                Scope::Global => &mut doc.variables,
                Scope::Stack(stack) => &mut stack_mut(doc, stack)?.variables,
            };
            target.insert(name.to_string(), value);
            Ok(((), details))
        })
        .await
    }

    /// Read a registered variable: stack value, then global value, then the
    /// declared default.
    pub async fn get_variable(
        &self,
        scope: &Scope,
        name: &str,
    ) -> Result<Option<VarValue>, StateError> {
        let def = self.inner.variables.require(name)?;
        let stored = self
            .read(|doc| {
                let stack_value = scope
                    .stack()
                    .and_then(|stack| doc.stacks.get(stack))
                    .and_then(|record| record.variables.get(name));
                stack_value.or_else(|| doc.variables.get(name)).cloned()
            })
            .await?;
        Ok(stored.or(def.default))
    }

    /// Every registered variable resolved for a stack, in one read.
    pub async fn resolve_variables(
        &self,
        stack: &StackName,
    ) -> Result<BTreeMap<String, VarValue>, StateError> {
        let names = self.inner.variables.names();
        let (stack_vars, global_vars) = self
            .read(|doc| {
                let stack_vars = doc
                    .stacks
                    .get(stack)
                    .map(|record| record.variables.clone())
                    .unwrap_or_default();
                (stack_vars, doc.variables.clone())
            })
            .await?;

        let mut resolved = BTreeMap::new();
        for name in names {
            let value = stack_vars
                .get(&name)
                .or_else(|| global_vars.get(&name))
                .cloned()
                .or_else(|| self.inner.variables.get(&name).and_then(|def| def.default));
            if let Some(value) = value {
                resolved.insert(name, value);
            }
        }
        Ok(resolved)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Capture one stack (or every stack) to the snapshot store.
    pub async fn snapshot(
        &self,
        stack: Option<&StackName>,
        kind: SnapshotKind,
    ) -> Result<SnapshotId, StateError> {
        let now = Utc::now();
        let snapshot = self
            .read(|doc| {
                let stacks: BTreeMap<StackName, StackCapture> = match stack {
                    Some(name) => {
                        let record = doc
                            .stacks
                            .get(name)
                            .ok_or_else(|| StateError::StackNotFound(name.to_string()))?;
                        BTreeMap::from([(name.clone(), StackCapture::from(record))])
                    }
                    None => doc
                        .stacks
                        .iter()
                        .map(|(name, record)| (name.clone(), StackCapture::from(record)))
                        .collect(),
                };
                Ok::<_, StateError>(Snapshot {
                    id: Snapshot::make_id(stack, kind, now),
                    stack: stack.cloned(),
                    kind,
                    created: now,
                    stacks,
                    global_variables: doc.variables.clone(),
                })
            })
            .await??;

        self.inner.snapshots.save(snapshot).await
    }

    /// Put back the resources and variables captured in a snapshot.
    ///
    /// Lifecycle state and rollback bookkeeping of existing stacks are left
    /// alone; a stack absent from the document is recreated as captured.
    pub async fn restore(
        &self,
        id: &SnapshotId,
        stack: Option<&StackName>,
    ) -> Result<(), StateError> {
        let snapshot = self.inner.snapshots.load(id).await?;

        let targets: Vec<(StackName, StackCapture)> = match stack {
            Some(name) => {
                let capture = snapshot.stacks.get(name).cloned().ok_or_else(|| {
                    StateError::SnapshotMissingStack {
                        snapshot: id.to_string(),
                        stack: name.to_string(),
                    }
                })?;
                vec![(name.clone(), capture)]
            }
            None => snapshot.stacks.clone().into_iter().collect(),
        };

        self.mutate(stack, |doc| {
            let now = Utc::now();
            for (name, capture) in targets {
                let record = doc.stacks.entry(name).or_insert_with(|| {
                    let mut record = StackRecord::new(now);
                    record.status = capture.status;
                    record.deployment_type = capture.deployment_type;
                    record.phases = capture.phases.clone();
                    record
                });
                record.resources = capture.resources;
                record.variables = capture.variables;
            }
            if stack.is_none() {
                doc.variables = snapshot.global_variables;
            }
            Ok(((), format!("restored from snapshot {id}")))
        })
        .await?;

        tracing::info!("Restored snapshot {}", id);
        Ok(())
    }
}

fn stack_mut<'a>(
    doc: &'a mut StateDocument,
    stack: &StackName,
) -> Result<&'a mut StackRecord, StateError> {
    doc.stacks
        .get_mut(stack)
        .ok_or_else(|| StateError::StackNotFound(stack.to_string()))
}

fn join_ids(ids: &[ResourceId]) -> String {
    ids.iter()
        .map(ResourceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::variables::{HEALTH_STATUS, DEPLOYMENT_TIMEOUT};

    fn store() -> StateStore {
        StateStore::in_memory(Arc::new(VariableRegistry::with_builtins()))
    }

    fn name(s: &str) -> StackName {
        StackName::new(s).unwrap()
    }

    #[tokio::test]
    async fn unknown_stack_reads_as_not_found() {
        let store = store();
        assert_eq!(
            store.get_state(&name("ghost")).await.unwrap(),
            DeploymentState::NotFound
        );
    }

    #[tokio::test]
    async fn init_lays_out_pending_phases() {
        let store = store();
        let stack = name("web-prod");
        store.init(&stack, DeploymentType::Alb).await.unwrap();

        let record = store.require_stack(&stack).await.unwrap();
        assert_eq!(record.status, DeploymentState::Initializing);
        assert_eq!(record.phases.len(), 3);
        assert!(record.phases.iter().all(|p| p.status == PhaseStatus::Pending));
        assert_eq!(record.deployments.len(), 1);
    }

    #[tokio::test]
    async fn init_refuses_live_stack() {
        let store = store();
        let stack = name("web-prod");
        store.init(&stack, DeploymentType::Spot).await.unwrap();
        let err = store.init(&stack, DeploymentType::Spot).await.unwrap_err();
        assert!(matches!(err, StateError::StackExists { .. }));
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_and_not_recorded() {
        let store = store();
        let stack = name("web-prod");
        store.init(&stack, DeploymentType::Spot).await.unwrap();
        let before = store.history(&stack).await.unwrap().len();

        let err = store
            .set_state(&stack, DeploymentState::RolledBack, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        assert_eq!(store.history(&stack).await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn every_mutation_appends_history() {
        let store = store();
        let stack = name("web-prod");
        store.init(&stack, DeploymentType::Spot).await.unwrap();
        store
            .set_state(&stack, DeploymentState::InProgress, Some("phases running"))
            .await
            .unwrap();
        store
            .set_variable(&Scope::from(&stack), HEALTH_STATUS, "HEALTHY")
            .await
            .unwrap();

        let history = store.history(&stack).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].state, Some(DeploymentState::InProgress));
        assert!(history[1].details.contains("phases running"));
    }

    #[tokio::test]
    async fn unregistered_variable_cannot_be_set() {
        let store = store();
        let err = store
            .set_variable(&Scope::Global, "NOT_DECLARED", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Variable(_)));
    }

    #[tokio::test]
    async fn variable_reads_fall_back_to_global_then_default() {
        let store = store();
        let stack = name("web-prod");
        store.init(&stack, DeploymentType::Spot).await.unwrap();
        let scope = Scope::from(&stack);

        assert_eq!(
            store.get_variable(&scope, DEPLOYMENT_TIMEOUT).await.unwrap(),
            Some(VarValue::Integer(1800))
        );

        store
            .set_variable(&Scope::Global, DEPLOYMENT_TIMEOUT, 600i64)
            .await
            .unwrap();
        assert_eq!(
            store.get_variable(&scope, DEPLOYMENT_TIMEOUT).await.unwrap(),
            Some(VarValue::Integer(600))
        );

        store
            .set_variable(&scope, DEPLOYMENT_TIMEOUT, 60i64)
            .await
            .unwrap();
        assert_eq!(
            store.get_variable(&scope, DEPLOYMENT_TIMEOUT).await.unwrap(),
            Some(VarValue::Integer(60))
        );
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(VariableRegistry::with_builtins());
        let stack = name("web-prod");

        {
            let store = StateStore::open(dir.path(), registry.clone()).await.unwrap();
            store.init(&stack, DeploymentType::Cdn).await.unwrap();
            store
                .put_resource(
                    &stack,
                    ResourceRecord::new(
                        ResourceKind::Cloudfront,
                        ResourceId::new("E123"),
                        serde_json::Value::Null,
                    ),
                )
                .await
                .unwrap();
        }

        let reopened = StateStore::open(dir.path(), registry).await.unwrap();
        let resources = reopened.list_resources(&stack).await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind, ResourceKind::Cloudfront);
        assert!(!dir.path().join("state.json.lock").exists());
    }

    #[tokio::test]
    async fn writes_from_another_handle_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(VariableRegistry::with_builtins());
        let stack = name("web-prod");

        let deployer = StateStore::open(dir.path(), registry.clone()).await.unwrap();
        let monitor = StateStore::open(dir.path(), registry).await.unwrap();

        deployer.init(&stack, DeploymentType::Spot).await.unwrap();
        monitor
            .set_variable(&Scope::from(&stack), HEALTH_STATUS, "CRITICAL")
            .await
            .unwrap();
        deployer
            .set_state(&stack, DeploymentState::InProgress, None)
            .await
            .unwrap();

        assert_eq!(
            deployer
                .get_variable(&Scope::from(&stack), HEALTH_STATUS)
                .await
                .unwrap(),
            Some(VarValue::from("CRITICAL"))
        );
    }

    #[tokio::test]
    async fn delete_stack_snapshots_first() {
        let store = store();
        let stack = name("web-prod");
        store.init(&stack, DeploymentType::Spot).await.unwrap();

        let snapshot_id = store.delete_stack(&stack).await.unwrap();
        assert_eq!(
            store.get_state(&stack).await.unwrap(),
            DeploymentState::NotFound
        );

        let snapshot = store.snapshots().load(&snapshot_id).await.unwrap();
        assert_eq!(snapshot.kind, SnapshotKind::StateDelete);
        assert!(snapshot.stacks.contains_key(&stack));
    }
}
