// ABOUTME: The rollback engine: compensating teardown of a stack's resources.
// ABOUTME: Snapshot, mark rolling back, delete by mode with retries, verify, report.

use chrono::Utc;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::report::{DeletionOutcome, ResourceOutcome, RollbackReport};
use super::{RetryPolicy, RollbackError, RollbackMetrics, RollbackMode};
use crate::config::{ProviderConfig, RollbackConfig};
use crate::diagnostics::{Diagnostics, Warning};
use crate::provider::{CloudProvider, ResourceStatus, with_timeout};
use crate::registry::ResourceRegistry;
use crate::state::{
    self, CleanupDirective, DeploymentState, PhaseStatus, ResourceRecord, RollbackRecord, Scope,
    SnapshotKind, StackRecord, StateError, StateStore,
};
use crate::types::{
    Component, DeploymentType, Phase, ResourceId, ResourceKind, Settle, SnapshotId, StackName,
};

/// Result of the deletion stage, before verification.
struct Teardown {
    effective_mode: RollbackMode,
    outcomes: Vec<ResourceOutcome>,
    /// Kinds verification should look at; `None` means the whole stack.
    scope: Option<BTreeSet<ResourceKind>>,
    /// Set when emergency mode ran out of time.
    timed_out: Option<String>,
}

/// Tears stacks down. Shares the state store, provider handle, and metrics
/// with the orchestrator; holds no per-stack state of its own.
pub struct RollbackEngine {
    store: StateStore,
    registry: ResourceRegistry,
    provider: Arc<dyn CloudProvider>,
    config: RollbackConfig,
    /// Bound on each provider call.
    call_timeout: Duration,
    metrics: Arc<RollbackMetrics>,
    report_dir: Option<PathBuf>,
}

impl RollbackEngine {
    pub fn new(
        store: StateStore,
        provider: Arc<dyn CloudProvider>,
        config: RollbackConfig,
        metrics: Arc<RollbackMetrics>,
    ) -> Self {
        Self {
            registry: ResourceRegistry::new(store.clone()),
            store,
            provider,
            config,
            call_timeout: ProviderConfig::default().call_timeout,
            metrics,
            report_dir: None,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Write a JSON report for every rollback into `dir`.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn metrics(&self) -> &Arc<RollbackMetrics> {
        &self.metrics
    }

    /// Roll a stack back.
    ///
    /// `Err` means rollback could not start (nothing was deleted) or the state
    /// store failed. A rollback that ran but left resources behind returns
    /// `Ok` with `succeeded == false`; it is never retried automatically.
    pub async fn rollback(
        &self,
        stack: &StackName,
        deployment_type: Option<DeploymentType>,
        mode: RollbackMode,
        trigger_reason: &str,
    ) -> Result<RollbackReport, RollbackError> {
        let started = Utc::now();
        let clock = Instant::now();
        let mut diag = Diagnostics::default();

        tracing::info!(stack = %stack, "Starting {} rollback ({})", mode, trigger_reason);

        let pre_rollback_snapshot = match self
            .store
            .snapshot(Some(stack), SnapshotKind::PreRollback)
            .await
        {
            Ok(id) => Some(id),
            Err(StateError::StackNotFound(_)) => {
                return Err(RollbackError::InitializationFailed {
                    stack: stack.to_string(),
                    reason: "stack not found".to_string(),
                });
            }
            Err(e) => {
                diag.warn(Warning::snapshot(format!("pre-rollback snapshot failed: {e}")));
                None
            }
        };

        let record = self
            .initialize(stack, mode, trigger_reason, started, &mut diag)
            .await?;
        let deployment_type = deployment_type.or(record.deployment_type);

        if record.status != DeploymentState::RollingBack {
            self.store
                .set_state(stack, DeploymentState::RollingBack, Some(trigger_reason))
                .await?;
        }

        let teardown = match mode {
            RollbackMode::Full => self.full(stack, mode, &mut diag).await?,
            RollbackMode::Partial => self.partial(stack, &mut diag).await?,
            RollbackMode::Incremental => self.incremental(stack, &record, &mut diag).await?,
            RollbackMode::Emergency => self.emergency(stack).await?,
        };

        self.store
            .set_state(stack, DeploymentState::Verifying, None)
            .await?;
        let leftovers = self.verify(stack, &teardown).await?;

        let failure_reason = match (&teardown.timed_out, leftovers.is_empty()) {
            (Some(reason), _) => Some(reason.clone()),
            (None, false) => Some(format!(
                "verification found {} remaining resource(s): {}",
                leftovers.len(),
                leftovers.join(", ")
            )),
            (None, true) => None,
        };
        let succeeded = failure_reason.is_none();

        let mut post_rollback_snapshot = None;
        if succeeded {
            if teardown.effective_mode != RollbackMode::Partial {
                self.mark_phases_rolled_back(stack).await?;
            }
            post_rollback_snapshot = self
                .snapshot_or_warn(stack, SnapshotKind::PostRollback, &mut diag)
                .await;
            self.store
                .set_state(stack, DeploymentState::RolledBack, None)
                .await?;
            tracing::info!(stack = %stack, "Rollback complete");
        } else {
            self.store
                .set_state(stack, DeploymentState::Failed, failure_reason.as_deref())
                .await?;
            tracing::error!(
                stack = %stack,
                "Rollback failed: {}",
                failure_reason.as_deref().unwrap_or_default()
            );
        }
        self.store
            .finish_rollback(stack, succeeded, failure_reason.clone())
            .await?;

        let duration = clock.elapsed();
        match &failure_reason {
            None => self.metrics.record_success(mode, duration),
            Some(reason) => self.metrics.record_failure(mode, duration, reason),
        }

        let mut report = RollbackReport {
            stack: stack.clone(),
            deployment_type,
            requested_mode: mode,
            effective_mode: teardown.effective_mode,
            trigger_reason: trigger_reason.to_string(),
            started,
            finished: Utc::now(),
            duration_secs: duration.as_secs_f64(),
            resources: teardown.outcomes,
            leftovers,
            succeeded,
            failure_reason,
            warnings: Vec::new(),
            pre_rollback_snapshot,
            post_rollback_snapshot,
        };

        if let Some(ref dir) = self.report_dir {
            match report.write(dir).await {
                Ok(path) => tracing::info!("Rollback report written to {}", path.display()),
                Err(e) => diag.warn(Warning::report(format!(
                    "failed to write rollback report: {e}"
                ))),
            }
        }
        report.warnings = diag.into_warnings();

        Ok(report)
    }

    /// Load the stack, take the backup snapshot, and record the rollback start.
    async fn initialize(
        &self,
        stack: &StackName,
        mode: RollbackMode,
        trigger_reason: &str,
        started: chrono::DateTime<Utc>,
        diag: &mut Diagnostics,
    ) -> Result<StackRecord, RollbackError> {
        let record = self.store.stack(stack).await.map_err(|e| {
            RollbackError::InitializationFailed {
                stack: stack.to_string(),
                reason: e.to_string(),
            }
        })?;
        let Some(record) = record else {
            return Err(RollbackError::InitializationFailed {
                stack: stack.to_string(),
                reason: "stack not found".to_string(),
            });
        };

        if record.status != DeploymentState::RollingBack
            && !record.status.can_transition_to(DeploymentState::RollingBack)
        {
            return Err(RollbackError::NotRollbackable {
                stack: stack.to_string(),
                state: record.status,
            });
        }

        self.snapshot_or_warn(stack, SnapshotKind::Backup, diag)
            .await;

        self.store
            .begin_rollback(
                stack,
                RollbackRecord {
                    mode: mode.to_string(),
                    trigger_reason: trigger_reason.to_string(),
                    started,
                    finished: None,
                    succeeded: None,
                    failure_reason: None,
                },
            )
            .await
            .map_err(|e| RollbackError::InitializationFailed {
                stack: stack.to_string(),
                reason: e.to_string(),
            })?;

        Ok(record)
    }

    async fn snapshot_or_warn(
        &self,
        stack: &StackName,
        kind: SnapshotKind,
        diag: &mut Diagnostics,
    ) -> Option<SnapshotId> {
        match self.store.snapshot(Some(stack), kind).await {
            Ok(id) => Some(id),
            Err(e) => {
                diag.warn(Warning::snapshot(format!("{kind} snapshot failed: {e}")));
                None
            }
        }
    }

    // =========================================================================
    // Modes
    // =========================================================================

    async fn full(
        &self,
        stack: &StackName,
        effective_mode: RollbackMode,
        diag: &mut Diagnostics,
    ) -> Result<Teardown, RollbackError> {
        let outcomes = self.teardown_kinds(stack, None, diag).await?;
        Ok(Teardown {
            effective_mode,
            outcomes,
            scope: None,
            timed_out: None,
        })
    }

    /// Only the components listed in `FAILED_COMPONENTS`; full when none are listed.
    async fn partial(
        &self,
        stack: &StackName,
        diag: &mut Diagnostics,
    ) -> Result<Teardown, RollbackError> {
        let listed = self
            .store
            .get_variable(&Scope::from(stack), state::FAILED_COMPONENTS)
            .await?
            .and_then(|value| value.as_list().map(<[String]>::to_vec))
            .unwrap_or_default();

        let mut kinds = BTreeSet::new();
        for name in &listed {
            match name.parse::<Component>() {
                Ok(component) => kinds.extend(component.kinds()),
                Err(e) => diag.warn(Warning::mode_fallback(format!(
                    "ignoring {}: {e}",
                    state::FAILED_COMPONENTS
                ))),
            }
        }

        if kinds.is_empty() {
            diag.warn(Warning::mode_fallback(format!(
                "partial rollback of {stack} has no failed components recorded; rolling back everything"
            )));
            return self.full(stack, RollbackMode::Full, diag).await;
        }

        tracing::info!(stack = %stack, "Partial rollback of {}", listed.join(", "));
        let outcomes = self.teardown_kinds(stack, Some(&kinds), diag).await?;
        Ok(Teardown {
            effective_mode: RollbackMode::Partial,
            outcomes,
            scope: Some(kinds),
            timed_out: None,
        })
    }

    /// Phases in reverse deployment order, skipping phases that never started.
    async fn incremental(
        &self,
        stack: &StackName,
        record: &StackRecord,
        diag: &mut Diagnostics,
    ) -> Result<Teardown, RollbackError> {
        let recorded: Vec<Phase> = self
            .store
            .get_variable(&Scope::from(stack), state::DEPLOYMENT_PHASES)
            .await?
            .and_then(|value| value.as_list().map(<[String]>::to_vec))
            .unwrap_or_default()
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        let phases = if recorded.is_empty() {
            record.phases.iter().map(|entry| entry.phase).collect()
        } else {
            recorded
        };

        let mut outcomes = Vec::new();
        for phase in phases.into_iter().rev() {
            let status = record.phase_status(phase).unwrap_or(PhaseStatus::Pending);
            if !status.needs_rollback() {
                tracing::debug!(stack = %stack, "Skipping {} phase ({})", phase, status);
                continue;
            }

            tracing::info!(stack = %stack, "Rolling back {} phase", phase);
            let kinds: BTreeSet<ResourceKind> = phase
                .components()
                .iter()
                .flat_map(Component::kinds)
                .collect();
            let phase_outcomes = self.teardown_kinds(stack, Some(&kinds), diag).await?;
            if phase_outcomes.iter().all(|o| o.outcome.is_success()) {
                self.store
                    .set_phase_status(stack, phase, PhaseStatus::RolledBack)
                    .await?;
            }
            outcomes.extend(phase_outcomes);
        }

        Ok(Teardown {
            effective_mode: RollbackMode::Incremental,
            outcomes,
            scope: None,
            timed_out: None,
        })
    }

    /// Everything concurrently, one attempt each, no settle waits, bounded by
    /// the emergency timeout. Deletions still running at the deadline are left
    /// to finish on their own and the rollback is reported failed.
    async fn emergency(&self, stack: &StackName) -> Result<Teardown, RollbackError> {
        let targets: Vec<(ResourceKind, ResourceId)> = self
            .registry
            .list(stack)
            .await?
            .into_iter()
            .flat_map(|record| {
                let kind = record.kind;
                record.ids.into_iter().map(move |id| (kind, id))
            })
            .collect();

        tracing::warn!(
            stack = %stack,
            "Emergency rollback of {} resource(s), timeout {:?}",
            targets.len(),
            self.config.emergency_timeout
        );

        let finished = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .map(|(kind, id)| {
                let provider = Arc::clone(&self.provider);
                let finished = Arc::clone(&finished);
                let call_timeout = self.call_timeout;
                tokio::spawn(async move {
                    let deleted =
                        with_timeout(call_timeout, "deprovision", provider.deprovision(kind, &id))
                            .await;
                    let (outcome, error) = match deleted {
                        Ok(()) => (DeletionOutcome::Deleted, None),
                        Err(e) if e.is_not_found() => (DeletionOutcome::AlreadyGone, None),
                        Err(e) => {
                            tracing::warn!(kind = %kind, "Emergency delete of {} failed: {}", id, e);
                            (DeletionOutcome::Failed, Some(e.to_string()))
                        }
                    };
                    finished.lock().push(ResourceOutcome {
                        kind,
                        id,
                        attempts: 1,
                        outcome,
                        error,
                    });
                })
            })
            .collect();

        let timed_out = tokio::time::timeout(
            self.config.emergency_timeout,
            futures::future::join_all(handles),
        )
        .await
        .is_err();

        let mut outcomes = std::mem::take(&mut *finished.lock());
        for outcome in &outcomes {
            if outcome.outcome.is_success() {
                self.registry
                    .remove_member(stack, outcome.kind, &outcome.id)
                    .await?;
            }
        }

        let mut outstanding = 0;
        for (kind, id) in targets {
            if !outcomes.iter().any(|o| o.kind == kind && o.id == id) {
                outstanding += 1;
                outcomes.push(ResourceOutcome {
                    kind,
                    id,
                    attempts: 1,
                    outcome: DeletionOutcome::TimedOut,
                    error: Some("emergency timeout elapsed".to_string()),
                });
            }
        }
        outcomes.sort_by(|a, b| a.kind.cmp(&b.kind));

        Ok(Teardown {
            effective_mode: RollbackMode::Emergency,
            outcomes,
            scope: None,
            timed_out: timed_out.then(|| {
                format!(
                    "emergency timeout of {:?} elapsed with {} deletion(s) outstanding",
                    self.config.emergency_timeout, outstanding
                )
            }),
        })
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete registered resources in teardown order, optionally limited to
    /// `kinds`. A failed resource never stops its siblings from being tried.
    async fn teardown_kinds(
        &self,
        stack: &StackName,
        kinds: Option<&BTreeSet<ResourceKind>>,
        diag: &mut Diagnostics,
    ) -> Result<Vec<ResourceOutcome>, RollbackError> {
        let records: Vec<ResourceRecord> = self
            .registry
            .list(stack)
            .await?
            .into_iter()
            .filter(|record| kinds.is_none_or(|kinds| kinds.contains(&record.kind)))
            .collect();

        let policy = self.config.retry_policy();
        let mut outcomes = Vec::new();
        for record in records {
            for id in &record.ids {
                let outcome = match record.cleanup {
                    Some(CleanupDirective::Retain) => {
                        tracing::info!(kind = %record.kind, "Retaining {}", id);
                        ResourceOutcome {
                            kind: record.kind,
                            id: id.clone(),
                            attempts: 0,
                            outcome: DeletionOutcome::Retained,
                            error: None,
                        }
                    }
                    Some(CleanupDirective::Force) => {
                        self.delete_resource(record.kind, id, policy, false).await
                    }
                    None => self.delete_resource(record.kind, id, policy, true).await,
                };

                if outcome.outcome.is_success() {
                    self.registry.remove_member(stack, record.kind, id).await?;
                } else {
                    diag.warn(Warning::deletion(format!(
                        "{} {} not deleted after {} attempt(s): {}",
                        record.kind,
                        id,
                        outcome.attempts,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    )));
                }
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Delete one resource with retries, then wait for it to disappear when
    /// its kind deletes asynchronously.
    pub async fn delete_with_retry(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
        policy: RetryPolicy,
    ) -> ResourceOutcome {
        self.delete_resource(kind, id, policy, true).await
    }

    async fn delete_resource(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
        policy: RetryPolicy,
        settle: bool,
    ) -> ResourceOutcome {
        let provider = &self.provider;
        let call_timeout = self.call_timeout;
        let (result, attempts) = policy
            .run(|attempt| async move {
                tracing::info!(kind = %kind, attempt, "Deleting {}", id);
                let deleted =
                    with_timeout(call_timeout, "deprovision", provider.deprovision(kind, id)).await;
                match deleted {
                    Ok(()) => Ok(DeletionOutcome::Deleted),
                    Err(e) if e.is_not_found() => Ok(DeletionOutcome::AlreadyGone),
                    Err(e) => Err(e),
                }
            })
            .await;

        let (outcome, error) = match result {
            Ok(DeletionOutcome::Deleted) if settle && kind.settle() == Settle::AwaitGone => {
                match self.await_gone(kind, id).await {
                    Ok(()) => (DeletionOutcome::Deleted, None),
                    Err(reason) => (DeletionOutcome::Failed, Some(reason)),
                }
            }
            Ok(outcome) => (outcome, None),
            Err(e) => {
                tracing::error!(kind = %kind, "Giving up on {} after {} attempt(s): {}", id, attempts, e);
                (DeletionOutcome::Failed, Some(e.to_string()))
            }
        };

        ResourceOutcome {
            kind,
            id: id.clone(),
            attempts,
            outcome,
            error,
        }
    }

    async fn await_gone(&self, kind: ResourceKind, id: &ResourceId) -> Result<(), String> {
        let deadline = tokio::time::Instant::now() + self.config.settle_timeout;
        loop {
            let status =
                with_timeout(self.call_timeout, "describe", self.provider.describe(kind, id)).await;
            match status {
                Ok(ResourceStatus::Gone) => return Ok(()),
                Ok(ResourceStatus::Failed) => {
                    return Err(format!("provider reports deletion of {id} failed"));
                }
                Ok(status) => tracing::debug!(kind = %kind, "{} is {}", id, status),
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => tracing::debug!(kind = %kind, "describe {} failed: {}", id, e),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(format!(
                    "{id} still present {:?} after deletion",
                    self.config.settle_timeout
                ));
            }
            tokio::time::sleep(self.config.settle_interval).await;
        }
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Whatever is still registered (within scope) plus, for whole-stack
    /// rollbacks, anything the provider still finds by tag.
    async fn verify(
        &self,
        stack: &StackName,
        teardown: &Teardown,
    ) -> Result<Vec<String>, RollbackError> {
        let retained: Vec<&ResourceId> = teardown
            .outcomes
            .iter()
            .filter(|o| o.outcome == DeletionOutcome::Retained)
            .map(|o| &o.id)
            .collect();
        let retained = &retained;

        let mut leftovers: Vec<String> = self
            .registry
            .list(stack)
            .await?
            .into_iter()
            .filter(|record| {
                teardown
                    .scope
                    .as_ref()
                    .is_none_or(|scope| scope.contains(&record.kind))
            })
            .flat_map(move |record| {
                let kind = record.kind;
                record
                    .ids
                    .into_iter()
                    .filter(move |id| !retained.contains(&id))
                    .map(move |id| format!("{kind} {id}"))
            })
            .collect();

        if teardown.scope.is_none() && self.config.verify_tags {
            let tagged =
                with_timeout(self.call_timeout, "query-by-tag", self.provider.query_by_tag(stack))
                    .await;
            match tagged {
                Ok(arns) => leftovers.extend(
                    arns.into_iter()
                        .filter(|arn| !retained.iter().any(|id| arn.contains(id.as_str()))),
                ),
                Err(e) => leftovers.push(format!("tag query failed: {e}")),
            }
        }

        if !leftovers.is_empty() {
            tracing::warn!(stack = %stack, "Verification found leftovers: {}", leftovers.join(", "));
        }
        Ok(leftovers)
    }

    async fn mark_phases_rolled_back(&self, stack: &StackName) -> Result<(), RollbackError> {
        let Some(record) = self.store.stack(stack).await? else {
            return Ok(());
        };
        for entry in record.phases {
            if entry.status.needs_rollback() {
                self.store
                    .set_phase_status(stack, entry.phase, PhaseStatus::RolledBack)
                    .await?;
            }
        }
        Ok(())
    }
}
