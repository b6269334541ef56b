// ABOUTME: The orchestrator service: deploy, manual rollback, and status queries.
// ABOUTME: Holds the shared store, provider, trigger evaluator, and rollback engine.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::Deployment;
use super::error::DeployError;
use super::monitor::TriggerMonitor;
use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::lock::LockFile;
use crate::provider::CloudProvider;
use crate::registry::ResourceRegistry;
use crate::rollback::{RollbackEngine, RollbackMetrics, RollbackMode, RollbackReport};
use crate::state::{
    DeploymentRecord, DeploymentState, PhaseEntry, ResourceRecord, RollbackRecord, StateStore,
};
use crate::trigger::TriggerEvaluator;
use crate::types::{DeploymentType, StackName};

/// Options for a single deploy or manual rollback.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Break an existing stack lock.
    pub force_lock: bool,
}

/// What a deploy call ended with.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub stack: StackName,
    pub deployment_type: DeploymentType,
    pub final_state: DeploymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub resources: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    pub duration_secs: f64,
}

impl DeployReport {
    pub fn succeeded(&self) -> bool {
        self.final_state == DeploymentState::Completed
    }
}

/// Everything an operator sees for one stack.
#[derive(Debug, Clone, Serialize)]
pub struct StackStatus {
    pub stack: StackName,
    pub state: DeploymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<DeploymentType>,
    pub phases: Vec<PhaseEntry>,
    pub resources: Vec<ResourceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_deployment: Option<DeploymentRecord>,
}

/// Drives deployments forward and hands failures to the rollback engine.
///
/// Built once per process. Every collaborator is passed in; nothing is
/// looked up from global state.
pub struct Orchestrator {
    pub(crate) config: Config,
    pub(crate) store: StateStore,
    pub(crate) registry: ResourceRegistry,
    pub(crate) provider: Arc<dyn CloudProvider>,
    pub(crate) evaluator: Arc<TriggerEvaluator>,
    pub(crate) engine: RollbackEngine,
    pub(crate) deployment_dir: Option<PathBuf>,
    lock_dir: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        store: StateStore,
        provider: Arc<dyn CloudProvider>,
        evaluator: Arc<TriggerEvaluator>,
        metrics: Arc<RollbackMetrics>,
    ) -> Self {
        let engine = RollbackEngine::new(
            store.clone(),
            Arc::clone(&provider),
            config.rollback.clone(),
            metrics,
        )
        .with_call_timeout(config.provider.call_timeout);
        Self {
            registry: ResourceRegistry::new(store.clone()),
            config,
            store,
            provider,
            evaluator,
            engine,
            deployment_dir: None,
            lock_dir: None,
        }
    }

    /// Keep stack locks, deployment manifests, and rollback reports under
    /// the configured state directory.
    pub fn with_state_dir_layout(mut self) -> Self {
        self.lock_dir = Some(self.config.lock_dir());
        self.deployment_dir = Some(self.config.deployments_dir());
        self.engine = self.engine.with_report_dir(self.config.report_dir());
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn engine(&self) -> &RollbackEngine {
        &self.engine
    }

    pub fn evaluator(&self) -> &Arc<TriggerEvaluator> {
        &self.evaluator
    }

    fn lock_stack(
        &self,
        stack: &StackName,
        options: RunOptions,
    ) -> Result<Option<LockFile>, DeployError> {
        let Some(ref dir) = self.lock_dir else {
            return Ok(None);
        };
        let lock = LockFile::try_acquire(
            &dir.join(format!("{stack}.lock")),
            stack.as_str(),
            options.force_lock,
            LockFile::stack_stale_after(),
        )?;
        Ok(Some(lock))
    }

    fn release(lock: Option<LockFile>, diag: &mut Diagnostics) {
        if let Some(lock) = lock
            && let Err(e) = lock.release()
        {
            diag.warn(Warning::lock_release(e.to_string()));
        }
    }

    /// Deploy a stack end to end.
    ///
    /// `Err` is reserved for failures before any resource was touched
    /// (configuration, lock, state) or a rollback that could not start.
    /// A deployment that failed and was rolled back returns `Ok` with
    /// `final_state` `rolled_back` (or `failed` if the rollback failed).
    pub async fn deploy(
        &self,
        stack: &StackName,
        deployment_type: DeploymentType,
        options: RunOptions,
    ) -> Result<DeployReport, DeployError> {
        let clock = Instant::now();
        let mut diag = Diagnostics::default();

        let lock = self.lock_stack(stack, options)?;
        let result = self.deploy_locked(stack, deployment_type, &mut diag).await;
        Self::release(lock, &mut diag);

        let mut report = result?;
        report.resources = self.registry.list(stack).await?.len();
        report.warnings = diag.into_warnings();
        report.duration_secs = clock.elapsed().as_secs_f64();
        Ok(report)
    }

    async fn deploy_locked(
        &self,
        stack: &StackName,
        deployment_type: DeploymentType,
        diag: &mut Diagnostics,
    ) -> Result<DeployReport, DeployError> {
        let deployment = Deployment::initialize(self, stack, deployment_type).await?;

        let mut monitor = TriggerMonitor::spawn(
            stack.clone(),
            self.store.clone(),
            Arc::clone(&self.evaluator),
            self.config.deployment.monitor_interval,
        );
        let executed = deployment.execute_phases(self, &mut monitor, diag).await;
        let fired = monitor.stop().await;

        let interrupted = match executed {
            Ok(provisioned) => match fired {
                Some(fired) => provisioned.interrupt(
                    DeployError::Triggered {
                        trigger: fired.name.clone(),
                    }
                    .to_string(),
                    Some(fired.name),
                ),
                None => match provisioned.complete(self).await {
                    Ok(completed) => {
                        self.store
                            .finish_deployment(stack, DeploymentState::Completed)
                            .await?;
                        return Ok(DeployReport {
                            stack: completed.finish(),
                            deployment_type,
                            final_state: DeploymentState::Completed,
                            cause: None,
                            resources: 0,
                            rollback: None,
                            warnings: Vec::new(),
                            duration_secs: 0.0,
                        });
                    }
                    Err((provisioned, e)) => provisioned.interrupt(e.to_string(), None),
                },
            },
            Err(interrupted) => interrupted,
        };

        let cause = interrupted.state().cause().to_string();
        let report = interrupted
            .rollback(&self.engine, self.config.deployment.rollback_mode)
            .await?;

        let final_state = if report.succeeded {
            DeploymentState::RolledBack
        } else {
            DeploymentState::Failed
        };
        self.store.finish_deployment(stack, final_state).await?;

        Ok(DeployReport {
            stack: stack.clone(),
            deployment_type,
            final_state,
            cause: Some(cause),
            resources: 0,
            rollback: Some(report),
            warnings: Vec::new(),
            duration_secs: 0.0,
        })
    }

    /// Operator-requested rollback of a stack, under the stack lock.
    pub async fn rollback(
        &self,
        stack: &StackName,
        mode: RollbackMode,
        reason: &str,
        options: RunOptions,
    ) -> Result<RollbackReport, DeployError> {
        let mut diag = Diagnostics::default();
        let lock = self.lock_stack(stack, options)?;
        let result = self.engine.rollback(stack, None, mode, reason).await;
        Self::release(lock, &mut diag);

        let mut report = result?;
        report.warnings.extend(diag.into_warnings());
        Ok(report)
    }

    pub async fn status(&self, stack: &StackName) -> Result<StackStatus, DeployError> {
        let record = self.store.require_stack(stack).await?;
        Ok(StackStatus {
            stack: stack.clone(),
            state: record.status,
            deployment_type: record.deployment_type,
            phases: record.phases,
            resources: record.resources.into_values().collect(),
            rollback: record.rollback,
            last_deployment: record.deployments.last().cloned(),
        })
    }
}
