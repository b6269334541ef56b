// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use super::Deployment;
use super::error::DeployError;
use super::monitor::TriggerMonitor;
use super::phases;
use super::runner::Orchestrator;
use super::state::{Completed, Initialized, Interrupted, Provisioned};
use crate::diagnostics::Diagnostics;
use crate::rollback::{RollbackEngine, RollbackMode, RollbackReport};
use crate::state::DeploymentState;

/// Result type for transitions that hand the deployment back on failure.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

/// Trigger reason recorded when a phase failure starts the rollback.
pub const DEPLOYMENT_FAILURE: &str = "deployment_failure";

enum PhaseOutcome {
    Done(Result<(), DeployError>),
    Triggered(String),
}

// =============================================================================
// Initialized -> Provisioned | Interrupted
// =============================================================================

impl Deployment<Initialized> {
    /// Run every phase of the deployment type in order.
    ///
    /// Each phase races the trigger monitor; a fired trigger abandons the
    /// phase in flight. The first failing phase short-circuits the rest.
    pub async fn execute_phases(
        self,
        ctx: &Orchestrator,
        monitor: &mut TriggerMonitor,
        diag: &mut Diagnostics,
    ) -> Result<Deployment<Provisioned>, Deployment<Interrupted>> {
        if let Err(e) = ctx
            .store
            .set_state(&self.stack, DeploymentState::InProgress, Some("executing phases"))
            .await
        {
            // The monitor's first tick can beat us to the state change.
            if let Some(fired) = monitor.fired_now() {
                tracing::warn!(stack = %self.stack, "Trigger {} fired before phases started", fired.name);
                return Err(self.transition(Interrupted {
                    cause: DeployError::Triggered {
                        trigger: fired.name.clone(),
                    }
                    .to_string(),
                    trigger: Some(fired.name),
                }));
            }
            let cause = format!("could not start phases: {e}");
            return Err(self.transition(Interrupted {
                cause,
                trigger: None,
            }));
        }

        for phase in self.deployment_type.phases() {
            let outcome = tokio::select! {
                biased;
                fired = monitor.fired() => PhaseOutcome::Triggered(fired.name),
                result = phases::run_phase(ctx, &self.stack, self.deployment_type, phase, diag) => {
                    PhaseOutcome::Done(result)
                }
            };

            match outcome {
                PhaseOutcome::Done(Ok(())) => {}
                PhaseOutcome::Done(Err(e)) => {
                    return Err(self.transition(Interrupted {
                        cause: e.to_string(),
                        trigger: None,
                    }));
                }
                PhaseOutcome::Triggered(name) => {
                    tracing::warn!(stack = %self.stack, "{} phase abandoned, trigger {} fired", phase, name);
                    return Err(self.transition(Interrupted {
                        cause: DeployError::Triggered {
                            trigger: name.clone(),
                        }
                        .to_string(),
                        trigger: Some(name),
                    }));
                }
            }
        }

        Ok(self.transition(Provisioned))
    }
}

// =============================================================================
// Provisioned -> Completed | Interrupted
// =============================================================================

impl Deployment<Provisioned> {
    /// Mark the stack completed.
    ///
    /// # Errors
    ///
    /// Hands the deployment back if the state store refuses the transition,
    /// so the caller can still roll it back.
    #[must_use = "deployment state must be used"]
    pub async fn complete(self, ctx: &Orchestrator) -> TransitionResult<Completed, Provisioned> {
        match ctx
            .store
            .set_state(&self.stack, DeploymentState::Completed, None)
            .await
        {
            Ok(_) => {
                tracing::info!(stack = %self.stack, "Deployment completed");
                Ok(self.transition(Completed))
            }
            Err(e) => Err((self, e.into())),
        }
    }

    /// Abandon a fully provisioned deployment.
    pub fn interrupt(self, cause: impl Into<String>, trigger: Option<String>) -> Deployment<Interrupted> {
        self.transition(Interrupted {
            cause: cause.into(),
            trigger,
        })
    }
}

// =============================================================================
// Interrupted -> rolled back
// =============================================================================

impl Deployment<Interrupted> {
    /// The reason handed to the rollback engine: the trigger name, or
    /// `deployment_failure` for a phase failure.
    pub fn trigger_reason(&self) -> &str {
        self.state.trigger.as_deref().unwrap_or(DEPLOYMENT_FAILURE)
    }

    /// Tear down whatever this deployment created.
    pub async fn rollback(
        self,
        engine: &RollbackEngine,
        mode: RollbackMode,
    ) -> Result<RollbackReport, DeployError> {
        tracing::warn!(
            stack = %self.stack,
            "Rolling back after: {}",
            self.state.cause
        );
        let report = engine
            .rollback(
                &self.stack,
                Some(self.deployment_type),
                mode,
                self.trigger_reason(),
            )
            .await?;
        Ok(report)
    }
}

// =============================================================================
// Completed
// =============================================================================

impl Deployment<Completed> {
    /// Consume the deployment.
    pub fn finish(self) -> crate::types::StackName {
        self.stack
    }
}
