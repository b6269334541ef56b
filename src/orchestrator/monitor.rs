// ABOUTME: Background trigger monitor that runs beside the forward deployment path.
// ABOUTME: Polls the evaluator, flips the stack to rolling_back on a hit, then exits.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::{DeploymentState, StateStore};
use crate::trigger::{FiredTrigger, TriggerEvaluator};
use crate::types::StackName;

/// Handle to a running monitor task.
///
/// The monitor must be stopped with [`TriggerMonitor::stop`] once the
/// deployment leaves the forward path; dropping the handle alone would let
/// the task outlive the deployment.
pub struct TriggerMonitor {
    stop: watch::Sender<bool>,
    fired: watch::Receiver<Option<FiredTrigger>>,
    handle: JoinHandle<()>,
}

impl TriggerMonitor {
    pub fn spawn(
        stack: StackName,
        store: StateStore,
        evaluator: Arc<TriggerEvaluator>,
        interval: Duration,
    ) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);
        let (fired_tx, fired) = watch::channel(None);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                let state = match store.get_state(&stack).await {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::warn!(stack = %stack, "Trigger monitor could not read state: {}", e);
                        continue;
                    }
                };
                if !state.is_active() {
                    tracing::debug!(stack = %stack, "Trigger monitor exiting, stack is {}", state);
                    break;
                }

                match evaluator.check_triggers(&stack, state).await {
                    Ok(Some(fired)) if fired.begins_rollback => {
                        // Publish first: a writer refused by rolling_back must
                        // find the trigger already set.
                        let details = format!("trigger {} fired", fired.name);
                        let _ = fired_tx.send(Some(fired));
                        if let Err(e) = store
                            .set_state(&stack, DeploymentState::RollingBack, Some(&details))
                            .await
                        {
                            tracing::error!(stack = %stack, "Failed to mark rollback: {}", e);
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(stack = %stack, "Trigger evaluation failed: {}", e);
                    }
                }
            }
        });

        Self {
            stop,
            fired,
            handle,
        }
    }

    /// Resolves once a rollback trigger has fired. Never resolves if the
    /// monitor exits without firing.
    pub async fn fired(&mut self) -> FiredTrigger {
        loop {
            if let Some(fired) = self.fired.borrow_and_update().clone() {
                return fired;
            }
            if self.fired.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// The trigger that has fired so far, without waiting.
    pub fn fired_now(&self) -> Option<FiredTrigger> {
        self.fired.borrow().clone()
    }

    /// Cancel the monitor and wait for it to exit. Returns the trigger that
    /// fired, if any.
    pub async fn stop(self) -> Option<FiredTrigger> {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("Trigger monitor task ended abnormally: {}", e);
        }
        self.fired.borrow().clone()
    }
}
