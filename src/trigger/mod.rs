// ABOUTME: Prioritized rollback triggers evaluated against state store signals.
// ABOUTME: First satisfied trigger in ascending priority order wins the pass.

pub mod builtin;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::state::{self, DeploymentState, Scope, StateError, StateStore, VarValue};
use crate::types::StackName;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger already registered: {0}")]
    Duplicate(String),

    #[error("unknown trigger: {0}")]
    Unknown(String),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Everything a predicate may look at, read in one pass from the store.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub stack: StackName,
    pub state: DeploymentState,
    pub variables: BTreeMap<String, VarValue>,
    pub now: DateTime<Utc>,
}

impl TriggerContext {
    pub fn get(&self, name: &str) -> Option<&VarValue> {
        self.variables.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(VarValue::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(VarValue::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(VarValue::as_f64)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).and_then(VarValue::as_bool).unwrap_or(false)
    }
}

pub type Predicate = Arc<dyn Fn(&TriggerContext) -> bool + Send + Sync>;
pub type Callback = Arc<dyn Fn(&StackName, &str) + Send + Sync>;

/// What happens when a trigger fires.
#[derive(Clone, Default)]
pub enum TriggerAction {
    /// Hand the stack to the rollback engine.
    #[default]
    BeginRollback,
    /// Run a callback with `(stack, trigger name)`; no rollback is started.
    Callback(Callback),
}

impl fmt::Debug for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerAction::BeginRollback => f.write_str("BeginRollback"),
            TriggerAction::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Clone)]
struct Trigger {
    name: String,
    priority: u32,
    enabled: bool,
    predicate: Predicate,
    action: TriggerAction,
}

/// Outcome of a pass in which a trigger fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTrigger {
    pub name: String,
    pub priority: u32,
    pub begins_rollback: bool,
}

/// Trigger set shared by the monitor loop and the operator surface.
///
/// Constructed once per process and handed out by `Arc`.
pub struct TriggerEvaluator {
    store: StateStore,
    triggers: RwLock<Vec<Trigger>>,
}

impl fmt::Debug for TriggerEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerEvaluator")
            .field("triggers", &self.trigger_names())
            .finish()
    }
}

impl TriggerEvaluator {
    /// An evaluator with no triggers.
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            triggers: RwLock::new(Vec::new()),
        }
    }

    /// An evaluator with the built-in trigger set registered.
    pub fn with_builtins(store: StateStore) -> Self {
        let evaluator = Self::new(store);
        for (name, priority, predicate) in builtin::definitions() {
            // Names are distinct constants; registration into an empty set cannot collide.
            let _ = evaluator.insert(name, priority, predicate, TriggerAction::default());
        }
        evaluator
    }

    /// Add a trigger. Triggers with equal priority evaluate in registration order.
    pub fn register_trigger(
        &self,
        name: &str,
        priority: u32,
        predicate: impl Fn(&TriggerContext) -> bool + Send + Sync + 'static,
        action: TriggerAction,
    ) -> Result<(), TriggerError> {
        self.insert(name, priority, Arc::new(predicate), action)
    }

    fn insert(
        &self,
        name: &str,
        priority: u32,
        predicate: Predicate,
        action: TriggerAction,
    ) -> Result<(), TriggerError> {
        let mut triggers = self.triggers.write();
        if triggers.iter().any(|t| t.name == name) {
            return Err(TriggerError::Duplicate(name.to_string()));
        }

        let position = triggers
            .iter()
            .position(|t| t.priority > priority)
            .unwrap_or(triggers.len());
        triggers.insert(
            position,
            Trigger {
                name: name.to_string(),
                priority,
                enabled: true,
                predicate,
                action,
            },
        );
        tracing::debug!("Registered trigger {} (priority {})", name, priority);
        Ok(())
    }

    pub fn enable(&self, name: &str) -> Result<(), TriggerError> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> Result<(), TriggerError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), TriggerError> {
        let mut triggers = self.triggers.write();
        let trigger = triggers
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| TriggerError::Unknown(name.to_string()))?;
        trigger.enabled = enabled;
        Ok(())
    }

    /// Trigger names in evaluation order.
    pub fn trigger_names(&self) -> Vec<String> {
        self.triggers.read().iter().map(|t| t.name.clone()).collect()
    }

    /// Evaluate enabled triggers for a stack in ascending priority and fire
    /// the first whose predicate holds. Later triggers are not evaluated.
    ///
    /// Only deployments still moving forward are evaluated; a stack that is
    /// already rolling back or finished never fires.
    pub async fn check_triggers(
        &self,
        stack: &StackName,
        current: DeploymentState,
    ) -> Result<Option<FiredTrigger>, TriggerError> {
        if !current.is_active() {
            return Ok(None);
        }

        let triggers: Vec<Trigger> = self
            .triggers
            .read()
            .iter()
            .filter(|t| t.enabled)
            .cloned()
            .collect();
        if triggers.is_empty() {
            return Ok(None);
        }

        let context = TriggerContext {
            stack: stack.clone(),
            state: current,
            variables: self.store.resolve_variables(stack).await?,
            now: Utc::now(),
        };

        let Some(trigger) = triggers.into_iter().find(|t| (t.predicate)(&context)) else {
            return Ok(None);
        };

        tracing::warn!(stack = %stack, "Rollback trigger fired: {}", trigger.name);
        let begins_rollback = match &trigger.action {
            TriggerAction::BeginRollback => true,
            TriggerAction::Callback(callback) => {
                callback(stack, &trigger.name);
                false
            }
        };

        Ok(Some(FiredTrigger {
            name: trigger.name,
            priority: trigger.priority,
            begins_rollback,
        }))
    }

    /// Operator abort: raise the stack's `USER_ABORT` flag for the monitor.
    pub async fn request_abort(&self, stack: &StackName) -> Result<(), TriggerError> {
        self.store
            .set_variable(&Scope::from(stack), state::USER_ABORT, true)
            .await?;
        tracing::info!(stack = %stack, "Abort requested");
        Ok(())
    }
}
