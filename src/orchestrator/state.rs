// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: Markers enforce which deployment operations are reachable at compile time.

/// Stack state created, provider validated, signals seeded.
/// Available actions: `execute_phases()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Every phase provisioned.
/// Available actions: `complete()`, `interrupt()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Provisioned;

/// Deployment finished; the stack is `completed`.
/// Available actions: `finish()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Completed;

/// The forward path stopped early, by a phase failure or a trigger.
/// Available actions: `rollback()`
#[derive(Debug, Clone)]
pub struct Interrupted {
    pub(crate) cause: String,
    pub(crate) trigger: Option<String>,
}

impl Interrupted {
    /// Human-readable reason the deployment stopped.
    pub fn cause(&self) -> &str {
        &self.cause
    }

    /// Name of the trigger that stopped the deployment, if a trigger did.
    pub fn trigger(&self) -> Option<&str> {
        self.trigger.as_deref()
    }
}
