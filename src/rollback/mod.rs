// ABOUTME: Compensating teardown of deployed stacks.
// ABOUTME: Exports the engine, modes, retry policy, report, and metrics.

mod engine;
mod error;
mod metrics;
mod mode;
mod report;
mod retry;

pub use engine::RollbackEngine;
pub use error::RollbackError;
pub use metrics::{MetricsSnapshot, ModeCounts, RollbackMetrics};
pub use mode::RollbackMode;
pub use report::{DeletionOutcome, ResourceOutcome, RollbackReport};
pub use retry::RetryPolicy;
