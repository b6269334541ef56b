// ABOUTME: Rollback command implementation.
// ABOUTME: Tears a stack down in the requested mode and summarises the report.

use super::context::{orchestrator, stack_name};
use stackroll::config::Config;
use stackroll::error::{Error, Result};
use stackroll::orchestrator::RunOptions;
use stackroll::output::Output;
use stackroll::rollback::{DeletionOutcome, RollbackMode};

/// Roll a stack back on operator request.
pub async fn rollback(
    config: Config,
    stack: &str,
    mode: &str,
    reason: &str,
    force: bool,
    mut output: Output,
) -> Result<()> {
    let stack = stack_name(stack)?;
    let mode: RollbackMode = mode.parse().map_err(Error::RollbackMode)?;

    output.start_timer();
    output.progress(&format!("Rolling back {stack} ({mode})"));

    let orchestrator = orchestrator(config).await?;
    let report = orchestrator
        .rollback(&stack, mode, reason, RunOptions { force_lock: force })
        .await?;

    for warning in &report.warnings {
        output.warning(warning);
    }
    output.document(&report);

    for resource in &report.resources {
        let mark = match resource.outcome {
            DeletionOutcome::Deleted | DeletionOutcome::AlreadyGone => "✓",
            DeletionOutcome::Retained => "-",
            DeletionOutcome::Failed | DeletionOutcome::TimedOut => "✗",
        };
        output.progress(&format!("  {mark} {} {}", resource.kind, resource.id));
    }
    for leftover in &report.leftovers {
        output.progress(&format!("  ! still present: {leftover}"));
    }

    if report.succeeded {
        output.success(&format!("Rolled back {stack}"));
        Ok(())
    } else {
        Err(Error::RollbackIncomplete(stack.to_string()))
    }
}
