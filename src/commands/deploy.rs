// ABOUTME: Deploy command implementation.
// ABOUTME: Runs the orchestrator and reports the final state, rollback included.

use super::context::{orchestrator, stack_name};
use stackroll::config::Config;
use stackroll::error::{Error, Result};
use stackroll::orchestrator::RunOptions;
use stackroll::output::Output;
use stackroll::state::DeploymentState;
use stackroll::types::DeploymentType;

/// Deploy a stack and report how it ended.
pub async fn deploy(
    config: Config,
    stack: &str,
    deployment_type: &str,
    force: bool,
    mut output: Output,
) -> Result<()> {
    let stack = stack_name(stack)?;
    let deployment_type: DeploymentType = deployment_type.parse()?;

    output.start_timer();
    output.progress(&format!(
        "Deploying {stack} ({deployment_type}): {}",
        deployment_type
            .phases()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" → ")
    ));

    let orchestrator = orchestrator(config).await?;
    let report = orchestrator
        .deploy(&stack, deployment_type, RunOptions { force_lock: force })
        .await?;

    for warning in &report.warnings {
        output.warning(warning);
    }
    output.document(&report);

    if report.succeeded() {
        output.progress(&format!("  ✓ {} resource(s) provisioned", report.resources));
        output.success(&format!("Deployed {stack}"));
        return Ok(());
    }

    if let Some(cause) = &report.cause {
        output.progress(&format!("  ✗ {cause}"));
    }
    if let Some(rollback) = &report.rollback {
        for failed in rollback.failed_resources() {
            output.progress(&format!(
                "  ✗ {} {}: {}",
                failed.kind,
                failed.id,
                failed.error.as_deref().unwrap_or("deletion failed")
            ));
        }
        output.progress(&format!(
            "  → Rolled back with mode {} ({} resource(s))",
            rollback.effective_mode,
            rollback.resources.len()
        ));
    }

    match report.final_state {
        DeploymentState::RolledBack => Err(Error::DeploymentFailed {
            stack: stack.to_string(),
            state: report.final_state.to_string(),
        }),
        _ => Err(Error::RollbackIncomplete(stack.to_string())),
    }
}
