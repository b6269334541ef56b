// ABOUTME: Per-stack inspection and signalling commands.
// ABOUTME: Implements status, abort, and signal without touching the provider.

use super::context::{open_store, stack_name};
use stackroll::config::Config;
use stackroll::error::Result;
use stackroll::output::Output;
use stackroll::state::Scope;
use stackroll::trigger::TriggerEvaluator;

pub async fn status(config: Config, stack: &str, output: Output) -> Result<()> {
    let stack = stack_name(stack)?;
    let store = open_store(&config).await?;
    let record = store.require_stack(&stack).await?;

    output.document(&record);

    let kind = record
        .deployment_type
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());
    output.success(&format!("{stack}: {} ({kind})", record.status));
    for entry in &record.phases {
        output.progress(&format!("  phase {:<16} {}", entry.phase.to_string(), entry.status));
    }
    for resource in record.resources.values() {
        let ids = resource
            .ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        output.progress(&format!("  {:<18} {ids}", resource.kind.to_string()));
    }
    if let Some(rollback) = &record.rollback {
        output.progress(&format!(
            "  last rollback: {} ({})",
            rollback.mode, rollback.trigger_reason
        ));
    }
    Ok(())
}

/// Raise the user-abort flag; the running deployment's monitor picks it up.
pub async fn abort(config: Config, stack: &str, output: Output) -> Result<()> {
    let stack = stack_name(stack)?;
    let store = open_store(&config).await?;
    store.require_stack(&stack).await?;

    TriggerEvaluator::new(store).request_abort(&stack).await?;
    output.success(&format!("Abort requested for {stack}"));
    Ok(())
}

pub async fn signal(
    config: Config,
    stack: &str,
    variable: &str,
    value: &str,
    output: Output,
) -> Result<()> {
    let stack = stack_name(stack)?;
    let store = open_store(&config).await?;

    let def = store.variables().require(variable)?;
    let value = def.var_type.parse_value(value)?;
    store
        .set_variable(&Scope::Stack(stack.clone()), variable, value.clone())
        .await?;

    output.success(&format!("{stack}: {variable} = {value}"));
    Ok(())
}
