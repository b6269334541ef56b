// ABOUTME: Wiring shared by the CLI commands.
// ABOUTME: Opens the on-disk state store and assembles an orchestrator over the exec provider.

use std::sync::Arc;

use stackroll::config::Config;
use stackroll::error::Result;
use stackroll::orchestrator::Orchestrator;
use stackroll::provider::ExecProvider;
use stackroll::rollback::RollbackMetrics;
use stackroll::state::{StateStore, VariableRegistry};
use stackroll::trigger::TriggerEvaluator;
use stackroll::types::StackName;

pub async fn open_store(config: &Config) -> Result<StateStore> {
    let variables = Arc::new(VariableRegistry::with_builtins());
    Ok(StateStore::open(&config.state_dir, variables).await?)
}

pub async fn orchestrator(config: Config) -> Result<Orchestrator> {
    let validated = config.provider.validate()?;
    let provider = ExecProvider::from_config(&config.provider, &validated)?;
    let store = open_store(&config).await?;
    let evaluator = Arc::new(TriggerEvaluator::with_builtins(store.clone()));

    Ok(Orchestrator::new(
        config,
        store,
        Arc::new(provider),
        evaluator,
        Arc::new(RollbackMetrics::new()),
    )
    .with_state_dir_layout())
}

pub fn stack_name(raw: &str) -> Result<StackName> {
    Ok(StackName::new(raw)?)
}
