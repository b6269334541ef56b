// ABOUTME: Test support utilities.
// ABOUTME: Provides a scriptable in-memory cloud provider and orchestrator builders.

use std::sync::{Arc, Once};
use std::time::Duration;

use stackroll::config::{Config, EnvValue};
use stackroll::orchestrator::Orchestrator;
use stackroll::rollback::{RollbackEngine, RollbackMetrics};
use stackroll::state::{StateStore, VariableRegistry};
use stackroll::trigger::TriggerEvaluator;
use stackroll::types::StackName;

// Each test binary only uses some of these modules, so allow dead_code.
#[allow(dead_code)]
pub mod fake_provider;

#[allow(unused_imports)]
pub use fake_provider::{Call, FakeProvider};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("stackroll=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A config that passes provider validation without touching the environment.
#[allow(dead_code)]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.provider.region = Some("us-test-1".to_string());
    config.provider.credentials = Some(EnvValue::Literal("test-key".to_string()));
    config.provider.call_timeout = Duration::from_secs(3600);
    config
}

#[allow(dead_code)]
pub fn stack(name: &str) -> StackName {
    StackName::new(name).unwrap()
}

#[allow(dead_code)]
pub fn memory_store() -> StateStore {
    StateStore::in_memory(Arc::new(VariableRegistry::with_builtins()))
}

/// Everything a test needs to drive and inspect one orchestrator.
#[allow(dead_code)]
pub struct Harness {
    pub store: StateStore,
    pub provider: Arc<FakeProvider>,
    pub orchestrator: Orchestrator,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with_provider(config, FakeProvider::new())
    }

    pub fn with_provider(config: Config, provider: FakeProvider) -> Self {
        let store = memory_store();
        let provider = Arc::new(provider);
        let evaluator = Arc::new(TriggerEvaluator::with_builtins(store.clone()));
        let orchestrator = Orchestrator::new(
            config,
            store.clone(),
            provider.clone(),
            evaluator,
            Arc::new(RollbackMetrics::new()),
        );
        Self {
            store,
            provider,
            orchestrator,
        }
    }
}

/// A rollback engine over a memory store and a fake provider.
#[allow(dead_code)]
pub fn engine(config: &Config, store: &StateStore, provider: &Arc<FakeProvider>) -> RollbackEngine {
    RollbackEngine::new(
        store.clone(),
        provider.clone(),
        config.rollback.clone(),
        Arc::new(RollbackMetrics::new()),
    )
    .with_call_timeout(config.provider.call_timeout)
}
