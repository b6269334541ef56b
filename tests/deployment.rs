// ABOUTME: End-to-end orchestrator tests against the in-memory provider.
// ABOUTME: Covers successful deploys, phase failures, trigger interrupts, and locking.

mod support;

use chrono::{TimeDelta, Utc};
use stackroll::config::{ConfigError, EnvValue};
use stackroll::diagnostics::Diagnostics;
use stackroll::lock::LockFile;
use stackroll::orchestrator::{
    DEPLOYMENT_FAILURE, DeployError, DeployErrorKind, Deployment, RunOptions, TriggerMonitor,
};
use stackroll::provider::ResourceStatus;
use stackroll::rollback::{DeletionOutcome, RollbackMode};
use stackroll::state::{self, DeploymentState, PhaseStatus, Scope, VarValue};
use stackroll::trigger::builtin;
use stackroll::types::{DeploymentType, Phase, ResourceKind};
use std::time::Duration;
use support::{FakeProvider, Harness, stack, test_config};

fn position(order: &[(ResourceKind, String)], kind: ResourceKind) -> usize {
    order
        .iter()
        .position(|(k, _)| *k == kind)
        .unwrap_or_else(|| panic!("{kind} was never deprovisioned"))
}

mod success {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spot_deploy_completes_and_registers_resources() {
        let harness = Harness::new(test_config());
        let name = stack("web-prod");

        let report = harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.final_state, DeploymentState::Completed);
        assert!(report.rollback.is_none());
        // vpc, internet gateway, two subnets, security group, role, instance
        assert_eq!(
            harness.provider.provisioned(),
            vec![
                ResourceKind::Vpc,
                ResourceKind::InternetGateway,
                ResourceKind::Subnet,
                ResourceKind::Subnet,
                ResourceKind::SecurityGroup,
                ResourceKind::IamRole,
                ResourceKind::Ec2Instance,
            ]
        );

        let status = harness.orchestrator.status(&name).await.unwrap();
        assert_eq!(status.state, DeploymentState::Completed);
        assert!(
            status
                .phases
                .iter()
                .all(|entry| entry.status == PhaseStatus::Completed)
        );
        let subnets = status
            .resources
            .iter()
            .find(|r| r.kind == ResourceKind::Subnet)
            .unwrap();
        assert_eq!(subnets.ids.len(), 2);
        assert_eq!(
            status.last_deployment.unwrap().outcome,
            Some(DeploymentState::Completed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_provision_failure_is_retried() {
        let provider = FakeProvider::new().fail_provision_times(
            ResourceKind::Vpc,
            "RequestLimitExceeded",
            1,
        );
        let harness = Harness::with_provider(test_config(), provider);
        let name = stack("web-prod");

        let report = harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.final_state, DeploymentState::Completed);
        assert!(report.rollback.is_none());
        assert_eq!(harness.provider.provision_attempts(ResourceKind::Vpc), 2);
        assert!(harness.provider.deprovisioned().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn history_follows_the_forward_path() {
        let harness = Harness::new(test_config());
        let name = stack("web-prod");

        harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();

        let states: Vec<DeploymentState> = harness
            .store
            .history(&name)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|entry| entry.state)
            .collect();
        let mut transitions = states.clone();
        transitions.dedup();
        assert_eq!(
            transitions,
            vec![
                DeploymentState::Initializing,
                DeploymentState::InProgress,
                DeploymentState::Completed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_deploy_points_cdn_at_the_load_balancer() {
        let harness = Harness::new(test_config());
        let name = stack("edge");

        let report = harness
            .orchestrator
            .deploy(&name, DeploymentType::Full, RunOptions::default())
            .await
            .unwrap();

        assert!(report.succeeded());
        let provisioned = harness.provider.provisioned();
        let alb = provisioned
            .iter()
            .position(|k| *k == ResourceKind::Alb)
            .unwrap();
        let cdn = provisioned
            .iter()
            .position(|k| *k == ResourceKind::Cloudfront)
            .unwrap();
        assert!(alb < cdn);
        assert_eq!(provisioned.last(), Some(&ResourceKind::Cloudfront));
    }

    #[tokio::test(start_paused = true)]
    async fn seeds_trigger_variables_for_the_stack() {
        let harness = Harness::new(test_config());
        let name = stack("web-prod");

        harness
            .orchestrator
            .deploy(&name, DeploymentType::Alb, RunOptions::default())
            .await
            .unwrap();

        let scope = Scope::from(&name);
        let phases = harness
            .store
            .get_variable(&scope, state::DEPLOYMENT_PHASES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            phases.as_list().unwrap(),
            &["infrastructure", "alb", "compute"]
        );
        let timeout = harness
            .store
            .get_variable(&scope, state::DEPLOYMENT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(timeout, Some(VarValue::Integer(1800)));
        assert!(
            harness
                .store
                .get_variable(&scope, state::DEPLOYMENT_START_TIME)
                .await
                .unwrap()
                .is_some()
        );
    }
}

mod failures {
    use super::*;

    /// alb deployment whose instance never provisions.
    #[tokio::test(start_paused = true)]
    async fn compute_failure_rolls_back_everything_in_reverse() {
        let provider =
            FakeProvider::new().fail_provision(ResourceKind::Ec2Instance, "InsufficientCapacity");
        let harness = Harness::with_provider(test_config(), provider);
        let name = stack("web-prod");

        let report = harness
            .orchestrator
            .deploy(&name, DeploymentType::Alb, RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.final_state, DeploymentState::RolledBack);
        assert!(report.cause.as_deref().unwrap().contains("InsufficientCapacity"));
        assert_eq!(
            harness.provider.provision_attempts(ResourceKind::Ec2Instance),
            3
        );

        let rollback = report.rollback.unwrap();
        assert!(rollback.succeeded);
        assert_eq!(rollback.trigger_reason, DEPLOYMENT_FAILURE);
        assert_eq!(rollback.effective_mode, RollbackMode::Full);
        assert!(harness.provider.live().is_empty());

        let order = harness.provider.deprovisioned();
        assert!(position(&order, ResourceKind::Alb) < position(&order, ResourceKind::TargetGroup));
        assert!(
            position(&order, ResourceKind::TargetGroup)
                < position(&order, ResourceKind::SecurityGroup)
        );
        assert!(position(&order, ResourceKind::Subnet) < position(&order, ResourceKind::Vpc));
        assert_eq!(order.last().unwrap().0, ResourceKind::Vpc);

        let failed = harness
            .store
            .get_variable(&Scope::from(&name), state::FAILED_COMPONENTS)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.as_list().unwrap(), &["instances"]);
        assert_eq!(
            harness.store.get_state(&name).await.unwrap(),
            DeploymentState::RolledBack
        );
        let status = harness.orchestrator.status(&name).await.unwrap();
        assert!(status.resources.is_empty());
        assert_eq!(status.rollback.unwrap().succeeded, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_phase_unwinds_its_own_resources_first() {
        let provider = FakeProvider::new().fail_provision(ResourceKind::IamRole, "AccessDenied");
        let harness = Harness::with_provider(test_config(), provider);
        let name = stack("web-prod");

        let report = harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.final_state, DeploymentState::RolledBack);
        // Inline cleanup removed the whole phase, so the engine had nothing left.
        assert!(report.rollback.unwrap().resources.is_empty());
        assert!(harness.provider.live().is_empty());
        assert_eq!(
            harness
                .store
                .require_stack(&name)
                .await
                .unwrap()
                .phase_status(Phase::Infrastructure),
            Some(PhaseStatus::RolledBack)
        );
        assert!(
            !harness
                .provider
                .provisioned()
                .contains(&ResourceKind::Ec2Instance)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn instance_that_never_becomes_ready_fails_compute() {
        let provider =
            FakeProvider::new().describe_as(ResourceKind::Ec2Instance, ResourceStatus::Failed);
        let harness = Harness::with_provider(test_config(), provider);
        let name = stack("web-prod");

        let report = harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.final_state, DeploymentState::RolledBack);
        assert!(report.cause.unwrap().contains("not ready"));
        assert!(harness.provider.live().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_failure_leaves_stack_failed() {
        let provider = FakeProvider::new()
            .fail_provision(ResourceKind::Ec2Instance, "InsufficientCapacity")
            .always_fail_deprovision(ResourceKind::SecurityGroup);
        let harness = Harness::with_provider(test_config(), provider);
        let name = stack("web-prod");

        let report = harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.final_state, DeploymentState::Failed);
        let rollback = report.rollback.unwrap();
        assert!(!rollback.succeeded);
        let failed: Vec<_> = rollback.failed_resources().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind, ResourceKind::SecurityGroup);
        assert_eq!(failed[0].attempts, 3);
        // Siblings were still torn down.
        assert_eq!(harness.provider.live().len(), 1);
        assert_eq!(report.resources, 1);
        assert_eq!(
            harness.store.get_state(&name).await.unwrap(),
            DeploymentState::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn incremental_mode_rolls_back_started_phases_only() {
        let mut config = test_config();
        config.deployment.rollback_mode = RollbackMode::Incremental;
        let provider =
            FakeProvider::new().fail_provision(ResourceKind::TargetGroup, "LimitExceeded");
        let harness = Harness::with_provider(config, provider);
        let name = stack("web-prod");

        let report = harness
            .orchestrator
            .deploy(&name, DeploymentType::Alb, RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.final_state, DeploymentState::RolledBack);
        assert!(harness.provider.live().is_empty());

        let record = harness.store.require_stack(&name).await.unwrap();
        assert_eq!(record.phase_status(Phase::Alb), Some(PhaseStatus::RolledBack));
        assert_eq!(
            record.phase_status(Phase::Infrastructure),
            Some(PhaseStatus::RolledBack)
        );
        // Compute never started and stays pending.
        assert_eq!(record.phase_status(Phase::Compute), Some(PhaseStatus::Pending));
    }
}

mod triggers {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn health_signal_interrupts_slow_phase() {
        let provider =
            FakeProvider::new().slow_provision(ResourceKind::Ec2Instance, Duration::from_secs(600));
        let harness = Harness::with_provider(test_config(), provider);
        let name = stack("web-prod");
        let store = harness.store.clone();

        let signaller = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            store
                .set_variable(&Scope::from(&name), state::HEALTH_STATUS, "CRITICAL")
                .await
                .unwrap();
        };
        let (report, ()) = tokio::join!(
            harness
                .orchestrator
                .deploy(&name, DeploymentType::Spot, RunOptions::default()),
            signaller
        );
        let report = report.unwrap();

        assert_eq!(report.final_state, DeploymentState::RolledBack);
        assert!(report.cause.unwrap().contains(builtin::HEALTH_FAILURE));
        let rollback = report.rollback.unwrap();
        assert_eq!(rollback.trigger_reason, builtin::HEALTH_FAILURE);
        assert!(rollback.succeeded);
        assert!(harness.provider.live().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn user_abort_wins_over_lower_priority_signals() {
        let provider =
            FakeProvider::new().slow_provision(ResourceKind::Ec2Instance, Duration::from_secs(600));
        let harness = Harness::with_provider(test_config(), provider);
        let name = stack("web-prod");
        let store = harness.store.clone();
        let evaluator = harness.orchestrator.evaluator().clone();

        let signaller = async {
            tokio::time::sleep(Duration::from_secs(45)).await;
            store
                .set_variable(&Scope::from(&name), state::VALIDATION_STATUS, "FAILED")
                .await
                .unwrap();
            evaluator.request_abort(&name).await.unwrap();
        };
        let (report, ()) = tokio::join!(
            harness
                .orchestrator
                .deploy(&name, DeploymentType::Spot, RunOptions::default()),
            signaller
        );

        let rollback = report.unwrap().rollback.unwrap();
        assert_eq!(rollback.trigger_reason, builtin::USER_ABORT);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_fired_before_the_first_phase_names_the_rollback() {
        let harness = Harness::new(test_config());
        let name = stack("web-prod");
        let orchestrator = &harness.orchestrator;

        let deployment = Deployment::initialize(orchestrator, &name, DeploymentType::Spot)
            .await
            .unwrap();
        orchestrator.evaluator().request_abort(&name).await.unwrap();
        let mut monitor = TriggerMonitor::spawn(
            name.clone(),
            harness.store.clone(),
            orchestrator.evaluator().clone(),
            Duration::from_secs(30),
        );
        // The first tick is immediate.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            harness.store.get_state(&name).await.unwrap(),
            DeploymentState::RollingBack
        );

        let mut diag = Diagnostics::default();
        let executed = deployment
            .execute_phases(orchestrator, &mut monitor, &mut diag)
            .await;
        monitor.stop().await;

        let interrupted = match executed {
            Ok(_) => panic!("phases ran after user_abort fired"),
            Err(interrupted) => interrupted,
        };
        assert_eq!(interrupted.trigger_reason(), builtin::USER_ABORT);
        assert!(harness.provider.provisioned().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_start_time_fires_deployment_timeout() {
        let provider =
            FakeProvider::new().slow_provision(ResourceKind::Ec2Instance, Duration::from_secs(600));
        let harness = Harness::with_provider(test_config(), provider);
        let name = stack("web-prod");
        let store = harness.store.clone();

        let signaller = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let long_ago = (Utc::now() - TimeDelta::hours(2)).timestamp();
            store
                .set_variable(&Scope::from(&name), state::DEPLOYMENT_START_TIME, long_ago)
                .await
                .unwrap();
        };
        let (report, ()) = tokio::join!(
            harness
                .orchestrator
                .deploy(&name, DeploymentType::Spot, RunOptions::default()),
            signaller
        );

        let rollback = report.unwrap().rollback.unwrap();
        assert_eq!(rollback.trigger_reason, builtin::DEPLOYMENT_TIMEOUT);
    }
}

mod preconditions {
    use super::*;

    #[tokio::test]
    async fn missing_credentials_touch_nothing() {
        let mut config = test_config();
        config.provider.credentials = Some(EnvValue::Literal("   ".to_string()));
        let harness = Harness::new(config);
        let name = stack("web-prod");

        let err = harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DeployErrorKind::Configuration);
        assert!(matches!(
            err,
            DeployError::Config(ConfigError::MissingCredentials)
        ));
        assert!(harness.provider.calls().is_empty());
        assert_eq!(
            harness.store.get_state(&name).await.unwrap(),
            DeploymentState::NotFound
        );
    }

    #[tokio::test]
    async fn cdn_deploy_requires_an_origin() {
        let harness = Harness::new(test_config());
        let name = stack("edge");

        let err = harness
            .orchestrator
            .deploy(&name, DeploymentType::Cdn, RunOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DeployErrorKind::Configuration);
        assert!(harness.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn cdn_deploy_uses_configured_origin() {
        let mut config = test_config();
        config.deployment.cdn_origin = Some("origin.example.com".to_string());
        let harness = Harness::new(config);

        let report = harness
            .orchestrator
            .deploy(&stack("edge"), DeploymentType::Cdn, RunOptions::default())
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(harness.provider.provisioned(), vec![ResourceKind::Cloudfront]);
    }

    #[tokio::test(start_paused = true)]
    async fn live_stack_cannot_be_redeployed() {
        let harness = Harness::new(test_config());
        let name = stack("web-prod");
        harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();

        let err = harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::Configuration);
    }

    #[tokio::test(start_paused = true)]
    async fn rolled_back_stack_can_be_redeployed() {
        let provider = FakeProvider::new().fail_provision(ResourceKind::IamRole, "AccessDenied");
        let harness = Harness::with_provider(test_config(), provider);
        let name = stack("web-prod");

        let first = harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();
        assert_eq!(first.final_state, DeploymentState::RolledBack);

        let second = harness
            .orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();
        assert_eq!(second.final_state, DeploymentState::RolledBack);

        let record = harness.store.require_stack(&name).await.unwrap();
        assert_eq!(record.deployments.len(), 2);
    }
}

mod locking {
    use super::*;
    use stackroll::orchestrator::Orchestrator;
    use stackroll::rollback::RollbackMetrics;
    use stackroll::trigger::TriggerEvaluator;
    use std::sync::Arc;

    fn orchestrator_in(dir: &std::path::Path) -> (Orchestrator, Arc<FakeProvider>) {
        let mut config = test_config();
        config.state_dir = dir.to_path_buf();
        let store = support::memory_store();
        let provider = Arc::new(FakeProvider::new());
        let orchestrator = Orchestrator::new(
            config,
            store.clone(),
            provider.clone(),
            Arc::new(TriggerEvaluator::with_builtins(store)),
            Arc::new(RollbackMetrics::new()),
        )
        .with_state_dir_layout();
        (orchestrator, provider)
    }

    #[tokio::test]
    async fn held_lock_blocks_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, provider) = orchestrator_in(dir.path());
        let name = stack("web-prod");

        let held = LockFile::try_acquire(
            &dir.path().join("locks").join("web-prod.lock"),
            "web-prod",
            false,
            LockFile::stack_stale_after(),
        )
        .unwrap();

        let err = orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::Lock);
        assert!(provider.calls().is_empty());

        held.release().unwrap();
    }

    #[tokio::test]
    async fn force_breaks_a_held_lock_and_releases_it_afterwards() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _provider) = orchestrator_in(dir.path());
        let name = stack("web-prod");
        let lock_path = dir.path().join("locks").join("web-prod.lock");

        let _held =
            LockFile::try_acquire(&lock_path, "web-prod", false, LockFile::stack_stale_after())
                .unwrap();

        let report = orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions { force_lock: true })
            .await
            .unwrap();
        assert!(report.succeeded());
        assert!(!lock_path.exists());
        assert!(
            dir.path()
                .join("deployments")
                .join("web-prod")
                .join("deployment.json")
                .exists()
        );
    }

    #[tokio::test]
    async fn manual_rollback_writes_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _provider) = orchestrator_in(dir.path());
        let name = stack("web-prod");

        orchestrator
            .deploy(&name, DeploymentType::Spot, RunOptions::default())
            .await
            .unwrap();
        let report = orchestrator
            .rollback(&name, RollbackMode::Full, "decommission", RunOptions::default())
            .await
            .unwrap();

        assert!(report.succeeded);
        assert!(report.resources.iter().all(|r| r.outcome == DeletionOutcome::Deleted));
        let written: Vec<_> = std::fs::read_dir(dir.path().join("reports"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with("web-prod_rollback_"));
    }
}
