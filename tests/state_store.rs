// ABOUTME: Integration tests for the state store, snapshots, and lock files.
// ABOUTME: Includes property tests over the lifecycle transition table.

mod support;

use proptest::prelude::*;
use serde_json::json;
use stackroll::lock::{LockError, LockFile};
use stackroll::registry::ResourceRegistry;
use stackroll::state::{
    self, DeploymentState, STATE_FILENAME, Scope, SnapshotKind, StateError, StateStore, VarValue,
    VariableRegistry,
};
use stackroll::types::{DeploymentType, ResourceId, ResourceKind};
use std::sync::Arc;
use support::{memory_store, stack};

fn any_state() -> impl Strategy<Value = DeploymentState> {
    proptest::sample::select(DeploymentState::ALL.to_vec())
}

mod transitions {
    use super::*;

    proptest! {
        #[test]
        fn only_listed_edges_are_accepted(from in any_state(), to in any_state()) {
            use DeploymentState::*;
            let listed = [
                (NotFound, Initializing),
                (RolledBack, Initializing),
                (Initializing, InProgress),
                (Initializing, Failed),
                (Initializing, RollingBack),
                (InProgress, Completed),
                (InProgress, Failed),
                (InProgress, RollingBack),
                (Completed, RollingBack),
                (Failed, RollingBack),
                (RollingBack, Verifying),
                (RollingBack, Failed),
                (Verifying, RolledBack),
                (Verifying, Failed),
            ];
            prop_assert_eq!(from.can_transition_to(to), listed.contains(&(from, to)));
        }

        #[test]
        fn settled_states_never_resume_forward_progress(to in any_state()) {
            for from in [DeploymentState::Completed, DeploymentState::Failed, DeploymentState::RolledBack] {
                prop_assert!(!(from.can_transition_to(to) && to == DeploymentState::InProgress));
            }
        }

        /// Whatever sequence of writes is attempted, the stored state is the
        /// last accepted one and history only grows on accepted changes.
        #[test]
        fn store_applies_exactly_the_legal_writes(
            writes in proptest::collection::vec(any_state(), 1..24)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let store = memory_store();
                let name = stack("prop-stack");
                store.init(&name, DeploymentType::Spot).await.unwrap();

                let mut expected = DeploymentState::Initializing;
                for next in writes {
                    let before = store.history(&name).await.unwrap().len();
                    let result = store.set_state(&name, next, None).await;
                    let after = store.history(&name).await.unwrap().len();

                    if next == expected {
                        assert!(result.is_ok());
                        assert_eq!(after, before);
                    } else if expected.can_transition_to(next) {
                        assert_eq!(result.unwrap(), expected);
                        assert_eq!(after, before + 1);
                        expected = next;
                    } else {
                        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
                        assert_eq!(after, before);
                    }
                    assert_eq!(store.get_state(&name).await.unwrap(), expected);
                }
            });
        }
    }
}

mod persistence {
    use super::*;

    async fn open(dir: &std::path::Path) -> StateStore {
        StateStore::open(dir, Arc::new(VariableRegistry::with_builtins()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn document_is_plain_json_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        let name = stack("web-prod");
        store.init(&name, DeploymentType::Alb).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(STATE_FILENAME)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["stacks"]["web-prod"]["status"], "initializing");
        assert_eq!(doc["stacks"]["web-prod"]["deployment_type"], "alb");
        assert!(doc["metadata"]["version"].is_number());
    }

    #[tokio::test]
    async fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILENAME), "{ not json").unwrap();

        let result = StateStore::open(dir.path(), Arc::new(VariableRegistry::with_builtins())).await;
        assert!(matches!(result, Err(StateError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn snapshot_restores_resources_and_variables() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        let name = stack("web-prod");
        let registry = ResourceRegistry::new(store.clone());

        store.init(&name, DeploymentType::Spot).await.unwrap();
        registry
            .register(&name, ResourceKind::Vpc, ResourceId::new("vpc-1"), json!({"cidr": "10.0.0.0/16"}))
            .await
            .unwrap();
        store
            .set_variable(&Scope::from(&name), state::HEALTH_STATUS, "HEALTHY")
            .await
            .unwrap();

        let id = store
            .snapshot(Some(&name), SnapshotKind::Manual)
            .await
            .unwrap();

        registry.unregister(&name, ResourceKind::Vpc).await.unwrap();
        store
            .set_variable(&Scope::from(&name), state::HEALTH_STATUS, "CRITICAL")
            .await
            .unwrap();

        // A fresh handle reads snapshots from disk.
        let reopened = open(dir.path()).await;
        reopened.restore(&id, Some(&name)).await.unwrap();

        let vpc = ResourceRegistry::new(reopened.clone())
            .get(&name, ResourceKind::Vpc)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(vpc.ids, vec![ResourceId::new("vpc-1")]);
        assert_eq!(vpc.metadata["cidr"], "10.0.0.0/16");
        assert_eq!(
            reopened
                .get_variable(&Scope::from(&name), state::HEALTH_STATUS)
                .await
                .unwrap(),
            Some(VarValue::from("HEALTHY"))
        );
        // Lifecycle state is not rewound.
        assert_eq!(
            reopened.get_state(&name).await.unwrap(),
            DeploymentState::Initializing
        );
    }

    #[tokio::test]
    async fn restore_recreates_a_deleted_stack() {
        let store = memory_store();
        let name = stack("web-prod");
        store.init(&name, DeploymentType::Cdn).await.unwrap();
        ResourceRegistry::new(store.clone())
            .register(&name, ResourceKind::Cloudfront, ResourceId::new("E123"), json!({}))
            .await
            .unwrap();

        let id = store.delete_stack(&name).await.unwrap();
        assert_eq!(store.get_state(&name).await.unwrap(), DeploymentState::NotFound);

        store.restore(&id, None).await.unwrap();
        let record = store.require_stack(&name).await.unwrap();
        assert_eq!(record.deployment_type, Some(DeploymentType::Cdn));
        assert!(record.resources.contains_key(&ResourceKind::Cloudfront));
    }

    #[tokio::test]
    async fn restore_of_unknown_stack_in_snapshot_fails() {
        let store = memory_store();
        let present = stack("present");
        store.init(&present, DeploymentType::Spot).await.unwrap();
        let id = store
            .snapshot(Some(&present), SnapshotKind::Manual)
            .await
            .unwrap();

        let err = store.restore(&id, Some(&stack("absent"))).await.unwrap_err();
        assert!(matches!(err, StateError::SnapshotMissingStack { .. }));
    }

    #[tokio::test]
    async fn global_snapshot_captures_every_stack() {
        let store = memory_store();
        for n in ["alpha", "beta"] {
            store.init(&stack(n), DeploymentType::Spot).await.unwrap();
        }
        store
            .set_variable(&Scope::Global, state::COST_LIMIT, 250.0)
            .await
            .unwrap();

        let id = store.snapshot(None, SnapshotKind::Backup).await.unwrap();
        let snapshot = store.snapshots().load(&id).await.unwrap();

        assert_eq!(snapshot.stacks.len(), 2);
        assert_eq!(
            snapshot.global_variables.get(state::COST_LIMIT),
            Some(&VarValue::Decimal(250.0))
        );
    }

    #[tokio::test]
    async fn enumerated_variables_reject_unknown_values() {
        let store = memory_store();
        let name = stack("web-prod");
        store.init(&name, DeploymentType::Spot).await.unwrap();

        let err = store
            .set_variable(&Scope::from(&name), state::HEALTH_STATUS, "ON_FIRE")
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Variable(_)));
    }

    #[tokio::test]
    async fn resolved_variables_merge_scopes() {
        let store = memory_store();
        let name = stack("web-prod");
        store.init(&name, DeploymentType::Spot).await.unwrap();
        store
            .set_variable(&Scope::Global, state::COST_LIMIT, 100.0)
            .await
            .unwrap();
        store
            .set_variable(&Scope::from(&name), state::DEPLOYMENT_COST, 12.5)
            .await
            .unwrap();

        let vars = store.resolve_variables(&name).await.unwrap();
        assert_eq!(vars.get(state::COST_LIMIT), Some(&VarValue::Decimal(100.0)));
        assert_eq!(vars.get(state::DEPLOYMENT_COST), Some(&VarValue::Decimal(12.5)));
        assert_eq!(
            vars.get(state::DEPLOYMENT_TIMEOUT),
            Some(&VarValue::Integer(state::DEFAULT_DEPLOYMENT_TIMEOUT_SECS))
        );
    }
}

mod locks {
    use super::*;

    #[test]
    fn second_holder_sees_who_holds_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web-prod.lock");

        let first =
            LockFile::try_acquire(&path, "web-prod", false, LockFile::stack_stale_after()).unwrap();
        let err = LockFile::try_acquire(&path, "web-prod", false, LockFile::stack_stale_after())
            .unwrap_err();

        match err {
            LockError::Held { holder, pid, .. } => {
                assert!(!holder.is_empty());
                assert_eq!(pid, std::process::id());
            }
            other => panic!("expected Held, got {other:?}"),
        }
        first.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web-prod.lock");

        let _abandoned =
            LockFile::try_acquire(&path, "web-prod", false, LockFile::stack_stale_after()).unwrap();
        let taken = LockFile::try_acquire(&path, "web-prod", false, chrono::Duration::zero());
        assert!(taken.is_ok());
    }
}
