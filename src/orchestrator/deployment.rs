// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: Initialization validates the provider and seeds the stack's signals.

use chrono::{DateTime, Utc};
use serde_json::json;

use super::error::DeployError;
use super::runner::Orchestrator;
use super::state::Initialized;
use crate::config::ConfigError;
use crate::state::{self, DeploymentState, Scope, VarValue};
use crate::types::{DeploymentType, StackName};

/// A deployment in progress, parameterized by its current state.
///
/// Each state marker only exposes the operations that are legal from it:
/// a completed deployment cannot be rolled back through this handle, and an
/// interrupted one cannot be completed.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) stack: StackName,
    pub(crate) deployment_type: DeploymentType,
    pub(crate) started: DateTime<Utc>,
    pub(crate) state: S,
}

impl<S> Deployment<S> {
    pub fn stack(&self) -> &StackName {
        &self.stack
    }

    pub fn deployment_type(&self) -> DeploymentType {
        self.deployment_type
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub(crate) fn transition<T>(self, state: T) -> Deployment<T> {
        Deployment {
            stack: self.stack,
            deployment_type: self.deployment_type,
            started: self.started,
            state,
        }
    }
}

impl Deployment<Initialized> {
    /// Validate provider settings, create the stack state, lay out its
    /// phases, and seed the variables the trigger monitor reads.
    ///
    /// Configuration problems are reported before the state store is touched.
    pub async fn initialize(
        ctx: &Orchestrator,
        stack: &StackName,
        deployment_type: DeploymentType,
    ) -> Result<Self, DeployError> {
        let provider = ctx.config.provider.validate()?;
        if deployment_type == DeploymentType::Cdn && ctx.config.deployment.cdn_origin.is_none() {
            return Err(ConfigError::Invalid {
                message: "deployment.cdn_origin is required for cdn deployments".to_string(),
            }
            .into());
        }
        tracing::debug!(
            "Provider region {} ({:?})",
            provider.region,
            provider.credential_source
        );

        ctx.store.init(stack, deployment_type).await?;
        let deployment = Deployment {
            stack: stack.clone(),
            deployment_type,
            started: Utc::now(),
            state: Initialized,
        };

        if let Err(e) = deployment.seed(ctx).await {
            if let Err(state_err) = ctx
                .store
                .set_state(stack, DeploymentState::Failed, Some(&e.to_string()))
                .await
            {
                tracing::error!(stack = %stack, "Failed to mark stack failed: {}", state_err);
            }
            return Err(e);
        }

        tracing::info!(stack = %stack, "Initialized {} deployment", deployment_type);
        Ok(deployment)
    }

    async fn seed(&self, ctx: &Orchestrator) -> Result<(), DeployError> {
        let scope = Scope::from(&self.stack);
        let timeout = i64::try_from(ctx.config.deployment.timeout.as_secs())
            .unwrap_or(i64::MAX)
            .max(1);
        let phases: Vec<String> = self
            .deployment_type
            .phases()
            .iter()
            .map(|phase| phase.as_str().to_string())
            .collect();

        let seeds: [(&str, VarValue); 5] = [
            (state::DEPLOYMENT_START_TIME, self.started.timestamp().into()),
            (state::DEPLOYMENT_TIMEOUT, timeout.into()),
            (state::DEPLOYMENT_PHASES, phases.clone().into()),
            (state::DEPLOYMENT_TYPE, self.deployment_type.as_str().into()),
            (state::FAILED_COMPONENTS, Vec::<String>::new().into()),
        ];
        for (name, value) in seeds {
            ctx.store.set_variable(&scope, name, value).await?;
        }

        if let Some(ref root) = ctx.deployment_dir {
            let dir = root.join(self.stack.as_str());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| DeployError::Io {
                    path: dir.clone(),
                    source,
                })?;
            let manifest = json!({
                "stack": self.stack,
                "deployment_type": self.deployment_type,
                "started": self.started,
                "phases": phases,
            });
            let path = dir.join("deployment.json");
            let body = serde_json::to_vec_pretty(&manifest).map_err(|e| DeployError::Io {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?;
            tokio::fs::write(&path, body)
                .await
                .map_err(|source| DeployError::Io { path, source })?;
        }

        Ok(())
    }
}
