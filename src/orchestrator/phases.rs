// ABOUTME: Phase drivers: the fixed provisioning sequence behind each phase.
// ABOUTME: Registers every resource as it appears and unwinds siblings on failure.

use super::error::DeployError;
use super::runner::Orchestrator;
use crate::diagnostics::{Diagnostics, Warning};
use crate::provider::{ProvisionSpec, Provisioned, ResourceStatus, with_timeout};
use crate::state::{self, PhaseStatus, ResourceRecord, Scope};
use crate::types::{DeploymentType, Phase, ResourceId, ResourceKind, StackName};

/// Run one phase, recording its status and, on failure, the failing component.
pub(crate) async fn run_phase(
    ctx: &Orchestrator,
    stack: &StackName,
    deployment_type: DeploymentType,
    phase: Phase,
    diag: &mut Diagnostics,
) -> Result<(), DeployError> {
    tracing::info!(stack = %stack, "Starting {} phase", phase);
    ctx.store
        .set_phase_status(stack, phase, PhaseStatus::InProgress)
        .await?;

    let mut run = PhaseRun {
        ctx,
        stack,
        phase,
        created: Vec::new(),
    };
    let result = match phase {
        Phase::Infrastructure => run.infrastructure().await,
        Phase::Alb => run.load_balancer().await,
        Phase::Compute => run.compute(deployment_type).await,
        Phase::Cdn => run.cdn().await,
    };

    match result {
        Ok(()) => {
            ctx.store
                .set_phase_status(stack, phase, PhaseStatus::Completed)
                .await?;
            tracing::info!(stack = %stack, "{} phase completed", phase);
            Ok(())
        }
        Err(e) => {
            tracing::error!(stack = %stack, "{} phase failed: {}", phase, e);
            run.unwind(diag).await;

            if let Err(state_err) = ctx
                .store
                .set_phase_status(stack, phase, PhaseStatus::Failed)
                .await
            {
                tracing::error!(stack = %stack, "Failed to record phase failure: {}", state_err);
            }
            if let Some(component) = e.failed_component() {
                let failed = vec![component.as_str().to_string()];
                if let Err(state_err) = ctx
                    .store
                    .set_variable(&Scope::from(stack), state::FAILED_COMPONENTS, failed)
                    .await
                {
                    tracing::error!(stack = %stack, "Failed to record failed component: {}", state_err);
                }
            }
            Err(e)
        }
    }
}

/// Resources created by one phase, kept for inline cleanup.
struct PhaseRun<'a> {
    ctx: &'a Orchestrator,
    stack: &'a StackName,
    phase: Phase,
    created: Vec<(ResourceKind, ResourceId)>,
}

impl PhaseRun<'_> {
    fn spec(&self) -> ProvisionSpec {
        ProvisionSpec::new(self.stack)
    }

    /// Provision one resource and register it straight away.
    async fn provision(
        &mut self,
        kind: ResourceKind,
        spec: ProvisionSpec,
    ) -> Result<Provisioned, DeployError> {
        tracing::info!(stack = %self.stack, kind = %kind, "Provisioning {}", kind);

        let call_timeout = self.ctx.config.provider.call_timeout;
        let policy = self.ctx.config.deployment.provision_retry.retry_policy();
        let provider = &self.ctx.provider;
        let spec = &spec;
        let (result, attempts) = policy
            .run(|attempt| async move {
                if attempt > 1 {
                    tracing::info!(kind = %kind, attempt, "Retrying provisioning of {}", kind);
                }
                with_timeout(call_timeout, "provision", provider.provision(kind, spec)).await
            })
            .await;
        let provisioned = result.map_err(|source| {
            tracing::error!(kind = %kind, "Giving up on {} after {} attempt(s)", kind, attempts);
            DeployError::Provisioning {
                phase: self.phase,
                kind,
                source,
            }
        })?;

        self.created.push((kind, provisioned.id.clone()));
        let registry = &self.ctx.registry;
        if kind.is_multi_valued() {
            registry
                .append(self.stack, kind, provisioned.id.clone(), provisioned.metadata.clone())
                .await?;
        } else {
            registry
                .register(self.stack, kind, provisioned.id.clone(), provisioned.metadata.clone())
                .await?;
        }

        tracing::info!(stack = %self.stack, kind = %kind, "Provisioned {}", provisioned.id);
        Ok(provisioned)
    }

    async fn require(&self, kind: ResourceKind) -> Result<ResourceRecord, DeployError> {
        self.ctx
            .registry
            .get(self.stack, kind)
            .await?
            .filter(|record| !record.ids.is_empty())
            .ok_or(DeployError::MissingDependency {
                phase: self.phase,
                kind,
            })
    }

    async fn require_id(&self, kind: ResourceKind) -> Result<ResourceId, DeployError> {
        let record = self.require(kind).await?;
        record.primary_id().cloned().ok_or(DeployError::MissingDependency {
            phase: self.phase,
            kind,
        })
    }

    /// Delete what this phase created, deepest first. Anything that will not
    /// delete stays registered for the rollback engine.
    async fn unwind(&mut self, diag: &mut Diagnostics) {
        let mut created = std::mem::take(&mut self.created);
        created.sort_by_key(|(kind, _)| *kind);

        for (kind, id) in created {
            tracing::info!(stack = %self.stack, kind = %kind, "Cleaning up {}", id);
            let call_timeout = self.ctx.config.provider.call_timeout;
            let deleted =
                with_timeout(call_timeout, "deprovision", self.ctx.provider.deprovision(kind, &id))
                    .await;
            match deleted {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    diag.warn(Warning::inline_cleanup(format!(
                        "could not clean up {kind} {id}: {e}"
                    )));
                    continue;
                }
            }
            if let Err(e) = self.ctx.registry.remove_member(self.stack, kind, &id).await {
                diag.warn(Warning::inline_cleanup(format!(
                    "deleted {kind} {id} but could not unregister it: {e}"
                )));
            }
        }
    }

    // =========================================================================
    // Drivers
    // =========================================================================

    /// Network, security group, IAM role, and optional file system.
    async fn infrastructure(&mut self) -> Result<(), DeployError> {
        let ctx = self.ctx;
        let cfg = &ctx.config.deployment;

        let vpc = self
            .provision(
                ResourceKind::Vpc,
                self.spec().param("cidr_block", cfg.cidr_block.clone()),
            )
            .await?
            .id;
        self.provision(ResourceKind::InternetGateway, self.spec().depends_on(&vpc))
            .await?;

        let mut subnets = Vec::with_capacity(usize::from(cfg.subnet_count));
        for index in 0..cfg.subnet_count {
            let subnet = self
                .provision(
                    ResourceKind::Subnet,
                    self.spec().depends_on(&vpc).param("index", index),
                )
                .await?;
            subnets.push(subnet.id);
        }

        if cfg.nat_gateway
            && let Some(public) = subnets.first()
        {
            self.provision(ResourceKind::NatGateway, self.spec().depends_on(public))
                .await?;
        }

        self.provision(ResourceKind::SecurityGroup, self.spec().depends_on(&vpc))
            .await?;
        self.provision(ResourceKind::IamRole, self.spec()).await?;

        if cfg.efs {
            let efs = self.provision(ResourceKind::Efs, self.spec()).await?.id;
            for subnet in &subnets {
                self.provision(
                    ResourceKind::EfsMountTarget,
                    self.spec().depends_on(&efs).depends_on(subnet),
                )
                .await?;
            }
        }

        Ok(())
    }

    /// Load balancer across the stack's subnets plus its target group.
    async fn load_balancer(&mut self) -> Result<(), DeployError> {
        let vpc = self.require_id(ResourceKind::Vpc).await?;
        let subnets = self.require(ResourceKind::Subnet).await?.ids;
        let security_group = self.require_id(ResourceKind::SecurityGroup).await?;

        let alb = self
            .provision(
                ResourceKind::Alb,
                self.spec()
                    .depends_on_all(&subnets)
                    .depends_on(&security_group),
            )
            .await?
            .id;
        self.provision(
            ResourceKind::TargetGroup,
            self.spec()
                .depends_on(&vpc)
                .depends_on(&alb)
                .param("port", 80),
        )
        .await?;

        Ok(())
    }

    /// The application instance, attached to the target group when one exists.
    async fn compute(&mut self, deployment_type: DeploymentType) -> Result<(), DeployError> {
        let ctx = self.ctx;
        let cfg = &ctx.config.deployment;
        let subnet = self.require_id(ResourceKind::Subnet).await?;
        let security_group = self.require_id(ResourceKind::SecurityGroup).await?;
        let role = self.require_id(ResourceKind::IamRole).await?;

        let mut spec = self
            .spec()
            .depends_on(&subnet)
            .depends_on(&security_group)
            .depends_on(&role)
            .param("instance_type", cfg.instance_type.clone())
            .param("spot", deployment_type.uses_spot());
        if deployment_type.uses_spot()
            && let Some(ref price) = cfg.spot_max_price
        {
            spec = spec.param("spot_max_price", price.clone());
        }
        if let Some(target_group) = self.ctx.registry.get(self.stack, ResourceKind::TargetGroup).await?
            && let Some(id) = target_group.primary_id()
        {
            spec = spec.depends_on(id).param("target_group", id.as_str());
        }
        if let Some(efs) = self.ctx.registry.get(self.stack, ResourceKind::Efs).await?
            && let Some(id) = efs.primary_id()
        {
            spec = spec.param("efs", id.as_str());
        }

        let instance = self.provision(ResourceKind::Ec2Instance, spec).await?.id;
        self.await_ready(ResourceKind::Ec2Instance, &instance).await
    }

    /// CDN distribution in front of the load balancer, or the configured origin.
    async fn cdn(&mut self) -> Result<(), DeployError> {
        let mut spec = self.spec();
        match self.ctx.registry.get(self.stack, ResourceKind::Alb).await? {
            Some(alb) => {
                let id = alb.primary_id().cloned().ok_or(DeployError::MissingDependency {
                    phase: self.phase,
                    kind: ResourceKind::Alb,
                })?;
                let origin = alb
                    .metadata
                    .get("dns_name")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| id.to_string());
                spec = spec.depends_on(&id).param("origin", origin);
            }
            None => {
                let origin = self.ctx.config.deployment.cdn_origin.clone().ok_or(
                    DeployError::MissingDependency {
                        phase: self.phase,
                        kind: ResourceKind::Alb,
                    },
                )?;
                spec = spec.param("origin", origin);
            }
        }

        self.provision(ResourceKind::Cloudfront, spec).await?;
        Ok(())
    }

    /// Poll until the provider reports the resource available.
    async fn await_ready(&self, kind: ResourceKind, id: &ResourceId) -> Result<(), DeployError> {
        let cfg = &self.ctx.config.deployment;
        let deadline = tokio::time::Instant::now() + cfg.readiness_timeout;
        let not_ready = |reason: String| DeployError::NotReady {
            phase: self.phase,
            kind,
            id: id.clone(),
            reason,
        };

        loop {
            let status = with_timeout(
                self.ctx.config.provider.call_timeout,
                "describe",
                self.ctx.provider.describe(kind, id),
            )
            .await;
            match status {
                Ok(ResourceStatus::Available) => {
                    tracing::info!(stack = %self.stack, kind = %kind, "{} is available", id);
                    return Ok(());
                }
                Ok(status @ (ResourceStatus::Failed | ResourceStatus::Gone)) => {
                    return Err(not_ready(format!("provider reports {status}")));
                }
                Ok(status) => tracing::debug!(kind = %kind, "{} is {}", id, status),
                Err(e) => tracing::debug!(kind = %kind, "describe {} failed: {}", id, e),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(not_ready(format!(
                    "not available after {:?}",
                    cfg.readiness_timeout
                )));
            }
            tokio::time::sleep(cfg.readiness_interval).await;
        }
    }
}
