// ABOUTME: In-memory CloudProvider with failure injection and call recording.
// ABOUTME: Lets tests script provisioning failures, flaky deletes, and slow calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use stackroll::provider::{
    CloudProvider, ProviderError, ProvisionSpec, Provisioned, ResourceStatus,
};
use stackroll::types::{ResourceId, ResourceKind, StackName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Provision(ResourceKind),
    Deprovision(ResourceKind, String),
    Describe(ResourceKind, String),
    QueryByTag(String),
}

#[derive(Default)]
struct Script {
    next_id: u64,
    live: BTreeMap<String, ResourceKind>,
    calls: Vec<Call>,
    /// Forced provision failures per kind: message and remaining count.
    provision_failures: HashMap<ResourceKind, (String, u32)>,
    /// Remaining forced deprovision failures per kind.
    deprovision_failures: HashMap<ResourceKind, u32>,
    describe_overrides: HashMap<ResourceKind, ResourceStatus>,
    provision_delays: HashMap<ResourceKind, Duration>,
    deprovision_delay: Option<Duration>,
    tagged: Vec<String>,
}

#[derive(Default)]
pub struct FakeProvider {
    script: Mutex<Script>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_provision(self, kind: ResourceKind, message: &str) -> Self {
        self.fail_provision_times(kind, message, u32::MAX)
    }

    /// Reject the next `times` provisioning calls for `kind`.
    pub fn fail_provision_times(self, kind: ResourceKind, message: &str, times: u32) -> Self {
        self.script
            .lock()
            .provision_failures
            .insert(kind, (message.to_string(), times));
        self
    }

    /// Reject the next `times` deletions of `kind`.
    pub fn fail_deprovision(self, kind: ResourceKind, times: u32) -> Self {
        self.script.lock().deprovision_failures.insert(kind, times);
        self
    }

    pub fn always_fail_deprovision(self, kind: ResourceKind) -> Self {
        self.fail_deprovision(kind, u32::MAX)
    }

    pub fn describe_as(self, kind: ResourceKind, status: ResourceStatus) -> Self {
        self.script.lock().describe_overrides.insert(kind, status);
        self
    }

    pub fn slow_provision(self, kind: ResourceKind, delay: Duration) -> Self {
        self.script.lock().provision_delays.insert(kind, delay);
        self
    }

    pub fn slow_deprovision(self, delay: Duration) -> Self {
        self.script.lock().deprovision_delay = Some(delay);
        self
    }

    /// Something the registry does not know about but the cloud still tags.
    pub fn tag_orphan(&self, arn: &str) {
        self.script.lock().tagged.push(arn.to_string());
    }

    /// Pretend `id` already exists, outside any provisioning call.
    pub fn adopt(&self, kind: ResourceKind, id: &str) {
        self.script.lock().live.insert(id.to_string(), kind);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    pub fn provisioned(&self) -> Vec<ResourceKind> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Provision(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn deprovisioned(&self) -> Vec<(ResourceKind, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Deprovision(kind, id) => Some((kind, id)),
                _ => None,
            })
            .collect()
    }

    pub fn provision_attempts(&self, kind: ResourceKind) -> usize {
        self.provisioned().iter().filter(|k| **k == kind).count()
    }

    pub fn deprovision_attempts(&self, kind: ResourceKind) -> usize {
        self.deprovisioned().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn live(&self) -> Vec<(String, ResourceKind)> {
        self.script
            .lock()
            .live
            .iter()
            .map(|(id, kind)| (id.clone(), *kind))
            .collect()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.script.lock().live.contains_key(id)
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    async fn provision(
        &self,
        kind: ResourceKind,
        spec: &ProvisionSpec,
    ) -> Result<Provisioned, ProviderError> {
        let delay = {
            let mut script = self.script.lock();
            script.calls.push(Call::Provision(kind));
            script.provision_delays.get(&kind).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock();
        if let Some((message, remaining)) = script.provision_failures.get_mut(&kind)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ProviderError::rejected("provision", message.clone()));
        }
        script.next_id += 1;
        let id = format!("{}-{}-{}", spec.stack, kind, script.next_id);
        script.live.insert(id.clone(), kind);

        let mut provisioned = Provisioned::new(id.clone());
        if kind == ResourceKind::Alb {
            provisioned.metadata = serde_json::json!({ "dns_name": format!("{id}.elb.test") });
        }
        Ok(provisioned)
    }

    async fn deprovision(&self, kind: ResourceKind, id: &ResourceId) -> Result<(), ProviderError> {
        let delay = {
            let mut script = self.script.lock();
            script.calls.push(Call::Deprovision(kind, id.to_string()));
            script.deprovision_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock();
        if let Some(remaining) = script.deprovision_failures.get_mut(&kind)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ProviderError::rejected("deprovision", "DependencyViolation"));
        }
        match script.live.remove(id.as_str()) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound {
                kind,
                id: id.to_string(),
            }),
        }
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
    ) -> Result<ResourceStatus, ProviderError> {
        let mut script = self.script.lock();
        script.calls.push(Call::Describe(kind, id.to_string()));
        if let Some(status) = script.describe_overrides.get(&kind) {
            return Ok(*status);
        }
        Ok(if script.live.contains_key(id.as_str()) {
            ResourceStatus::Available
        } else {
            ResourceStatus::Gone
        })
    }

    async fn query_by_tag(&self, stack: &StackName) -> Result<Vec<String>, ProviderError> {
        let mut script = self.script.lock();
        script.calls.push(Call::QueryByTag(stack.to_string()));
        Ok(script.tagged.clone())
    }
}
