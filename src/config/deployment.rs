// ABOUTME: Forward-path deployment settings.
// ABOUTME: Timeouts, monitor cadence, default rollback mode, and topology knobs.

use serde::Deserialize;
use std::time::Duration;

use crate::rollback::{RetryPolicy, RollbackMode};

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Overall deployment timeout checked by the timeout trigger.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_monitor_interval", with = "humantime_serde")]
    pub monitor_interval: Duration,

    /// Mode used when a deployment fails or a trigger fires.
    #[serde(default)]
    pub rollback_mode: RollbackMode,

    #[serde(default = "default_cidr_block")]
    pub cidr_block: String,

    #[serde(default = "default_subnet_count")]
    pub subnet_count: u8,

    #[serde(default)]
    pub nat_gateway: bool,

    #[serde(default)]
    pub efs: bool,

    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    #[serde(default)]
    pub spot_max_price: Option<String>,

    /// Origin domain for CDN-only deployments.
    #[serde(default)]
    pub cdn_origin: Option<String>,

    #[serde(default = "default_readiness_timeout", with = "humantime_serde")]
    pub readiness_timeout: Duration,

    #[serde(default = "default_readiness_interval", with = "humantime_serde")]
    pub readiness_interval: Duration,

    /// Retries for each provisioning call before the phase fails.
    #[serde(default)]
    pub provision_retry: ProvisionRetry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionRetry {
    #[serde(default = "default_provision_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_provision_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    #[serde(default = "default_provision_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

fn default_provision_attempts() -> u32 {
    3
}

fn default_provision_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_provision_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl Default for ProvisionRetry {
    fn default() -> Self {
        ProvisionRetry {
            max_attempts: default_provision_attempts(),
            initial_delay: default_provision_initial_delay(),
            max_delay: default_provision_max_delay(),
        }
    }
}

impl ProvisionRetry {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_cidr_block() -> String {
    "10.0.0.0/16".to_string()
}

fn default_subnet_count() -> u8 {
    2
}

fn default_instance_type() -> String {
    "g4dn.xlarge".to_string()
}

fn default_readiness_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_readiness_interval() -> Duration {
    Duration::from_secs(15)
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        DeploymentConfig {
            timeout: default_timeout(),
            monitor_interval: default_monitor_interval(),
            rollback_mode: RollbackMode::default(),
            cidr_block: default_cidr_block(),
            subnet_count: default_subnet_count(),
            nat_gateway: false,
            efs: false,
            instance_type: default_instance_type(),
            spot_max_price: None,
            cdn_origin: None,
            readiness_timeout: default_readiness_timeout(),
            readiness_interval: default_readiness_interval(),
            provision_retry: ProvisionRetry::default(),
        }
    }
}
