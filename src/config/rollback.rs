// ABOUTME: Rollback engine and snapshot retention settings.
// ABOUTME: Retry/backoff policy, emergency timeout, settle waits, verification toggles.

use serde::Deserialize;
use std::time::Duration;

use crate::rollback::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct RollbackConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    #[serde(default = "default_emergency_timeout", with = "humantime_serde")]
    pub emergency_timeout: Duration,

    #[serde(default = "default_settle_timeout", with = "humantime_serde")]
    pub settle_timeout: Duration,

    #[serde(default = "default_settle_interval", with = "humantime_serde")]
    pub settle_interval: Duration,

    /// Ask the provider for leftover tagged resources after teardown.
    #[serde(default = "default_verify_tags")]
    pub verify_tags: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_emergency_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_settle_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_settle_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_verify_tags() -> bool {
    true
}

impl Default for RollbackConfig {
    fn default() -> Self {
        RollbackConfig {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            emergency_timeout: default_emergency_timeout(),
            settle_timeout: default_settle_timeout(),
            settle_interval: default_settle_interval(),
            verify_tags: default_verify_tags(),
        }
    }
}

impl RollbackConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    30
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            retention_days: default_retention_days(),
        }
    }
}
