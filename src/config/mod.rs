// ABOUTME: Configuration types and parsing for stackroll.yml.
// ABOUTME: Handles YAML parsing, file discovery, and defaults for every section.

mod deployment;
mod env_value;
mod error;
mod init;
mod provider;
mod rollback;

pub use deployment::{DeploymentConfig, ProvisionRetry};
pub use env_value::EnvValue;
pub use error::ConfigError;
pub use init::init_config;
pub use provider::{CredentialSource, ProviderConfig, ValidatedProvider};
pub use rollback::{RollbackConfig, SnapshotConfig};

use serde::Deserialize;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

use error::{NotFoundSnafu, ReadSnafu, YamlSnafu};

pub const CONFIG_FILENAME: &str = "stackroll.yml";
pub const CONFIG_FILENAME_ALT: &str = "stackroll.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".stackroll/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Where the state document, snapshots, reports, and locks live.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub rollback: RollbackConfig,

    #[serde(default)]
    pub snapshots: SnapshotConfig,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".stackroll/state")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            state_dir: default_state_dir(),
            provider: ProviderConfig::default(),
            deployment: DeploymentConfig::default(),
            rollback: RollbackConfig::default(),
            snapshots: SnapshotConfig::default(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml).context(YamlSnafu)?;
        config.check()?;
        Ok(config)
    }

    /// Load a config file. A relative `state_dir` is resolved against the
    /// directory holding the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        let mut config = Self::from_yaml(&content)?;

        if config.state_dir.is_relative()
            && let Some(parent) = path.parent()
        {
            // `.stackroll/config.yml` sits one level below the project root.
            let base = if parent.ends_with(".stackroll") {
                parent.parent().unwrap_or(parent)
            } else {
                parent
            };
            config.state_dir = base.join(&config.state_dir);
        }

        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        NotFoundSnafu { dir }.fail()
    }

    /// Reject values that parse but cannot work.
    fn check(&self) -> Result<(), ConfigError> {
        if self.rollback.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "rollback.max_attempts must be at least 1".to_string(),
            });
        }
        if self.rollback.initial_delay > self.rollback.max_delay {
            return Err(ConfigError::Invalid {
                message: "rollback.initial_delay cannot exceed rollback.max_delay".to_string(),
            });
        }
        let provision = &self.deployment.provision_retry;
        if provision.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "deployment.provision_retry.max_attempts must be at least 1".to_string(),
            });
        }
        if provision.initial_delay > provision.max_delay {
            return Err(ConfigError::Invalid {
                message: "deployment.provision_retry.initial_delay cannot exceed its max_delay"
                    .to_string(),
            });
        }
        if self.deployment.subnet_count == 0 {
            return Err(ConfigError::Invalid {
                message: "deployment.subnet_count must be at least 1".to_string(),
            });
        }
        if self.deployment.monitor_interval.is_zero() {
            return Err(ConfigError::Invalid {
                message: "deployment.monitor_interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.state_dir.join("snapshots")
    }

    pub fn report_dir(&self) -> PathBuf {
        self.state_dir.join("reports")
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }

    pub fn deployments_dir(&self) -> PathBuf {
        self.state_dir.join("deployments")
    }
}
