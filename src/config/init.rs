// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates a commented stackroll.yml template.

use snafu::ResultExt;
use std::path::Path;

use super::error::{AlreadyExistsSnafu, WriteSnafu};
use super::{CONFIG_FILENAME, ConfigError};

pub fn init_config(dir: &Path, region: Option<&str>, force: bool) -> Result<(), ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return AlreadyExistsSnafu { path: config_path }.fail();
    }

    let yaml = generate_template_yaml(region.unwrap_or("us-east-1"));
    std::fs::write(&config_path, yaml).context(WriteSnafu { path: &config_path })?;

    Ok(())
}

fn generate_template_yaml(region: &str) -> String {
    format!(
        r#"state_dir: .stackroll/state

provider:
  region: {region}
  # Literal value or {{ env: VAR_NAME }}
  credentials:
    env: AWS_ACCESS_KEY_ID
  # Adapter executable invoked as: <command> provision|deprovision|describe|query-by-tag
  command: ./provider
  call_timeout: 5m

deployment:
  timeout: 30m
  monitor_interval: 30s
  rollback_mode: full
  subnet_count: 2
  instance_type: g4dn.xlarge
  provision_retry:
    max_attempts: 3
    initial_delay: 5s
    max_delay: 1m

rollback:
  max_attempts: 3
  initial_delay: 30s
  max_delay: 5m
  emergency_timeout: 5m

snapshots:
  retention_days: 30
"#
    )
}
