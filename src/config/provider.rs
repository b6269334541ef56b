// ABOUTME: Cloud provider adapter configuration.
// ABOUTME: Region, credentials, adapter command, and per-call timeout.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::{ConfigError, EnvValue};

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub region: Option<String>,

    /// Access credentials, literal or `{ env: VAR }`.
    #[serde(default)]
    pub credentials: Option<EnvValue>,

    /// Named credentials profile, used when no explicit credentials are given.
    #[serde(default)]
    pub profile: Option<String>,

    /// External adapter executable used by the CLI.
    #[serde(default)]
    pub command: Option<PathBuf>,

    #[serde(default = "default_call_timeout", with = "humantime_serde")]
    pub call_timeout: Duration,
}

/// Region and credential source that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedProvider {
    pub region: String,
    pub credential_source: CredentialSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Explicit,
    Profile(String),
    Environment,
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            region: None,
            credentials: None,
            profile: None,
            command: None,
            call_timeout: default_call_timeout(),
        }
    }
}

impl ProviderConfig {
    /// Configured region, falling back to `AWS_REGION` then `AWS_DEFAULT_REGION`.
    pub fn region(&self) -> Option<String> {
        self.region
            .clone()
            .filter(|r| !r.trim().is_empty())
            .or_else(|| non_empty_env("AWS_REGION"))
            .or_else(|| non_empty_env("AWS_DEFAULT_REGION"))
    }

    /// Check that a region and some credential source are configured.
    ///
    /// This is the fail-fast gate run before a deployment touches anything.
    pub fn validate(&self) -> Result<ValidatedProvider, ConfigError> {
        let region = self.region().ok_or(ConfigError::MissingRegion)?;

        let credential_source = if let Some(ref creds) = self.credentials {
            let value = creds.resolve()?;
            if value.trim().is_empty() {
                return Err(ConfigError::MissingCredentials);
            }
            CredentialSource::Explicit
        } else if let Some(profile) = self.profile.clone().or_else(|| non_empty_env("AWS_PROFILE"))
        {
            CredentialSource::Profile(profile)
        } else if non_empty_env("AWS_ACCESS_KEY_ID").is_some() {
            CredentialSource::Environment
        } else {
            return Err(ConfigError::MissingCredentials);
        };

        Ok(ValidatedProvider {
            region,
            credential_source,
        })
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
