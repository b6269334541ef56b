// ABOUTME: CloudProvider backed by an external adapter executable.
// ABOUTME: One process per call, JSON request on stdin, JSON response on stdout.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{CloudProvider, ProviderError, ProvisionSpec, Provisioned, ResourceStatus};
use crate::config::{ConfigError, ProviderConfig, ValidatedProvider};
use crate::types::{ResourceId, ResourceKind, StackName};

/// Exit status an adapter uses to say the target resource does not exist.
pub const NOT_FOUND_EXIT: i32 = 4;

/// Runs `<command> <operation>` for every provider call.
///
/// The adapter receives the request as a JSON object on stdin and must
/// print a JSON response on stdout. A non-zero exit rejects the call with
/// stderr as the message. `STACKROLL_REGION` (and `AWS_PROFILE` when a
/// profile is configured) are set in the adapter's environment.
#[derive(Debug, Clone)]
pub struct ExecProvider {
    command: PathBuf,
    region: String,
    profile: Option<String>,
    call_timeout: Duration,
}

#[derive(Deserialize)]
struct DescribeResponse {
    status: ResourceStatus,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    arns: Vec<String>,
}

impl ExecProvider {
    pub fn new(command: impl Into<PathBuf>, region: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            command: command.into(),
            region: region.into(),
            profile: None,
            call_timeout,
        }
    }

    pub fn from_config(
        config: &ProviderConfig,
        validated: &ValidatedProvider,
    ) -> Result<Self, ConfigError> {
        let command = config.command.clone().ok_or_else(|| ConfigError::Invalid {
            message: "provider.command must name the adapter executable".to_string(),
        })?;
        let mut provider = Self::new(command, validated.region.clone(), config.call_timeout);
        provider.profile = config.profile.clone();
        Ok(provider)
    }

    /// Run one adapter call. `Ok(None)` means the adapter reported the
    /// subject as not found.
    async fn call(
        &self,
        operation: &'static str,
        subject: String,
        request: serde_json::Value,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        let spawn_error = |source| ProviderError::Spawn {
            command: self.command.display().to_string(),
            source,
        };

        let mut command = Command::new(&self.command);
        command
            .arg(operation)
            .env("STACKROLL_REGION", &self.region)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref profile) = self.profile {
            command.env("AWS_PROFILE", profile);
        }

        tracing::debug!("Provider {} {}", operation, subject);
        let mut child = command.spawn().map_err(spawn_error)?;

        let body = serde_json::to_vec(&request).map_err(|e| ProviderError::Protocol {
            operation,
            message: e.to_string(),
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&body).await.map_err(spawn_error)?;
        }

        let output = tokio::time::timeout(self.call_timeout, child.wait_with_output())
            .await
            .map_err(|_| ProviderError::Timeout {
                operation,
                after: self.call_timeout,
            })?
            .map_err(spawn_error)?;

        match output.status.code() {
            Some(0) => Ok(Some(output.stdout)),
            Some(NOT_FOUND_EXIT) => Ok(None),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let message = if stderr.is_empty() {
                    format!("adapter exited with {code:?}")
                } else {
                    stderr
                };
                Err(ProviderError::rejected(
                    format!("{operation} {subject}"),
                    message,
                ))
            }
        }
    }

    fn parse<T: DeserializeOwned>(operation: &'static str, stdout: &[u8]) -> Result<T, ProviderError> {
        serde_json::from_slice(stdout).map_err(|e| ProviderError::Protocol {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl CloudProvider for ExecProvider {
    async fn provision(
        &self,
        kind: ResourceKind,
        spec: &ProvisionSpec,
    ) -> Result<Provisioned, ProviderError> {
        let stdout = self
            .call(
                "provision",
                kind.to_string(),
                json!({ "kind": kind, "spec": spec }),
            )
            .await?
            .ok_or_else(|| ProviderError::Protocol {
                operation: "provision",
                message: "adapter reported not found".to_string(),
            })?;
        Self::parse("provision", &stdout)
    }

    async fn deprovision(&self, kind: ResourceKind, id: &ResourceId) -> Result<(), ProviderError> {
        self.call(
            "deprovision",
            format!("{kind} {id}"),
            json!({ "kind": kind, "id": id }),
        )
        .await?
        .map(|_| ())
        .ok_or_else(|| ProviderError::NotFound {
            kind,
            id: id.to_string(),
        })
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
    ) -> Result<ResourceStatus, ProviderError> {
        let reply = self
            .call(
                "describe",
                format!("{kind} {id}"),
                json!({ "kind": kind, "id": id }),
            )
            .await?;
        match reply {
            Some(stdout) => Ok(Self::parse::<DescribeResponse>("describe", &stdout)?.status),
            None => Ok(ResourceStatus::Gone),
        }
    }

    async fn query_by_tag(&self, stack: &StackName) -> Result<Vec<String>, ProviderError> {
        match self
            .call("query-by-tag", stack.to_string(), json!({ "stack": stack }))
            .await?
        {
            Some(stdout) => Ok(Self::parse::<QueryResponse>("query-by-tag", &stdout)?.arns),
            None => Ok(Vec::new()),
        }
    }
}
