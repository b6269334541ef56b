// ABOUTME: Errors crossing the cloud provider boundary.
// ABOUTME: Distinguishes rejected calls, missing resources, timeouts and adapter faults.

use std::time::Duration;
use thiserror::Error;

use crate::types::ResourceKind;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{operation} rejected: {message}")]
    Rejected { operation: String, message: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("provider {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("failed to run provider adapter {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("provider adapter returned malformed output for {operation}: {message}")]
    Protocol {
        operation: &'static str,
        message: String,
    },

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// A resource that no longer exists counts as deleted.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }
}
