// ABOUTME: Configuration error types with SNAFU context selectors.
// ABOUTME: Covers discovery, parsing, env interpolation, and provider validation.

use snafu::Snafu;
use std::path::PathBuf;

/// Errors raised while loading or validating configuration.
///
/// All of these are configuration-class failures: they are reported before
/// any provider call is made and are never retried.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("configuration file not found in {}", dir.display()))]
    NotFound { dir: PathBuf },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to write {}: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("YAML parse error: {source}"))]
    Yaml { source: serde_yaml::Error },

    #[snafu(display("file already exists: {}", path.display()))]
    AlreadyExists { path: PathBuf },

    #[snafu(display("missing required environment variable: {var}"))]
    MissingEnvVar { var: String },

    #[snafu(display("provider region is not configured (set provider.region or AWS_REGION)"))]
    MissingRegion,

    #[snafu(display(
        "provider credentials are not configured (set provider.credentials, provider.profile, or AWS_ACCESS_KEY_ID)"
    ))]
    MissingCredentials,

    #[snafu(display("invalid configuration: {message}"))]
    Invalid { message: String },
}
