//! Error types for certificate issuance and trust anchoring.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal provisioning failure. A half-built chain is never usable, so the
/// caller is expected to stop when it sees one of these.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Invalid issuance request: {0}")]
    InvalidRequest(String),

    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Failed to execute `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} failed: `{command}`\n{output}")]
    CommandFailed {
        step: &'static str,
        command: String,
        output: String,
    },

    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
}

impl IssueError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Recoverable failure while registering a certificate with the OS trust
/// store. The certificate on disk is still good; the user can trust it by hand.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error(
        "Cannot derive a CA name from {}: expected at least four path components \
         (<root>/<intermediate>/<app>/<file>)",
        .0.display()
    )]
    PathLayout(PathBuf),

    #[error("Permission denied while {operation}:\n{output}")]
    PermissionDenied { operation: &'static str, output: String },

    #[error("Failed while {operation}: `{command}`\n{output}")]
    CommandFailed {
        operation: &'static str,
        command: String,
        output: String,
    },

    #[error("Failed to execute `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Failed to remove the temporary trust-settings authorization:\n{output}")]
    RevokeFailed {
        output: String,
        #[source]
        add_failure: Option<Box<TrustError>>,
    },

    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
}

/// Failure while loading a TOML configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type IssueResult<T> = std::result::Result<T, IssueError>;
pub type TrustResult<T> = std::result::Result<T, TrustError>;
