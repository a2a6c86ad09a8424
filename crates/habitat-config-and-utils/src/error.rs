//! Errors raised while locating and loading client configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A configured domain is not a bare `host[:port]`
    #[error("Invalid domain {domain:?}: {reason}")]
    InvalidDomain { domain: String, reason: String },

    /// The config file exists but does not decode into a configuration
    #[error("Invalid config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine home directory")]
    NoHomeDir,
}

impl CoreError {
    pub(crate) fn invalid_domain(domain: &str, reason: impl ToString) -> Self {
        CoreError::InvalidDomain {
            domain: domain.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
