//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Code exchange attempted with no pending login state
    #[error("No pending login state; start the login again")]
    MissingState,

    /// Callback state does not match the pending login state
    #[error("Login state mismatch")]
    StateMismatch,

    /// No handle is known for the session being established
    #[error("No handle recorded for the pending login")]
    MissingHandle,

    /// Callback URL carried no authorization code
    #[error("Callback URL has no authorization code")]
    MissingCode,

    /// Callback `iss` does not match the configured issuer
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    /// Authorization server redirected back with an error
    #[error("Authorization denied: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    /// No valid session, or the server rejected the credential
    #[error("Not authenticated")]
    Unauthenticated,

    /// Request target resolved outside the node origin
    #[error("Refusing to send credentials to foreign origin {0}")]
    ForeignOrigin(String),

    /// A newer login attempt or a logout happened while the exchange was in flight
    #[error("Login superseded by a newer session change")]
    LoginSuperseded,

    /// Token endpoint answered with a non-success status
    #[error("Token endpoint returned HTTP {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    /// Invalid state transition in the session FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Proof-of-possession header could not be produced
    #[error("DPoP proof error: {0}")]
    Proof(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] session_store::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AuthError {
    /// Returns true if this error is transient and the caller may retry.
    ///
    /// This crate never retries on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            AuthError::TokenEndpoint { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    /// Returns true if the session is gone and the user has to log in again.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AuthError::Unauthenticated)
    }
}

impl From<habitat_config_and_utils::CoreError> for AuthError {
    fn from(e: habitat_config_and_utils::CoreError) -> Self {
        AuthError::Config(e.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
