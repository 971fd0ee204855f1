//! Error types for session management
//!
//! Each concern gets its own enum so callers can match on the failures they
//! actually care about:
//!
//! - [`ConfigError`]: configuration could not be loaded or is invalid
//! - [`StoreError`]: the persistent key-value store failed
//! - [`EndpointError`]: the OAuth token endpoint call failed
//! - [`LoginError`]: user-facing login failure taxonomy

use thiserror::Error;

use crate::types::OAuthErrorBody;

/// OAuth error code for unknown or misconfigured clients
pub const INVALID_CLIENT: &str = "invalid_client";

/// OAuth error code for wrong resource-owner credentials
pub const INVALID_GRANT: &str = "invalid_grant";

/// Server-side error code emitted when the OAuth encryption key is missing
pub const NO_ENCRYPTION_KEY: &str = "no_encryption_key";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value is missing
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    /// A value is present but cannot be used
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Name of the offending field or variable
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Configuration file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Invalid config format: {0}")]
    Format(String),
}

/// Persistent key-value store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Platform keychain access failed
    #[error("Keychain access failed: {0}")]
    Keychain(String),

    /// Any other backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Token endpoint call errors
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The server answered with a non-success status
    #[error("Token endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Parsed OAuth error body, when the server sent one
        body: Option<OAuthErrorBody>,
    },

    /// No response arrived (connection failure or timeout)
    #[error("No response from token endpoint: {0}")]
    NoResponse(String),

    /// Request could not be built or the response could not be parsed
    #[error("{0}")]
    Other(String),
}

impl EndpointError {
    /// HTTP status code, if the server answered
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// OAuth `error` code from the response body, if any
    #[must_use]
    pub fn oauth_code(&self) -> Option<&str> {
        match self {
            Self::Status { body: Some(body), .. } => Some(body.error.as_str()),
            _ => None,
        }
    }

    /// Whether a refresh token should be considered permanently rejected.
    ///
    /// Only HTTP 400 and 401 qualify; network failures and 5xx never do.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.status(), Some(400 | 401))
    }
}

/// Login failures, worded for direct display
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoginError {
    /// OAuth client id/secret are absent
    #[error("OAuth client credentials are not configured. Set the client ID and secret before signing in.")]
    CredentialsNotConfigured,

    /// Server rejected the OAuth client itself
    #[error("Invalid OAuth client credentials. Check the configured client ID and secret.")]
    InvalidClient,

    /// Wrong email or password
    #[error("Invalid email or password")]
    InvalidGrant,

    /// Server has no OAuth encryption key
    #[error("The server is missing its OAuth encryption key. An administrator must generate the OAuth private/public key pair and encryption key on the server.")]
    MissingEncryptionKey,

    /// 401 with an unrecognised error code
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// 400 response
    #[error("{}", or_default(.0.as_deref(), "Invalid request"))]
    InvalidRequest(Option<String>),

    /// Request never got an answer
    #[error("No response from server. Check your connection and the configured base URL.")]
    NoResponse,

    /// Anything else, message passed through
    #[error("{}", or_default(Some(.0.as_str()), "Login failed. Please try again."))]
    Other(String),
}

fn or_default<'a>(message: Option<&'a str>, fallback: &'a str) -> &'a str {
    message.filter(|m| !m.is_empty()).unwrap_or(fallback)
}

impl LoginError {
    /// Map a token endpoint failure onto the login taxonomy
    #[must_use]
    pub fn from_endpoint(err: &EndpointError) -> Self {
        match err {
            EndpointError::Status { status: 401, body } => {
                match body.as_ref().map(|b| b.error.as_str()) {
                    Some(INVALID_CLIENT) => Self::InvalidClient,
                    Some(INVALID_GRANT) => Self::InvalidGrant,
                    Some(NO_ENCRYPTION_KEY) => Self::MissingEncryptionKey,
                    _ => Self::AuthenticationFailed,
                }
            }
            EndpointError::Status { status: 400, body } => Self::InvalidRequest(
                body.as_ref()
                    .and_then(|b| b.error_description.clone())
                    .filter(|d| !d.is_empty()),
            ),
            EndpointError::NoResponse(_) => Self::NoResponse,
            other => Self::Other(other.to_string()),
        }
    }
}
