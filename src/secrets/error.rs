//! Error types for credential acquisition.

use thiserror::Error;

/// Result type for credential provider operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors raised while fetching database credentials from a secrets backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretsError {
    /// The credential path does not exist in the backend.
    #[error("Credentials not found: {path}")]
    NotFound { path: String },

    /// The backend could not be reached.
    #[error("Backend connection failed: {message}")]
    ConnectionFailed { message: String },

    /// The access token was rejected (invalid, expired or lacking policy).
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The backend answered but the payload is unusable.
    #[error("Malformed credentials: {reason}")]
    InvalidValue { reason: String },

    /// Backend-specific error.
    #[error("Backend error: {message}")]
    BackendError { message: String },

    /// Provider configuration error.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl SecretsError {
    /// Create a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: message.into() }
    }

    /// Create an authentication failed error.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    /// Create an invalid value error.
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue { reason: reason.into() }
    }

    /// Create a backend error.
    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::BackendError { message: message.into() }
    }

    /// Create a config error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }
}
