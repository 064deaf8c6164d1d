//! Error types for connection establishment and query execution.

use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// SQLSTATE codes Postgres uses for rejected logins.
const INVALID_PASSWORD: &str = "28P01";
const INVALID_AUTHORIZATION: &str = "28000";

/// Errors raised by the connection factory and the query executor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The database rejected the credentials.
    #[error("Authentication rejected: {message}")]
    AuthenticationRejected { message: String },

    /// The database host could not be reached.
    #[error("Connection failed: {message}")]
    ConnectFailed { message: String },

    /// Establishing the connection took too long.
    #[error("Connection timed out after {duration_ms}ms")]
    ConnectTimeout { duration_ms: u64 },

    /// The handle was closed (typically replaced by a newer refresh).
    #[error("Connection handle closed")]
    HandleClosed,

    /// The statement failed.
    #[error("Query failed: {message}")]
    QueryFailed { message: String },

    /// Invalid connection parameters.
    #[error("Invalid connection configuration: {message}")]
    InvalidConfig { message: String },
}

impl StorageError {
    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::ConnectFailed { message: message.into() }
    }

    pub fn authentication_rejected(message: impl Into<String>) -> Self {
        Self::AuthenticationRejected { message: message.into() }
    }

    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed { message: message.into() }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Errors that mean no usable connection could be obtained.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            StorageError::AuthenticationRejected { .. }
                | StorageError::ConnectFailed { .. }
                | StorageError::ConnectTimeout { .. }
                | StorageError::InvalidConfig { .. }
        )
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) => {
                let code = db.code();
                if matches!(code.as_deref(), Some(INVALID_PASSWORD) | Some(INVALID_AUTHORIZATION))
                {
                    StorageError::authentication_rejected(db.message().to_string())
                } else {
                    StorageError::query_failed(error.to_string())
                }
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StorageError::connect_failed(error.to_string()),
            sqlx::Error::Configuration(_) => StorageError::invalid_config(error.to_string()),
            sqlx::Error::PoolClosed => StorageError::HandleClosed,
            sqlx::Error::PoolTimedOut => StorageError::ConnectTimeout { duration_ms: 0 },
            _ => StorageError::query_failed(error.to_string()),
        }
    }
}
