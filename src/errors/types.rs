//! # Error Types
//!
//! Crate-level error type for the credential refresh coordinator using `thiserror`.

use crate::coordination::{GateError, FATAL_EXIT_CODE};
use crate::secrets::SecretsError;
use crate::storage::StorageError;

/// Custom result type for credrefresh operations
pub type Result<T> = std::result::Result<T, CredRefreshError>;

/// Main error type for the credential refresh coordinator
#[derive(thiserror::Error, Debug)]
pub enum CredRefreshError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Credential provider errors
    #[error("Credential acquisition failed: {0}")]
    Credentials(#[from] SecretsError),

    /// Connection factory and query errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Refresh gate errors
    #[error("Refresh gate error: {0}")]
    Gate(#[from] GateError),

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CredRefreshError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether this error terminates the process when raised by the refresher.
    ///
    /// Credential and connection acquisition failures have no degraded mode.
    pub fn is_fatal(&self) -> bool {
        match self {
            CredRefreshError::Credentials(_) => true,
            CredRefreshError::Storage(e) => e.is_acquisition_failure(),
            _ => false,
        }
    }

    /// Process exit code when this error stops the binary before supervision.
    ///
    /// Credential or connection acquisition failures exit like a fatal run;
    /// everything else is a startup error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CredRefreshError::Storage(StorageError::InvalidConfig { .. })
            | CredRefreshError::Credentials(SecretsError::ConfigError { .. }) => 1,
            e if e.is_fatal() => FATAL_EXIT_CODE,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for CredRefreshError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<sqlx::Error> for CredRefreshError {
    fn from(error: sqlx::Error) -> Self {
        Self::Storage(StorageError::from(error))
    }
}

impl From<config::ConfigError> for CredRefreshError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for CredRefreshError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect();

        // Nested section errors are reported under their section name
        for (section, kind) in errors.errors() {
            if let validator::ValidationErrorsKind::Struct(nested) = kind {
                for (field, field_errors) in nested.field_errors() {
                    let error_messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map_or("Invalid value".to_string(), |m| m.to_string())
                        })
                        .collect();
                    fields.push(format!("{}.{}: {}", section, field, error_messages.join(", ")));
                }
            }
        }

        Self::validation(format!("Validation failed: {}", fields.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = CredRefreshError::config("Test configuration error");
        assert!(matches!(error, CredRefreshError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: Test configuration error");
    }

    #[test]
    fn test_validation_error_field() {
        let error = CredRefreshError::validation_field("must be positive", "refresh_every");
        if let CredRefreshError::Validation { field, .. } = error {
            assert_eq!(field, Some("refresh_every".to_string()));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_fatal_classification() {
        let err: CredRefreshError = SecretsError::authentication_failed("token expired").into();
        assert!(err.is_fatal());

        let err: CredRefreshError = StorageError::connect_failed("auth rejected").into();
        assert!(err.is_fatal());

        let err: CredRefreshError = StorageError::query_failed("syntax error").into();
        assert!(!err.is_fatal());

        assert!(!CredRefreshError::config("bad").is_fatal());
    }

    #[test]
    fn test_startup_exit_codes() {
        let err: CredRefreshError = SecretsError::connection_failed("vault sealed").into();
        assert_eq!(err.exit_code(), FATAL_EXIT_CODE);

        let err: CredRefreshError = StorageError::connect_failed("connection refused").into();
        assert_eq!(err.exit_code(), FATAL_EXIT_CODE);

        let err: CredRefreshError = StorageError::invalid_config("empty host").into();
        assert_eq!(err.exit_code(), 1);
        let err: CredRefreshError = SecretsError::config_error("empty address").into();
        assert_eq!(err.exit_code(), 1);

        assert_eq!(CredRefreshError::validation("refresh_every: too small").exit_code(), 1);
        assert_eq!(CredRefreshError::config("missing file").exit_code(), 1);
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CredRefreshError = io_error.into();
        assert!(matches!(err, CredRefreshError::Io { .. }));

        let gate_error = GateError::Cancelled;
        let err: CredRefreshError = gate_error.into();
        assert!(matches!(err, CredRefreshError::Gate(GateError::Cancelled)));
    }
}
