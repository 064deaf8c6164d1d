//! Credential provider trait.

use async_trait::async_trait;

use super::error::Result;
use super::types::DbCredentials;

/// Source of short-lived database credentials.
///
/// Only the refresher calls [`CredentialProvider::fetch`]; workers never talk
/// to the secrets backend. Every call is expected to mint (or look up) a fresh
/// credential pair.
///
/// # Security
///
/// Implementations MUST NOT log the password.
#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    /// Fetch a username/password pair.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::ConnectionFailed`](super::SecretsError::ConnectionFailed) if the backend is unreachable
    /// - [`SecretsError::AuthenticationFailed`](super::SecretsError::AuthenticationFailed) if the token is invalid or expired
    /// - [`SecretsError::InvalidValue`](super::SecretsError::InvalidValue) if the response is malformed
    async fn fetch(&self) -> Result<DbCredentials>;

    /// Short description of where credentials come from, for logs.
    fn describe(&self) -> String {
        "credential provider".to_string()
    }
}

#[async_trait]
impl<P: CredentialProvider + ?Sized> CredentialProvider for std::sync::Arc<P> {
    async fn fetch(&self) -> Result<DbCredentials> {
        (**self).fetch().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Provider that always returns the same pair.
///
/// Useful for local runs against a database with a static login.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: DbCredentials,
}

impl StaticCredentialProvider {
    pub fn new(credentials: DbCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn fetch(&self) -> Result<DbCredentials> {
        Ok(self.credentials.clone())
    }

    fn describe(&self) -> String {
        format!("static credentials for '{}'", self.credentials.username)
    }
}
