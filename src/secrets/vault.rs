//! HashiCorp Vault credential provider.
//!
//! Reads dynamic database credentials from Vault's database secrets engine.
//! Each read of `<mount>/creds/<role>` makes Vault create a new database login
//! with its own lease, which is exactly the short-lived pair the refresher
//! installs.
//!
//! # Configuration
//!
//! - Vault server address (HTTPS recommended)
//! - Access token
//! - Optional namespace for multi-tenancy
//! - Database engine mount path (default: "postgresql") and role (default: "readonly")
//!
//! # Example
//!
//! ```rust,ignore
//! use credrefresh::secrets::{CredentialProvider, VaultConfig, VaultCredentialProvider};
//!
//! let provider = VaultCredentialProvider::new(VaultConfig::default()).await?;
//! let creds = provider.fetch().await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;

use super::error::{Result, SecretsError};
use super::provider::CredentialProvider;
use super::types::{DbCredentials, SecretString};

/// Configuration for the Vault credential provider.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault server address (e.g., "https://vault.example.com:8200")
    #[validate(length(min = 1, message = "Vault address cannot be empty"))]
    pub address: String,

    /// Vault access token
    pub token: Option<SecretString>,

    /// Vault namespace (for Enterprise multi-tenancy)
    pub namespace: Option<String>,

    /// Mount path of the database secrets engine
    #[validate(length(min = 1, message = "Vault database mount cannot be empty"))]
    pub database_mount: String,

    /// Role whose credentials are generated
    #[validate(length(min = 1, message = "Vault role cannot be empty"))]
    pub role: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:8200".to_string(),
            token: None,
            namespace: None,
            database_mount: "postgresql".to_string(),
            role: "readonly".to_string(),
        }
    }
}

impl VaultConfig {
    /// Path read on every fetch, e.g. `postgresql/creds/readonly`.
    pub fn creds_path(&self) -> String {
        format!("{}/creds/{}", self.database_mount, self.role)
    }

    /// Fill unset fields from the standard Vault environment variables.
    ///
    /// - `VAULT_ADDR`, `VAULT_TOKEN`, `VAULT_NAMESPACE`
    ///
    /// Values already present in the configuration win.
    pub fn with_env_fallbacks(mut self) -> Self {
        if self.token.is_none() {
            self.token = std::env::var("VAULT_TOKEN").ok().map(SecretString::new);
        }
        if self.namespace.is_none() {
            self.namespace = std::env::var("VAULT_NAMESPACE").ok();
        }
        if self.address == VaultConfig::default().address {
            if let Ok(address) = std::env::var("VAULT_ADDR") {
                self.address = address;
            }
        }
        self
    }
}

/// Credential provider backed by Vault's database secrets engine.
///
/// # Thread Safety
///
/// The client is `Send + Sync`; it is only ever driven by the refresher task.
pub struct VaultCredentialProvider {
    client: VaultClient,
    address: String,
    mount: String,
    role: String,
}

impl std::fmt::Debug for VaultCredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCredentialProvider")
            .field("address", &self.address)
            .field("mount", &self.mount)
            .field("role", &self.role)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl VaultCredentialProvider {
    /// Creates a provider and checks that Vault is reachable.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::ConfigError`] if the configuration is invalid
    /// - [`SecretsError::ConnectionFailed`] if the health check fails
    pub async fn new(config: VaultConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(SecretsError::config_error("Vault address cannot be empty"));
        }

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(ref token) = config.token {
            settings_builder.token(token.expose_secret());
        }

        if let Some(namespace) = config.namespace.clone() {
            settings_builder.namespace(Some(namespace));
        }

        let settings = settings_builder.build().map_err(|e| {
            SecretsError::config_error(format!("Invalid Vault configuration: {}", e))
        })?;

        let client = VaultClient::new(settings).map_err(|e| {
            SecretsError::connection_failed(format!("Failed to create Vault client: {}", e))
        })?;

        match vaultrs::sys::health(&client).await {
            Ok(_) => {
                tracing::info!(address = %config.address, "Successfully connected to Vault");
            }
            Err(e) => {
                tracing::error!(error = %e, address = %config.address, "Failed to connect to Vault");
                return Err(SecretsError::connection_failed(format!(
                    "Vault health check failed: {}",
                    e
                )));
            }
        }

        Ok(Self {
            client,
            address: config.address,
            mount: config.database_mount,
            role: config.role,
        })
    }

    fn creds_path(&self) -> String {
        format!("{}/creds/{}", self.mount, self.role)
    }
}

/// Map a Vault client error onto the provider error taxonomy.
pub(crate) fn classify_vault_error(path: &str, error: ClientError) -> SecretsError {
    match error {
        ClientError::APIError { code: 401 | 403, errors } => SecretsError::authentication_failed(
            format!("Vault denied access to '{}': {}", path, errors.join("; ")),
        ),
        ClientError::APIError { code: 404, .. } => SecretsError::not_found(path),
        ClientError::APIError { code, errors } => SecretsError::backend_error(format!(
            "Vault returned {} for '{}': {}",
            code,
            path,
            errors.join("; ")
        )),
        ClientError::RestClientError { source } => {
            SecretsError::connection_failed(format!("Vault request failed: {}", source))
        }
        other => SecretsError::backend_error(other.to_string()),
    }
}

#[async_trait]
impl CredentialProvider for VaultCredentialProvider {
    async fn fetch(&self) -> Result<DbCredentials> {
        let path = self.creds_path();

        let response = vaultrs::database::role::creds(&self.client, &self.mount, &self.role)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, path = %path, "Failed to read database credentials from Vault");
                classify_vault_error(&path, e)
            })?;

        if response.username.is_empty() {
            return Err(SecretsError::invalid_value(format!(
                "Vault returned an empty username for '{}'",
                path
            )));
        }

        tracing::info!(path = %path, username = %response.username, "Fetched database credentials from Vault");

        Ok(DbCredentials::new(response.username, response.password))
    }

    fn describe(&self) -> String {
        format!("vault {} ({})", self.address, self.creds_path())
    }
}
