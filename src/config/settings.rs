//! # Configuration Settings
//!
//! Defines the configuration structure for the credential refresher.

use crate::errors::{CredRefreshError, Result};
use crate::secrets::VaultConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Prefix for environment overrides, e.g. `CREDREFRESH__COORDINATOR__WORKER_COUNT`.
pub const ENV_PREFIX: &str = "CREDREFRESH";

/// Separator between the prefix and nested keys.
pub const ENV_SEPARATOR: &str = "__";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Worker pool and refresh protocol settings
    #[validate(nested)]
    pub coordinator: CoordinatorConfig,

    /// Credential source
    #[validate(nested)]
    pub vault: VaultConfig,

    /// Database target
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Later sources win: built-in defaults, then the file (YAML, TOML or JSON,
    /// chosen by extension), then `CREDREFRESH__SECTION__KEY` variables. Unset
    /// Vault fields finally fall back to `VAULT_ADDR`, `VAULT_TOKEN` and
    /// `VAULT_NAMESPACE`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(CredRefreshError::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        config.vault = config.vault.with_env_fallbacks();

        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(CredRefreshError::from)?;

        self.validate_custom()?;

        Ok(())
    }

    /// Cross-field checks the derive cannot express
    fn validate_custom(&self) -> Result<()> {
        if self.coordinator.max_cycles == Some(0) {
            return Err(CredRefreshError::validation_field(
                "max_cycles must be at least 1 when set",
                "coordinator.max_cycles",
            ));
        }

        if let Some(port) = self.observability.metrics_port {
            if port == self.database.port {
                return Err(CredRefreshError::validation_field(
                    "Metrics port cannot be the database port",
                    "observability.metrics_port",
                ));
            }
        }

        if (self.database.max_connections as usize) < self.coordinator.worker_count {
            tracing::warn!(
                max_connections = self.database.max_connections,
                workers = self.coordinator.worker_count,
                "Fewer pooled connections than workers; workers will queue for connections"
            );
        }

        Ok(())
    }
}

/// Worker pool and refresh round settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Number of workers (C)
    #[validate(range(min = 1, max = 256, message = "Worker count must be between 1 and 256"))]
    pub worker_count: usize,

    /// Cycles between refresh check-ins (K)
    #[validate(range(min = 1, message = "Refresh interval must be at least 1 cycle"))]
    pub refresh_every: u64,

    /// Pause between worker cycles in milliseconds (0 = no pause)
    #[validate(range(max = 3_600_000, message = "Cycle interval cannot exceed one hour"))]
    pub cycle_interval_ms: u64,

    /// Stop each worker after this many cycles (unset = run until shutdown)
    pub max_cycles: Option<u64>,

    /// Longest a worker waits for a refresh before withdrawing (0 = forever)
    pub refresh_wait_timeout_seconds: u64,

    /// Time given to tasks to stop after shutdown begins
    #[validate(range(
        min = 1,
        max = 300,
        message = "Shutdown grace must be between 1 and 300 seconds"
    ))]
    pub shutdown_grace_seconds: u64,

    /// Interval of the supervisor's status log line
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Status interval must be between 1 and 3600 seconds"
    ))]
    pub status_interval_seconds: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            refresh_every: 20,
            cycle_interval_ms: 1000,
            max_cycles: None,
            refresh_wait_timeout_seconds: 120,
            shutdown_grace_seconds: 5,
            status_interval_seconds: 2,
        }
    }
}

impl CoordinatorConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    /// `None` when waits are unbounded.
    pub fn refresh_wait_timeout(&self) -> Option<Duration> {
        match self.refresh_wait_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_seconds)
    }
}

/// Database target configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database host
    #[validate(length(min = 1, message = "Database host cannot be empty"))]
    pub host: String,

    /// Database port
    #[validate(range(min = 1, message = "Database port must be between 1 and 65535"))]
    pub port: u16,

    /// Database name
    #[validate(length(min = 1, message = "Database name cannot be empty"))]
    pub name: String,

    /// Connections per credential generation
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Connect timeout must be between 1 and 300 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Name looked up by every worker cycle
    #[validate(length(min = 1, message = "Lookup user cannot be empty"))]
    pub lookup_user: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "postgres".to_string(),
            max_connections: 4,
            connect_timeout_seconds: 10,
            lookup_user: "ashay".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter used when `RUST_LOG` is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit logs as JSON
    pub json_logging: bool,

    /// Serve Prometheus metrics on this port (unset = disabled)
    pub metrics_port: Option<u16>,

    /// Service name attached to every metric
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            metrics_port: None,
            service_name: crate::APP_NAME.to_string(),
        }
    }
}
