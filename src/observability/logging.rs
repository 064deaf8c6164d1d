//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` wins over the
//! configured level.

use crate::config::ObservabilityConfig;
use crate::errors::{CredRefreshError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Build the level filter from `RUST_LOG`, falling back to `default_level`.
pub fn env_filter(default_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| {
            CredRefreshError::config(format!("Invalid log level '{}': {}", default_level, e))
        }),
    }
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed (tests).
pub fn init_logging(config: &ObservabilityConfig) -> Result<bool> {
    let filter = env_filter(&config.log_level)?;

    let installed = if config.json_logging {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .with_thread_names(true)
            .try_init()
            .is_ok()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
    };

    Ok(installed)
}

/// Log the effective configuration without secrets.
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        workers = config.coordinator.worker_count,
        refresh_every = config.coordinator.refresh_every,
        cycle_interval_ms = config.coordinator.cycle_interval_ms,
        max_cycles = ?config.coordinator.max_cycles,
        refresh_wait_timeout_seconds = config.coordinator.refresh_wait_timeout_seconds,
        vault_addr = %config.vault.address,
        vault_path = %config.vault.creds_path(),
        vault_token_set = config.vault.token.is_some(),
        db_host = %config.database.host,
        db_port = config.database.port,
        db_name = %config.database.name,
        "Configuration loaded"
    );
}
