//! Integration tests for configuration management
//!
//! These tests validate layering: defaults, then a file, then
//! `CREDREFRESH__*` environment variables, then command-line flags.

use clap::Parser;
use credrefresh::cli::Cli;
use credrefresh::config::AppConfig;
use credrefresh::errors::CredRefreshError;
use credrefresh::Result;
use std::env;
use std::io::Write;
use std::sync::Mutex;

// Use a mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const TOUCHED_VARS: &[&str] = &[
    "CREDREFRESH__COORDINATOR__WORKER_COUNT",
    "CREDREFRESH__COORDINATOR__REFRESH_EVERY",
    "CREDREFRESH__DATABASE__HOST",
    "CREDREFRESH__VAULT__ROLE",
    "VAULT_ADDR",
    "VAULT_TOKEN",
];

/// Clears the variables these tests touch and restores them on drop.
struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    fn new() -> Self {
        let saved = TOUCHED_VARS.iter().map(|name| (*name, env::var(name).ok())).collect();
        for name in TOUCHED_VARS {
            env::remove_var(name);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, value) in &self.saved {
            match value {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }
    }
}

fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_defaults_without_file() -> Result<()> {
    let _lock = ENV_MUTEX.lock().unwrap();
    let _env = EnvGuard::new();

    let config = AppConfig::load(None)?;
    config.validate()?;

    assert_eq!(config.coordinator.worker_count, 4);
    assert_eq!(config.coordinator.refresh_every, 20);
    assert_eq!(config.vault.creds_path(), "postgresql/creds/readonly");
    assert_eq!(config.database.lookup_user, "ashay");
    Ok(())
}

#[test]
fn test_yaml_file_overrides_defaults() -> Result<()> {
    let _lock = ENV_MUTEX.lock().unwrap();
    let _env = EnvGuard::new();

    let file = write_file(
        ".yaml",
        r#"
coordinator:
  worker_count: 6
  refresh_every: 10
  max_cycles: 100
database:
  host: db.internal
  name: users
vault:
  address: https://vault.internal:8200
  role: reporting
"#,
    );

    let config = AppConfig::load(Some(file.path()))?;
    config.validate()?;

    assert_eq!(config.coordinator.worker_count, 6);
    assert_eq!(config.coordinator.refresh_every, 10);
    assert_eq!(config.coordinator.max_cycles, Some(100));
    assert_eq!(config.coordinator.cycle_interval_ms, 1000);
    assert_eq!(config.database.host, "db.internal");
    assert_eq!(config.database.port, 5432);
    assert_eq!(config.vault.address, "https://vault.internal:8200");
    assert_eq!(config.vault.creds_path(), "postgresql/creds/reporting");
    Ok(())
}

#[test]
fn test_json_file_is_accepted() -> Result<()> {
    let _lock = ENV_MUTEX.lock().unwrap();
    let _env = EnvGuard::new();

    let contents = serde_json::json!({
        "coordinator": { "worker_count": 2, "refresh_wait_timeout_seconds": 0 },
        "observability": { "json_logging": true, "metrics_port": 9102 }
    });
    let file = write_file(".json", &contents.to_string());

    let config = AppConfig::load(Some(file.path()))?;
    assert_eq!(config.coordinator.worker_count, 2);
    assert_eq!(config.coordinator.refresh_wait_timeout(), None);
    assert!(config.observability.json_logging);
    assert_eq!(config.observability.metrics_port, Some(9102));
    Ok(())
}

#[test]
fn test_environment_overrides_file() -> Result<()> {
    let _lock = ENV_MUTEX.lock().unwrap();
    let _env = EnvGuard::new();

    let file = write_file(".yaml", "coordinator:\n  worker_count: 6\n");
    env::set_var("CREDREFRESH__COORDINATOR__WORKER_COUNT", "9");
    env::set_var("CREDREFRESH__DATABASE__HOST", "env-db");

    let config = AppConfig::load(Some(file.path()))?;
    assert_eq!(config.coordinator.worker_count, 9);
    assert_eq!(config.database.host, "env-db");
    Ok(())
}

#[test]
fn test_vault_environment_fallbacks() -> Result<()> {
    let _lock = ENV_MUTEX.lock().unwrap();
    let _env = EnvGuard::new();

    env::set_var("VAULT_ADDR", "http://vault.local:8200");
    env::set_var("VAULT_TOKEN", "s.fallback");

    let config = AppConfig::load(None)?;
    assert_eq!(config.vault.address, "http://vault.local:8200");
    assert_eq!(config.vault.token.as_ref().map(|t| t.expose_secret()), Some("s.fallback"));
    Ok(())
}

#[test]
fn test_cli_flags_win_over_environment() -> Result<()> {
    let _lock = ENV_MUTEX.lock().unwrap();
    let _env = EnvGuard::new();

    env::set_var("CREDREFRESH__DATABASE__HOST", "env-db");
    env::set_var("CREDREFRESH__VAULT__ROLE", "env-role");

    let cli = Cli::parse_from(["credrefresh", "-l", "cli-db", "-n", "cli-name"]);
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    assert_eq!(config.database.host, "cli-db");
    assert_eq!(config.database.name, "cli-name");
    assert_eq!(config.vault.role, "env-role");
    Ok(())
}

#[test]
fn test_invalid_value_fails_validation() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let _env = EnvGuard::new();

    env::set_var("CREDREFRESH__COORDINATOR__REFRESH_EVERY", "0");

    let config = AppConfig::load(None).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, CredRefreshError::Validation { .. }));
    assert!(err.to_string().contains("refresh_every"));
}

#[test]
fn test_malformed_file_is_config_error() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let _env = EnvGuard::new();

    let file = write_file(".yaml", "coordinator:\n  worker_count: lots\n");
    let err = AppConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, CredRefreshError::Config { .. }));
}
