//! # Command Line Interface
//!
//! Flags override every other configuration source.

use crate::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "credrefresh")]
#[command(about = "Database workers with rotating Vault credentials")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Database host
    #[arg(short = 'l', long)]
    pub db_host: Option<String>,

    /// Database name
    #[arg(short = 'n', long)]
    pub db_name: Option<String>,

    /// Database port
    #[arg(long)]
    pub db_port: Option<u16>,

    /// Number of workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Cycles between credential refreshes
    #[arg(short = 'k', long)]
    pub refresh_every: Option<u64>,

    /// Pause between worker cycles in milliseconds
    #[arg(long)]
    pub cycle_interval_ms: Option<u64>,

    /// Stop each worker after this many cycles
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Vault address
    #[arg(long)]
    pub vault_addr: Option<String>,

    /// Vault database role
    #[arg(long)]
    pub vault_role: Option<String>,

    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// Apply flags on top of a loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.db_host {
            config.database.host = host.clone();
        }
        if let Some(name) = &self.db_name {
            config.database.name = name.clone();
        }
        if let Some(port) = self.db_port {
            config.database.port = port;
        }
        if let Some(workers) = self.workers {
            config.coordinator.worker_count = workers;
        }
        if let Some(every) = self.refresh_every {
            config.coordinator.refresh_every = every;
        }
        if let Some(interval) = self.cycle_interval_ms {
            config.coordinator.cycle_interval_ms = interval;
        }
        if let Some(cycles) = self.cycles {
            config.coordinator.max_cycles = Some(cycles);
        }
        if let Some(addr) = &self.vault_addr {
            config.vault.address = addr.clone();
        }
        if let Some(role) = &self.vault_role {
            config.vault.role = role.clone();
        }
        if self.verbose {
            config.observability.log_level = "debug".to_string();
        }
        if self.json_logs {
            config.observability.json_logging = true;
        }
    }
}
