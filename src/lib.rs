//! # credrefresh
//!
//! A pool of database workers that keep querying while their credentials are
//! rotated underneath them. Credentials are short-lived logins issued by
//! HashiCorp Vault's database secrets engine; a single refresher task fetches a
//! new pair, opens a new connection and hands it to every worker at a
//! barrier, so no worker ever queries through a half-replaced connection.
//!
//! ## Architecture
//!
//! ```text
//! Workers (T1..TC) ──check in every K cycles──▶ RefreshGate ──wake──▶ Refresher
//!        ▲                                          │                     │
//!        └──────── broadcast new connection ◀───────┘◀── Vault + Postgres ┘
//!                                                   │
//!                              failure ──▶ FatalSignal ──▶ Supervisor ──▶ exit
//! ```
//!
//! ## Core Components
//!
//! - **Coordination**: gate, workers, refresher and supervisor ([`coordination`])
//! - **Secrets**: credential providers, Vault in production ([`secrets`])
//! - **Storage**: connection factory and the worker query ([`storage`])
//! - **Configuration**: layered file/env/CLI settings ([`config`])
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use credrefresh::config::AppConfig;
//! use credrefresh::coordination::RefreshCoordinator;
//! use credrefresh::secrets::VaultCredentialProvider;
//! use credrefresh::storage::{PgConnectionFactory, PgUserLookup};
//!
//! #[tokio::main]
//! async fn main() -> credrefresh::Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let provider = Arc::new(VaultCredentialProvider::new(config.vault.clone()).await?);
//!     let factory = Arc::new(PgConnectionFactory::new(config.database.clone())?);
//!     let executor = Arc::new(PgUserLookup::new(config.database.lookup_user.clone()));
//!
//!     let running =
//!         RefreshCoordinator::new(config.coordinator, provider, factory, executor)?.launch();
//!     let report = running.supervise(async { let _ = tokio::signal::ctrl_c().await; }).await;
//!     std::process::exit(report.exit.exit_code());
//! }
//! ```

pub mod cli;
pub mod config;
pub mod coordination;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use coordination::{RefreshCoordinator, SupervisorExit};
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
