//! # Storage
//!
//! Connection establishment and the fixed read query workers run each cycle.
//! Both sit behind traits so the coordination layer never depends on
//! PostgreSQL directly.

pub mod error;
pub mod pool;
pub mod query;

pub use crate::config::DatabaseConfig;

pub use error::{Result, StorageError};
pub use pool::{get_handle_stats, ConnectionFactory, HandleStats, PgConnectionFactory};
pub use query::{PgUserLookup, QueryExecutor};
