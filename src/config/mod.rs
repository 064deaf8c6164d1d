//! # Configuration Management
//!
//! Layered configuration: built-in defaults, an optional file, environment
//! variables, then command-line flags (applied by [`crate::cli`]).

pub mod settings;

pub use settings::{
    AppConfig, CoordinatorConfig, DatabaseConfig, ObservabilityConfig, ENV_PREFIX, ENV_SEPARATOR,
};
