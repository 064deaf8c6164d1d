//! # Error Handling
//!
//! Error types for the credential refresh coordinator. Each subsystem keeps its
//! own `thiserror` enum (`SecretsError`, `StorageError`, `GateError`); this module
//! folds them into the crate-level [`CredRefreshError`].

pub mod types;

pub use types::{CredRefreshError, Result};

/// Crate-level error alias used by the binary and the re-exports in `lib.rs`
pub type Error = CredRefreshError;
