//! Credential acquisition.
//!
//! The refresher is the only caller of this module. It asks a
//! [`CredentialProvider`] for a fresh [`DbCredentials`] pair every refresh round
//! and hands the pair to the connection factory.
//!
//! # Supported Backends
//!
//! - **HashiCorp Vault**: dynamic credentials from the database secrets engine
//! - **Static**: a fixed pair, for local development
//!
//! # Security Considerations
//!
//! - Passwords are wrapped in [`SecretString`] and never logged
//! - Secret memory is zeroed on drop
//! - Failures carry the credential path, never the credential

pub mod error;
pub mod provider;
pub mod types;
pub mod vault;

pub use error::{Result, SecretsError};
pub use provider::{CredentialProvider, StaticCredentialProvider};
pub use types::{DbCredentials, SecretString};
pub use vault::{VaultConfig, VaultCredentialProvider};
