//! # Connection Factory
//!
//! Builds database handles from freshly issued credentials.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use super::error::{Result, StorageError};
use crate::config::DatabaseConfig;
use crate::secrets::DbCredentials;

/// Creates connection handles for a fixed target from changing credentials.
///
/// Only the refresher calls [`ConnectionFactory::connect`]. The returned handle
/// is published to every worker, so it must be cheap to clone and safe to use
/// from several tasks at once.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Opaque connection handle shared with workers.
    type Handle: Clone + Send + Sync + 'static;

    /// Open a connection with the given credentials.
    async fn connect(&self, credentials: &DbCredentials) -> Result<Self::Handle>;

    /// Retire a handle that a newer refresh replaced.
    async fn close(&self, _handle: Self::Handle) {}

    /// Short description of the target, for logs. Must not contain secrets.
    fn describe(&self) -> String {
        "connection factory".to_string()
    }
}

/// PostgreSQL connection factory.
///
/// Each handle is a small `sqlx` pool bound to one credential pair, sized so
/// every worker can hold a connection at the same time.
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    config: DatabaseConfig,
}

impl PgConnectionFactory {
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        validate_config(&config)?;
        Ok(Self { config })
    }

    fn connect_options(&self, credentials: &DbCredentials) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .database(&self.config.name)
            .username(&credentials.username)
            .password(credentials.password.expose_secret())
            .application_name(crate::APP_NAME)
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Handle = PgPool;

    async fn connect(&self, credentials: &DbCredentials) -> Result<PgPool> {
        let pool_options = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.connect_timeout())
            .test_before_acquire(true);

        let connect = pool_options.connect_with(self.connect_options(credentials));

        // connect_with opens the first connection eagerly so a rejected login
        // surfaces here rather than on a worker's first query
        let pool = match tokio::time::timeout(self.config.connect_timeout(), connect).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => {
                tracing::error!(
                    error = %e,
                    db = %sanitize_target(&self.config, &credentials.username),
                    "Failed to connect to database"
                );
                return Err(StorageError::from(e));
            }
            Err(_) => {
                let duration_ms = self.config.connect_timeout().as_millis() as u64;
                tracing::error!(
                    db = %sanitize_target(&self.config, &credentials.username),
                    timeout_ms = duration_ms,
                    "Timed out connecting to database"
                );
                return Err(StorageError::ConnectTimeout { duration_ms });
            }
        };

        tracing::info!(
            db = %sanitize_target(&self.config, &credentials.username),
            max_connections = self.config.max_connections,
            connect_timeout_ms = self.config.connect_timeout().as_millis(),
            "Got database handle"
        );

        Ok(pool)
    }

    async fn close(&self, handle: PgPool) {
        let stats = get_handle_stats(&handle);
        tracing::debug!(
            size = stats.size,
            idle = stats.idle,
            active = stats.active(),
            "Closing replaced database handle"
        );
        handle.close().await;
    }

    fn describe(&self) -> String {
        format!("postgresql://{}:{}/{}", self.config.host, self.config.port, self.config.name)
    }
}

/// Validate database configuration
fn validate_config(config: &DatabaseConfig) -> Result<()> {
    if config.host.is_empty() {
        return Err(StorageError::invalid_config("database host cannot be empty"));
    }

    if config.name.is_empty() {
        return Err(StorageError::invalid_config("database name cannot be empty"));
    }

    if config.max_connections == 0 {
        return Err(StorageError::invalid_config("max_connections must be greater than 0"));
    }

    Ok(())
}

/// Render the target for logging with the password masked.
fn sanitize_target(config: &DatabaseConfig, username: &str) -> String {
    format!("postgresql://{}:***@{}:{}/{}", username, config.host, config.port, config.name)
}

/// Handle statistics for monitoring
pub fn get_handle_stats(pool: &PgPool) -> HandleStats {
    HandleStats { size: pool.size(), idle: pool.num_idle(), closed: pool.is_closed() }
}

/// Handle statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleStats {
    /// Open connections behind the handle
    pub size: u32,
    /// Connections not checked out by a worker
    pub idle: usize,
    /// Whether the handle was retired
    pub closed: bool,
}

impl HandleStats {
    /// Connections currently in use by workers
    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle as u32)
    }
}
