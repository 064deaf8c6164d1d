//! The per-cycle unit of work a worker performs.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::fmt;

use super::error::{Result, StorageError};
use crate::coordination::WorkerId;

/// Runs one fixed statement against a connection handle.
#[async_trait]
pub trait QueryExecutor<H: Send + Sync>: Send + Sync + 'static {
    /// Row returned by a successful run.
    type Row: fmt::Debug + Send;

    async fn run(&self, worker: WorkerId, handle: &H) -> Result<Self::Row>;
}

/// Looks up a single user name in `test_users`.
#[derive(Debug, Clone)]
pub struct PgUserLookup {
    lookup_name: String,
}

impl PgUserLookup {
    pub const STATEMENT: &'static str = "SELECT uname FROM test_users WHERE uname = $1 LIMIT 1";

    pub fn new(lookup_name: impl Into<String>) -> Self {
        Self { lookup_name: lookup_name.into() }
    }

    pub fn lookup_name(&self) -> &str {
        &self.lookup_name
    }
}

#[async_trait]
impl QueryExecutor<PgPool> for PgUserLookup {
    type Row = Option<String>;

    async fn run(&self, worker: WorkerId, handle: &PgPool) -> Result<Option<String>> {
        let row = sqlx::query_scalar::<_, String>(Self::STATEMENT)
            .bind(&self.lookup_name)
            .fetch_optional(handle)
            .await
            .map_err(|e| {
                tracing::warn!(worker = %worker, sql = Self::STATEMENT, error = %e, "Could not execute the statement");
                StorageError::from(e)
            })?;

        tracing::debug!(worker = %worker, user = ?row, "Got user");
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_is_parameterised() {
        let lookup = PgUserLookup::new("ashay");
        assert_eq!(lookup.lookup_name(), "ashay");
        assert!(PgUserLookup::STATEMENT.contains("$1"));
        assert!(PgUserLookup::STATEMENT.ends_with("LIMIT 1"));
    }
}
