//! Common test utilities for all integration tests.
//!
//! In-memory stand-ins for the credential provider, the connection factory and
//! the worker query, so coordination can be exercised without Vault or
//! PostgreSQL.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use async_trait::async_trait;
use credrefresh::config::CoordinatorConfig;
use credrefresh::coordination::WorkerId;
use credrefresh::secrets::{self, CredentialProvider, DbCredentials, SecretsError};
use credrefresh::storage::{self, ConnectionFactory, QueryExecutor, StorageError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Password every scripted credential carries. Must never show up in logs.
pub const TEST_PASSWORD: &str = "pw-do-not-log";

/// Coordinator settings for fast in-memory runs.
pub fn fast_config(workers: usize, refresh_every: u64, max_cycles: u64) -> CoordinatorConfig {
    CoordinatorConfig {
        worker_count: workers,
        refresh_every,
        cycle_interval_ms: 0,
        max_cycles: Some(max_cycles),
        refresh_wait_timeout_seconds: 30,
        shutdown_grace_seconds: 5,
        status_interval_seconds: 1,
    }
}

/// Provider that replays a script, then mints `v-user-N` pairs.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<DbCredentials, SecretsError>>>,
    calls: AtomicU64,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_first(error: SecretsError) -> Self {
        let provider = Self::new();
        provider.push(Err(error));
        provider
    }

    pub fn push(&self, result: Result<DbCredentials, SecretsError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for ScriptedProvider {
    async fn fetch(&self) -> secrets::Result<DbCredentials> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(DbCredentials::new(format!("v-user-{n}"), TEST_PASSWORD)))
    }

    fn describe(&self) -> String {
        "scripted provider".to_string()
    }
}

/// Provider whose fetch never completes.
pub struct StalledProvider;

#[async_trait]
impl CredentialProvider for StalledProvider {
    async fn fetch(&self) -> secrets::Result<DbCredentials> {
        std::future::pending().await
    }
}

/// Factory that hands out `H1`, `H2`, ... and records closed handles.
#[derive(Default)]
pub struct LabelFactory {
    connects: AtomicU64,
    fail_on: Option<u64>,
    closed: Mutex<Vec<String>>,
    users: Mutex<Vec<String>>,
}

impl LabelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the `n`th connect (1-based).
    pub fn failing_on(n: u64) -> Self {
        Self { fail_on: Some(n), ..Self::default() }
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    /// Usernames the factory was asked to log in with, in order.
    pub fn users(&self) -> Vec<String> {
        self.users.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionFactory for LabelFactory {
    type Handle = String;

    async fn connect(&self, credentials: &DbCredentials) -> storage::Result<String> {
        let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.users.lock().unwrap().push(credentials.username.clone());
        if self.fail_on == Some(n) {
            return Err(StorageError::authentication_rejected(format!(
                "password authentication failed for user \"{}\"",
                credentials.username
            )));
        }
        Ok(format!("H{n}"))
    }

    async fn close(&self, handle: String) {
        self.closed.lock().unwrap().push(handle);
    }

    fn describe(&self) -> String {
        "label factory".to_string()
    }
}

/// One executed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    pub worker: WorkerId,
    pub handle: String,
}

/// Executor that records every query in global order.
#[derive(Default)]
pub struct RecordingExecutor {
    records: Mutex<Vec<QueryRecord>>,
    fail_for: Option<WorkerId>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query issued by `worker` fails; other workers succeed.
    pub fn failing_for(worker: WorkerId) -> Self {
        Self { fail_for: Some(worker), ..Self::default() }
    }

    pub fn records(&self) -> Vec<QueryRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Handles used by one worker, in order.
    pub fn handles_for(&self, worker: WorkerId) -> Vec<String> {
        self.records().into_iter().filter(|r| r.worker == worker).map(|r| r.handle).collect()
    }
}

#[async_trait]
impl QueryExecutor<String> for RecordingExecutor {
    type Row = Option<String>;

    async fn run(&self, worker: WorkerId, handle: &String) -> storage::Result<Option<String>> {
        self.records.lock().unwrap().push(QueryRecord { worker, handle: handle.clone() });
        if self.fail_for == Some(worker) {
            return Err(StorageError::query_failed("relation \"test_users\" does not exist"));
        }
        Ok(Some("ashay".to_string()))
    }
}
