//! Shared credential state and per-worker cursors.

use serde::Serialize;
use std::fmt;

use crate::secrets::DbCredentials;

/// Identity of one worker in the pool.
///
/// Ids are dense, `0..worker_count`, and display one-based (`T1`, `T2`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkerId(u16);

impl WorkerId {
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", u32::from(self.0) + 1)
    }
}

/// How the most recent refresh round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// No round has completed yet.
    Empty,
    /// A new connection was installed.
    Installed,
    /// Credentials or the connection could not be obtained.
    Failed,
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshOutcome::Empty => "empty",
            RefreshOutcome::Installed => "installed",
            RefreshOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value published to workers at the end of a refresh round.
///
/// Published states are immutable. A new round publishes a new value; the
/// previous one stays valid for anyone still holding it.
#[derive(Clone)]
pub struct SharedCredentialState<H> {
    round: u64,
    outcome: RefreshOutcome,
    connection: Option<H>,
    credentials: Option<DbCredentials>,
}

impl<H> SharedCredentialState<H> {
    /// State before the first round completes.
    pub fn empty() -> Self {
        Self { round: 0, outcome: RefreshOutcome::Empty, connection: None, credentials: None }
    }

    pub(crate) fn installed(round: u64, connection: H, credentials: DbCredentials) -> Self {
        Self {
            round,
            outcome: RefreshOutcome::Installed,
            connection: Some(connection),
            credentials: Some(credentials),
        }
    }

    pub(crate) fn failed(round: u64) -> Self {
        Self { round, outcome: RefreshOutcome::Failed, connection: None, credentials: None }
    }

    /// Round that produced this state. Doubles as its version.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn outcome(&self) -> RefreshOutcome {
        self.outcome
    }

    pub fn connection(&self) -> Option<&H> {
        self.connection.as_ref()
    }

    pub fn credentials(&self) -> Option<&DbCredentials> {
        self.credentials.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.username.as_str())
    }

    pub fn is_usable(&self) -> bool {
        self.outcome == RefreshOutcome::Installed && self.connection.is_some()
    }
}

impl<H> fmt::Debug for SharedCredentialState<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCredentialState")
            .field("round", &self.round)
            .field("outcome", &self.outcome)
            .field("has_connection", &self.connection.is_some())
            .field("username", &self.username())
            .finish()
    }
}

/// A worker's private view of the connection it queries through.
///
/// Cursors are owned by exactly one worker and are never shared. A worker
/// only replaces its cursor after a refresh round releases it.
pub struct WorkerCursor<H> {
    worker: WorkerId,
    version: u64,
    handle: Option<H>,
}

impl<H: Clone> WorkerCursor<H> {
    /// A cursor with no handle, as a worker holds before its first refresh.
    pub fn new(worker: WorkerId) -> Self {
        Self { worker, version: 0, handle: None }
    }

    /// Derive a cursor from a published state.
    pub fn derive(worker: WorkerId, state: &SharedCredentialState<H>) -> Self {
        Self { worker, version: state.round(), handle: state.connection().cloned() }
    }

    /// Replace this cursor with one derived from `state`.
    pub fn adopt(&mut self, state: &SharedCredentialState<H>) {
        *self = Self::derive(self.worker, state);
    }

    pub fn invalidate(&mut self) {
        self.handle = None;
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }
}

impl<H> fmt::Debug for WorkerCursor<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerCursor")
            .field("worker", &self.worker)
            .field("version", &self.version)
            .field("valid", &self.handle.is_some())
            .finish()
    }
}
