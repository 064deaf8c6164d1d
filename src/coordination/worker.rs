//! Worker loop: query every cycle, park at the refresh barrier every `K` cycles.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::gate::{GateError, RefreshGate};
use super::state::{WorkerCursor, WorkerId};
use crate::observability::MetricsRecorder;
use crate::storage::QueryExecutor;

/// Where a worker is in its cycle. Used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Running,
    CheckingIn,
    WaitingForRefresh,
    Adopting,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerPhase::Running => "running",
            WorkerPhase::CheckingIn => "checking_in",
            WorkerPhase::WaitingForRefresh => "waiting_for_refresh",
            WorkerPhase::Adopting => "adopting",
        };
        f.write_str(name)
    }
}

/// What a worker did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker: Option<WorkerId>,
    pub cycles: u64,
    pub queries_ok: u64,
    pub queries_failed: u64,
    /// Cycles skipped because the worker held no connection.
    pub cycles_without_handle: u64,
    pub refreshes_adopted: u64,
    pub refresh_timeouts: u64,
    /// Round of the last state the worker adopted.
    pub last_version: u64,
}

/// Static parameters shared by every worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub refresh_every: u64,
    pub cycle_interval: Duration,
    pub max_cycles: Option<u64>,
}

/// One worker of the pool.
pub struct Worker<H, Q> {
    id: WorkerId,
    settings: WorkerSettings,
    gate: Arc<RefreshGate<H>>,
    executor: Arc<Q>,
    shutdown: CancellationToken,
    metrics: MetricsRecorder,
}

impl<H, Q> Worker<H, Q>
where
    H: Clone + Send + Sync + 'static,
    Q: QueryExecutor<H>,
{
    pub fn new(
        id: WorkerId,
        settings: WorkerSettings,
        gate: Arc<RefreshGate<H>>,
        executor: Arc<Q>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { id, settings, gate, executor, shutdown, metrics: MetricsRecorder::new() }
    }

    /// Run until shutdown or `max_cycles`.
    pub async fn run(self) -> WorkerSummary {
        let mut summary = WorkerSummary { worker: Some(self.id), ..Default::default() };
        let mut cursor = WorkerCursor::new(self.id);
        let refresh_every = self.settings.refresh_every.max(1);

        tracing::info!(worker = %self.id, "Starting worker");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            if self.settings.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            summary.cycles += 1;

            if summary.cycles % refresh_every == 0 {
                if let Err(GateError::Cancelled) = self.refresh(&mut cursor, &mut summary).await {
                    break;
                }
            }

            self.run_query(&cursor, &mut summary).await;

            if !self.pace().await {
                break;
            }
        }

        tracing::info!(
            worker = %self.id,
            cycles = summary.cycles,
            queries_ok = summary.queries_ok,
            queries_failed = summary.queries_failed,
            "Worker stopped"
        );

        summary
    }

    /// Park at the barrier and adopt whatever the round publishes.
    ///
    /// Only cancellation is returned; every other wait failure leaves the
    /// worker running without a connection.
    async fn refresh(
        &self,
        cursor: &mut WorkerCursor<H>,
        summary: &mut WorkerSummary,
    ) -> Result<(), GateError> {
        tracing::debug!(worker = %self.id, phase = %WorkerPhase::CheckingIn, cycle = summary.cycles, "Refresh wait reached");

        let ticket = match self.gate.check_in(self.id) {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::error!(worker = %self.id, error = %e, "Could not check in");
                cursor.invalidate();
                return Ok(());
            }
        };

        if ticket.quorum_reached && ticket.refresh_capable {
            self.gate.signal_refresher_wanted();
        }

        tracing::debug!(worker = %self.id, phase = %WorkerPhase::WaitingForRefresh, round = ticket.round, "Waiting for refreshed connection");

        match self.gate.await_refreshed(&ticket, &self.shutdown).await {
            Ok(state) => {
                cursor.adopt(&state);
                summary.refreshes_adopted += 1;
                summary.last_version = cursor.version();

                if cursor.is_valid() {
                    tracing::info!(
                        worker = %self.id,
                        phase = %WorkerPhase::Adopting,
                        version = cursor.version(),
                        username = state.username().unwrap_or_default(),
                        "Refreshing cursor"
                    );
                } else {
                    tracing::warn!(
                        worker = %self.id,
                        version = cursor.version(),
                        outcome = %state.outcome(),
                        "No database connection after refresh"
                    );
                }
                Ok(())
            }
            Err(GateError::Cancelled) => Err(GateError::Cancelled),
            Err(e) => {
                summary.refresh_timeouts += 1;
                tracing::warn!(worker = %self.id, round = ticket.round, error = %e, "Gave up waiting for refresh");
                self.gate.withdraw(self.id);
                cursor.invalidate();
                Ok(())
            }
        }
    }

    async fn run_query(&self, cursor: &WorkerCursor<H>, summary: &mut WorkerSummary) {
        let Some(handle) = cursor.handle() else {
            summary.cycles_without_handle += 1;
            self.metrics.record_query("no_handle");
            tracing::warn!(worker = %self.id, cycle = summary.cycles, "No cursor here");
            return;
        };

        match self.executor.run(self.id, handle).await {
            Ok(row) => {
                summary.queries_ok += 1;
                self.metrics.record_query("ok");
                tracing::debug!(worker = %self.id, phase = %WorkerPhase::Running, version = cursor.version(), row = ?row, "Query succeeded");
            }
            Err(e) => {
                summary.queries_failed += 1;
                self.metrics.record_query("error");
                tracing::warn!(worker = %self.id, version = cursor.version(), error = %e, "Query failed");
            }
        }
    }

    /// Sleep between cycles. Returns `false` if shutdown began.
    async fn pace(&self) -> bool {
        if self.settings.cycle_interval.is_zero() {
            tokio::task::yield_now().await;
            return !self.shutdown.is_cancelled();
        }

        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.settings.cycle_interval) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Result as StorageResult, StorageError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct CountingExecutor {
        calls: AtomicU64,
    }

    #[async_trait]
    impl QueryExecutor<u32> for CountingExecutor {
        type Row = u32;

        async fn run(&self, _worker: WorkerId, handle: &u32) -> StorageResult<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *handle == 0 {
                return Err(StorageError::query_failed("handle zero"));
            }
            Ok(*handle)
        }
    }

    fn settings(max_cycles: u64) -> WorkerSettings {
        WorkerSettings {
            refresh_every: 100,
            cycle_interval: Duration::ZERO,
            max_cycles: Some(max_cycles),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_worker_without_handle_skips_queries() {
        let gate = Arc::new(RefreshGate::<u32>::new(1, None));
        let executor = Arc::new(CountingExecutor::default());
        let worker =
            Worker::new(WorkerId::new(0), settings(3), gate, executor.clone(), CancellationToken::new());

        let summary = worker.run().await;
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.cycles_without_handle, 3);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert!(logs_contain("No cursor here"));
    }

    #[tokio::test]
    async fn test_worker_stops_on_cancel() {
        let gate = Arc::new(RefreshGate::<u32>::new(1, None));
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let worker = Worker::new(
            WorkerId::new(0),
            WorkerSettings { refresh_every: 1, cycle_interval: Duration::from_secs(60), max_cycles: None },
            gate,
            Arc::new(CountingExecutor::default()),
            shutdown,
        );

        let summary = worker.run().await;
        assert_eq!(summary.cycles, 0);
    }

    #[tokio::test]
    async fn test_worker_adopts_published_state() {
        let gate = Arc::new(RefreshGate::<u32>::new(1, Some(Duration::from_secs(5))));
        let executor = Arc::new(CountingExecutor::default());
        let shutdown = CancellationToken::new();

        let refresher = {
            let gate = Arc::clone(&gate);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                gate.wait_for_refresh_request(&shutdown).await.unwrap();
                gate.await_full_quorum(&shutdown).await.unwrap();
                gate.install(7, crate::secrets::DbCredentials::new("u", "p"));
                gate.broadcast_refreshed().unwrap();
            })
        };

        let worker = Worker::new(
            WorkerId::new(0),
            WorkerSettings { refresh_every: 2, cycle_interval: Duration::ZERO, max_cycles: Some(3) },
            gate,
            executor.clone(),
            shutdown,
        );

        let summary = worker.run().await;
        refresher.await.unwrap();
        assert_eq!(summary.refreshes_adopted, 1);
        assert_eq!(summary.last_version, 1);
        assert_eq!(summary.cycles_without_handle, 1);
        assert_eq!(summary.queries_ok, 2);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(WorkerPhase::WaitingForRefresh.to_string(), "waiting_for_refresh");
    }
}
