//! # Refresh Gate
//!
//! The rendezvous between workers and the refresher. Workers check in every
//! `K` cycles and park until the round they joined is published. The
//! refresher waits to be woken, installs a new state once every worker has
//! parked, and broadcasts it.
//!
//! ## Round protocol
//!
//! 1. Workers call [`RefreshGate::check_in`] and receive a [`CheckIn`] ticket
//!    for the current round.
//! 2. Once `C - 1` workers have checked in, the refresh-capable worker calls
//!    [`RefreshGate::signal_refresher_wanted`]. If a different worker completed
//!    the quorum, the gate hands the trigger to the refresh-capable worker
//!    while it waits.
//! 3. The refresher builds a connection, waits for all `C` workers with
//!    [`RefreshGate::await_full_quorum`], stages it with
//!    [`RefreshGate::install`] and publishes it with
//!    [`RefreshGate::broadcast_refreshed`] (or [`RefreshGate::broadcast_failed`]).
//! 4. Publishing releases every ticket of that round and clears the tracker.
//!
//! Gate bookkeeping lives behind a synchronous mutex that is never held across
//! an await. Published states travel through a `watch` channel, so a worker
//! that arrives after its round was published returns immediately.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use super::quorum::QuorumTracker;
use super::state::{RefreshOutcome, SharedCredentialState, WorkerId};
use crate::observability::MetricsRecorder;
use crate::secrets::DbCredentials;

/// Errors from waiting on or driving the gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// A bounded wait expired.
    #[error("Timed out after {waited_ms}ms waiting on refresh round {round}")]
    Timeout { round: u64, waited_ms: u64 },

    /// Shutdown began while waiting.
    #[error("Wait cancelled by shutdown")]
    Cancelled,

    /// The worker id is outside the pool.
    #[error("Unknown worker {worker}: the gate tracks {capacity} workers")]
    UnknownWorker { worker: WorkerId, capacity: usize },

    /// Broadcast was called with nothing installed.
    #[error("No refreshed state staged for round {round}")]
    NothingStaged { round: u64 },

    /// The state channel closed.
    #[error("Refresh gate closed")]
    Closed,
}

/// Ticket handed to a worker when it checks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckIn {
    pub worker: WorkerId,
    /// Round the worker is waiting on.
    pub round: u64,
    /// Whether this check-in saw at least `C - 1` workers parked.
    pub quorum_reached: bool,
    /// Whether this worker is the one that wakes the refresher.
    pub refresh_capable: bool,
}

/// Point-in-time view of the gate for status logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    pub round: u64,
    pub checked_in: usize,
    pub worker_count: usize,
    pub published_round: u64,
    pub published_outcome: RefreshOutcome,
    pub effective_signals: u64,
    pub redundant_signals: u64,
    pub rounds_installed: u64,
    pub rounds_failed: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct GateStats {
    effective_signals: u64,
    redundant_signals: u64,
    rounds_installed: u64,
    rounds_failed: u64,
}

struct GateInner<H> {
    tracker: QuorumTracker,
    round: u64,
    /// Set by an effective signal, consumed by the refresher.
    refresh_requested: bool,
    /// An effective signal already happened this round.
    refresher_signaled: bool,
    /// Quorum was completed by a worker that may not signal.
    trigger_pending: bool,
    staged: Option<Arc<SharedCredentialState<H>>>,
    stats: GateStats,
}

impl<H> GateInner<H> {
    /// Close the current round: clear the barrier and reset per-round flags.
    fn advance(&mut self) {
        self.tracker.clear();
        self.round += 1;
        self.refresh_requested = false;
        self.refresher_signaled = false;
        self.trigger_pending = false;
    }
}

/// Barrier and broadcast point shared by all workers and the refresher.
pub struct RefreshGate<H> {
    worker_count: usize,
    refresh_capable: WorkerId,
    wait_timeout: Option<Duration>,
    inner: Mutex<GateInner<H>>,
    refresher_wanted: Notify,
    trigger_ready: Notify,
    quorum_full: Notify,
    state_tx: watch::Sender<Arc<SharedCredentialState<H>>>,
    metrics: MetricsRecorder,
}

impl<H: Clone + Send + Sync + 'static> RefreshGate<H> {
    /// Create a gate for `worker_count` workers. `wait_timeout` bounds every
    /// wait; `None` waits until shutdown.
    pub fn new(worker_count: usize, wait_timeout: Option<Duration>) -> Self {
        let worker_count = worker_count.max(1);
        let (state_tx, _) = watch::channel(Arc::new(SharedCredentialState::empty()));

        Self {
            worker_count,
            refresh_capable: WorkerId::new(0),
            wait_timeout,
            inner: Mutex::new(GateInner {
                tracker: QuorumTracker::new(worker_count),
                round: 1,
                refresh_requested: false,
                refresher_signaled: false,
                trigger_pending: false,
                staged: None,
                stats: GateStats::default(),
            }),
            refresher_wanted: Notify::new(),
            trigger_ready: Notify::new(),
            quorum_full: Notify::new(),
            state_tx,
            metrics: MetricsRecorder::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner<H>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// The only worker allowed to wake the refresher.
    pub fn refresh_capable_worker(&self) -> WorkerId {
        self.refresh_capable
    }

    /// Round currently collecting check-ins.
    pub fn current_round(&self) -> u64 {
        self.lock().round
    }

    /// Most recently published state.
    pub fn current_state(&self) -> Arc<SharedCredentialState<H>> {
        Arc::clone(&self.state_tx.borrow())
    }

    /// Park `worker` at the barrier for the current round.
    pub fn check_in(&self, worker: WorkerId) -> Result<CheckIn, GateError> {
        if worker.index() >= self.worker_count {
            return Err(GateError::UnknownWorker { worker, capacity: self.worker_count });
        }

        let refresh_capable = worker == self.refresh_capable;
        let (ticket, hand_off, full, waiting) = {
            let mut inner = self.lock();
            inner.tracker.check_in(worker);
            let quorum_reached = inner.tracker.quorum_reached();

            let hand_off = quorum_reached && !refresh_capable && !inner.refresher_signaled;
            if hand_off {
                inner.trigger_pending = true;
            }

            let ticket = CheckIn { worker, round: inner.round, quorum_reached, refresh_capable };
            (ticket, hand_off, inner.tracker.is_full(), inner.tracker.len())
        };

        self.metrics.set_workers_waiting(waiting);
        tracing::debug!(
            worker = %worker,
            round = ticket.round,
            waiting,
            quorum_reached = ticket.quorum_reached,
            "Worker checked in"
        );

        if hand_off {
            self.trigger_ready.notify_one();
        }
        if full {
            self.quorum_full.notify_one();
        }

        Ok(ticket)
    }

    /// Remove `worker` from the barrier after it stopped waiting.
    pub fn withdraw(&self, worker: WorkerId) -> bool {
        let (removed, waiting) = {
            let mut inner = self.lock();
            let removed = inner.tracker.withdraw(worker);
            (removed, inner.tracker.len())
        };
        if removed {
            self.metrics.set_workers_waiting(waiting);
            tracing::debug!(worker = %worker, waiting, "Worker withdrew from refresh round");
        }
        removed
    }

    /// Ask the refresher to run. Effective at most once per round; later
    /// calls in the same round are counted and ignored.
    pub fn signal_refresher_wanted(&self) -> bool {
        let round = {
            let mut inner = self.lock();
            if inner.refresher_signaled {
                inner.stats.redundant_signals += 1;
                return false;
            }
            inner.refresher_signaled = true;
            inner.refresh_requested = true;
            inner.trigger_pending = false;
            inner.stats.effective_signals += 1;
            inner.round
        };

        tracing::info!(round, "Signalling refresher");
        self.refresher_wanted.notify_one();
        true
    }

    fn take_pending_trigger(&self) -> bool {
        let mut inner = self.lock();
        if inner.trigger_pending && !inner.refresher_signaled {
            inner.trigger_pending = false;
            true
        } else {
            false
        }
    }

    fn take_refresh_request(&self) -> bool {
        let mut inner = self.lock();
        std::mem::take(&mut inner.refresh_requested)
    }

    fn quorum_is_full(&self) -> bool {
        self.lock().tracker.is_full()
    }

    /// Wait until the round on `ticket` is published.
    ///
    /// The refresh-capable worker also picks up a trigger handed to it by the
    /// worker that completed the quorum.
    pub async fn await_refreshed(
        &self,
        ticket: &CheckIn,
        shutdown: &CancellationToken,
    ) -> Result<Arc<SharedCredentialState<H>>, GateError> {
        let wait = async {
            let mut state_rx = self.state_tx.subscribe();
            loop {
                let trigger = self.trigger_ready.notified();
                tokio::pin!(trigger);
                if ticket.refresh_capable {
                    trigger.as_mut().enable();
                    if self.take_pending_trigger() {
                        self.signal_refresher_wanted();
                    }
                }

                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return Err(GateError::Cancelled),
                    released = state_rx.wait_for(|state| state.round() >= ticket.round) => {
                        return match released {
                            Ok(state) => Ok(Arc::clone(&state)),
                            Err(_) => Err(GateError::Closed),
                        };
                    }
                    _ = &mut trigger, if ticket.refresh_capable => {}
                }
            }
        };

        self.bounded(ticket.round, wait).await
    }

    /// Wait until a worker signals that a refresh is wanted.
    ///
    /// Only the refresher calls this. It is not bounded by the wait timeout.
    pub async fn wait_for_refresh_request(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<(), GateError> {
        loop {
            let wanted = self.refresher_wanted.notified();
            tokio::pin!(wanted);
            wanted.as_mut().enable();

            if self.take_refresh_request() {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(GateError::Cancelled),
                _ = &mut wanted => {}
            }
        }
    }

    /// Wait until all `C` workers have parked for the current round.
    pub async fn await_full_quorum(&self, shutdown: &CancellationToken) -> Result<(), GateError> {
        let round = self.current_round();
        let wait = async {
            loop {
                let full = self.quorum_full.notified();
                tokio::pin!(full);
                full.as_mut().enable();

                if self.quorum_is_full() {
                    return Ok(());
                }

                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return Err(GateError::Cancelled),
                    _ = &mut full => {}
                }
            }
        };

        self.bounded(round, wait).await
    }

    async fn bounded<T>(
        &self,
        round: u64,
        wait: impl Future<Output = Result<T, GateError>>,
    ) -> Result<T, GateError> {
        match self.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or(Err(
                GateError::Timeout { round, waited_ms: limit.as_millis() as u64 },
            )),
            None => wait.await,
        }
    }

    /// Stage a new connection for the current round. Returns the round.
    ///
    /// Nothing is visible to workers until [`RefreshGate::broadcast_refreshed`].
    pub fn install(&self, connection: H, credentials: DbCredentials) -> u64 {
        let mut inner = self.lock();
        let round = inner.round;
        inner.staged =
            Some(Arc::new(SharedCredentialState::installed(round, connection, credentials)));
        round
    }

    /// Publish the staged state, release every waiter of the round and start
    /// the next one. Returns the state it replaced.
    pub fn broadcast_refreshed(&self) -> Result<Arc<SharedCredentialState<H>>, GateError> {
        let (previous, round) = {
            let mut inner = self.lock();
            let staged =
                inner.staged.take().ok_or(GateError::NothingStaged { round: inner.round })?;
            let round = staged.round();
            let previous = self.state_tx.send_replace(staged);
            inner.advance();
            inner.stats.rounds_installed += 1;
            (previous, round)
        };

        self.metrics.set_workers_waiting(0);
        tracing::info!(round, "Notifying all workers");
        Ok(previous)
    }

    /// Publish a failed round so waiting workers are released without a
    /// connection. Returns the round that failed.
    pub fn broadcast_failed(&self) -> u64 {
        let round = {
            let mut inner = self.lock();
            let round = inner.round;
            inner.staged = None;
            self.state_tx.send_replace(Arc::new(SharedCredentialState::failed(round)));
            inner.advance();
            inner.stats.rounds_failed += 1;
            round
        };

        self.metrics.set_workers_waiting(0);
        tracing::warn!(round, "Released workers with a failed refresh");
        round
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let published = self.current_state();
        let inner = self.lock();
        GateSnapshot {
            round: inner.round,
            checked_in: inner.tracker.len(),
            worker_count: self.worker_count,
            published_round: published.round(),
            published_outcome: published.outcome(),
            effective_signals: inner.stats.effective_signals,
            redundant_signals: inner.stats.redundant_signals,
            rounds_installed: inner.stats.rounds_installed,
            rounds_failed: inner.stats.rounds_failed,
        }
    }
}

impl<H> std::fmt::Debug for RefreshGate<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGate")
            .field("worker_count", &self.worker_count)
            .field("refresh_capable", &self.refresh_capable)
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}
