//! Watches the fatal signal and the task set, and owns shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::fatal::{FatalCause, FatalEvent, FatalSignal};
use super::gate::RefreshGate;
use super::refresher::RefresherSummary;
use super::worker::WorkerSummary;

/// Exit code for a run stopped by the fatal signal.
pub const FATAL_EXIT_CODE: i32 = 3;

/// Result of a coordination task.
#[derive(Debug)]
pub enum TaskExit {
    Worker(WorkerSummary),
    Refresher(RefresherSummary),
}

/// Why supervision ended.
#[derive(Debug, Clone)]
pub enum SupervisorExit {
    /// Every worker reached its cycle limit.
    Completed,
    /// The interrupt future resolved.
    Interrupted,
    /// The fatal signal was raised.
    Fatal(Arc<FatalEvent>),
}

impl SupervisorExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorExit::Completed | SupervisorExit::Interrupted => 0,
            SupervisorExit::Fatal(_) => FATAL_EXIT_CODE,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SupervisorExit::Fatal(_))
    }
}

/// Everything the supervisor learned from the run.
#[derive(Debug)]
pub struct SupervisorReport {
    pub exit: SupervisorExit,
    pub workers: Vec<WorkerSummary>,
    pub refresher: Option<RefresherSummary>,
    /// Tasks that did not stop within the grace period.
    pub aborted: usize,
}

/// Supervisor settings.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub shutdown_grace: Duration,
    pub status_interval: Duration,
}

pub struct Supervisor<H> {
    gate: Arc<RefreshGate<H>>,
    fatal: FatalSignal,
    shutdown: CancellationToken,
    settings: SupervisorSettings,
}

impl<H: Clone + Send + Sync + 'static> Supervisor<H> {
    pub fn new(
        gate: Arc<RefreshGate<H>>,
        fatal: FatalSignal,
        shutdown: CancellationToken,
        settings: SupervisorSettings,
    ) -> Self {
        Self { gate, fatal, shutdown, settings }
    }

    /// Supervise `tasks` until the fatal signal, `interrupt`, or every worker
    /// finishing. Then cancel everything and collect the task results.
    pub async fn supervise<I>(self, mut tasks: JoinSet<TaskExit>, interrupt: I) -> SupervisorReport
    where
        I: Future<Output = ()>,
    {
        let mut workers_left = self.gate.worker_count();
        let mut workers = Vec::with_capacity(workers_left);
        let mut refresher = None;

        let mut status =
            tokio::time::interval(self.settings.status_interval.max(Duration::from_millis(1)));
        status.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        status.tick().await;

        tokio::pin!(interrupt);

        let exit = loop {
            tokio::select! {
                biased;
                event = self.fatal.raised() => {
                    tracing::error!(round = event.round, cause = %event.cause, "DB auth failed. Exiting");
                    break SupervisorExit::Fatal(event);
                }
                _ = &mut interrupt => {
                    tracing::info!("Interrupt received, shutting down");
                    break SupervisorExit::Interrupted;
                }
                joined = tasks.join_next(), if workers_left > 0 => match joined {
                    Some(Ok(TaskExit::Worker(summary))) => {
                        workers_left -= 1;
                        workers.push(summary);
                        if workers_left == 0 {
                            tracing::info!("All workers finished");
                            break SupervisorExit::Completed;
                        }
                    }
                    Some(Ok(TaskExit::Refresher(summary))) => {
                        // only exits on its own when cancelled
                        refresher = Some(summary);
                    }
                    Some(Err(e)) => {
                        let cause = FatalCause::TaskPanicked(e.to_string());
                        self.fatal.fire(FatalEvent::new(self.gate.current_round(), cause));
                    }
                    None => break SupervisorExit::Completed,
                },
                _ = status.tick() => {
                    let snapshot = self.gate.snapshot();
                    tracing::info!(
                        round = snapshot.round,
                        waiting = snapshot.checked_in,
                        workers = snapshot.worker_count,
                        published_round = snapshot.published_round,
                        published_outcome = %snapshot.published_outcome,
                        rounds_installed = snapshot.rounds_installed,
                        "Refresh status"
                    );
                }
            }
        };

        self.shutdown.cancel();

        let mut aborted = 0;
        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(TaskExit::Worker(summary)) => workers.push(summary),
                    Ok(TaskExit::Refresher(summary)) => refresher = Some(summary),
                    Err(e) => tracing::warn!(error = %e, "Task ended abnormally during shutdown"),
                }
            }
        };
        if tokio::time::timeout(self.settings.shutdown_grace, drain).await.is_err() {
            aborted = tasks.len();
            tracing::warn!(aborted, "Tasks did not stop in time; aborting");
            tasks.shutdown().await;
        }

        tracing::info!(exit = ?exit, workers = workers.len(), aborted, "Supervisor finished");

        SupervisorReport { exit, workers, refresher, aborted }
    }
}
