//! Wires the gate, refresher, workers and supervisor together.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::fatal::FatalSignal;
use super::gate::RefreshGate;
use super::refresher::Refresher;
use super::state::WorkerId;
use super::supervisor::{Supervisor, SupervisorReport, SupervisorSettings, TaskExit};
use super::worker::{Worker, WorkerSettings};
use crate::config::CoordinatorConfig;
use crate::errors::{CredRefreshError, Result};
use crate::secrets::CredentialProvider;
use crate::storage::{ConnectionFactory, QueryExecutor};

/// A configured but not yet running refresher and worker pool.
pub struct RefreshCoordinator<P, F, Q> {
    config: CoordinatorConfig,
    provider: Arc<P>,
    factory: Arc<F>,
    executor: Arc<Q>,
}

impl<P, F, Q> RefreshCoordinator<P, F, Q>
where
    P: CredentialProvider,
    F: ConnectionFactory,
    Q: QueryExecutor<F::Handle>,
{
    pub fn new(
        config: CoordinatorConfig,
        provider: Arc<P>,
        factory: Arc<F>,
        executor: Arc<Q>,
    ) -> Result<Self> {
        if config.worker_count == 0 || config.worker_count > usize::from(u16::MAX) {
            return Err(CredRefreshError::validation_field(
                format!("Unsupported worker count {}", config.worker_count),
                "coordinator.worker_count",
            ));
        }
        if config.refresh_every == 0 {
            return Err(CredRefreshError::validation_field(
                "Refresh interval must be at least 1 cycle",
                "coordinator.refresh_every",
            ));
        }

        Ok(Self { config, provider, factory, executor })
    }

    /// Spawn the refresher and `C` workers onto the current runtime.
    pub fn launch(self) -> RunningCoordinator<F::Handle> {
        let gate = Arc::new(RefreshGate::new(
            self.config.worker_count,
            self.config.refresh_wait_timeout(),
        ));
        let fatal = FatalSignal::new();
        let shutdown = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let refresher = Refresher::new(
            self.provider,
            self.factory,
            Arc::clone(&gate),
            fatal.clone(),
            shutdown.clone(),
        );
        tasks.spawn(async move { TaskExit::Refresher(refresher.run().await) });

        let settings = WorkerSettings {
            refresh_every: self.config.refresh_every,
            cycle_interval: self.config.cycle_interval(),
            max_cycles: self.config.max_cycles,
        };
        for index in 0..self.config.worker_count {
            // bounded by new()
            let id = WorkerId::new(index as u16);
            let worker = Worker::new(
                id,
                settings,
                Arc::clone(&gate),
                Arc::clone(&self.executor),
                shutdown.clone(),
            );
            tasks.spawn(async move { TaskExit::Worker(worker.run().await) });
        }

        tracing::info!(
            workers = self.config.worker_count,
            refresh_every = self.config.refresh_every,
            refresh_capable = %gate.refresh_capable_worker(),
            "Coordinator launched"
        );

        let supervisor = Supervisor::new(
            Arc::clone(&gate),
            fatal.clone(),
            shutdown.clone(),
            SupervisorSettings {
                shutdown_grace: self.config.shutdown_grace(),
                status_interval: self.config.status_interval(),
            },
        );

        RunningCoordinator { gate, fatal, shutdown, tasks, supervisor }
    }
}

/// Handle to a launched coordinator.
pub struct RunningCoordinator<H> {
    gate: Arc<RefreshGate<H>>,
    fatal: FatalSignal,
    shutdown: CancellationToken,
    tasks: JoinSet<TaskExit>,
    supervisor: Supervisor<H>,
}

impl<H: Clone + Send + Sync + 'static> RunningCoordinator<H> {
    pub fn gate(&self) -> &Arc<RefreshGate<H>> {
        &self.gate
    }

    pub fn fatal_signal(&self) -> &FatalSignal {
        &self.fatal
    }

    /// Cancelling this token stops the run as if interrupted.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Block until the run ends. See [`Supervisor::supervise`].
    pub async fn supervise<I>(self, interrupt: I) -> SupervisorReport
    where
        I: Future<Output = ()>,
    {
        self.supervisor.supervise(self.tasks, interrupt).await
    }
}
