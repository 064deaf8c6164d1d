//! Refresher loop: on request, fetch credentials, connect, publish.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::fatal::{FatalCause, FatalEvent, FatalSignal};
use super::gate::{GateError, RefreshGate};
use crate::observability::MetricsRecorder;
use crate::secrets::{CredentialProvider, DbCredentials};
use crate::storage::ConnectionFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefresherPhase {
    Idle,
    Acquiring,
    Installing,
    Failing,
}

impl fmt::Display for RefresherPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefresherPhase::Idle => "idle",
            RefresherPhase::Acquiring => "acquiring",
            RefresherPhase::Installing => "installing",
            RefresherPhase::Failing => "failing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefresherSummary {
    pub rounds_installed: u64,
    pub rounds_failed: u64,
    /// Rounds installed before every worker had parked.
    pub partial_installs: u64,
}

/// The single task allowed to replace the shared connection.
pub struct Refresher<P, F: ConnectionFactory> {
    provider: Arc<P>,
    factory: Arc<F>,
    gate: Arc<RefreshGate<F::Handle>>,
    fatal: FatalSignal,
    shutdown: CancellationToken,
    metrics: MetricsRecorder,
}

impl<P, F> Refresher<P, F>
where
    P: CredentialProvider,
    F: ConnectionFactory,
{
    pub fn new(
        provider: Arc<P>,
        factory: Arc<F>,
        gate: Arc<RefreshGate<F::Handle>>,
        fatal: FatalSignal,
        shutdown: CancellationToken,
    ) -> Self {
        Self { provider, factory, gate, fatal, shutdown, metrics: MetricsRecorder::new() }
    }

    /// Serve refresh requests until shutdown or the first failed round.
    pub async fn run(self) -> RefresherSummary {
        let mut summary = RefresherSummary::default();

        tracing::info!(
            provider = %self.provider.describe(),
            database = %self.factory.describe(),
            "Starting refresher"
        );

        loop {
            tracing::debug!(phase = %RefresherPhase::Idle, "Waiting on workers");
            if self.gate.wait_for_refresh_request(&self.shutdown).await.is_err() {
                break;
            }

            let round = self.gate.current_round();
            let started = Instant::now();
            tracing::info!(round, phase = %RefresherPhase::Acquiring, "Refresh requested");

            let acquired = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                acquired = self.acquire() => acquired,
            };

            match acquired {
                Ok((credentials, handle)) => {
                    match self.install(round, credentials, handle, &mut summary).await {
                        Ok(()) => {
                            summary.rounds_installed += 1;
                            self.metrics
                                .record_refresh_round("installed", started.elapsed().as_secs_f64());
                        }
                        Err(_) => break,
                    }
                }
                Err(cause) => {
                    summary.rounds_failed += 1;
                    self.metrics.record_refresh_round("failed", started.elapsed().as_secs_f64());
                    self.fail(round, cause);
                    // no further rounds once the process is going down
                    break;
                }
            }
        }

        tracing::info!(
            rounds_installed = summary.rounds_installed,
            rounds_failed = summary.rounds_failed,
            "Refresher stopped"
        );

        summary
    }

    async fn acquire(&self) -> Result<(DbCredentials, F::Handle), FatalCause> {
        let credentials = self.provider.fetch().await.map_err(FatalCause::Credentials)?;
        tracing::info!(username = %credentials.username, "Using DB user");

        let handle = self.factory.connect(&credentials).await.map_err(FatalCause::Connection)?;
        Ok((credentials, handle))
    }

    /// Publish `handle` once every worker has parked, then retire the old one.
    async fn install(
        &self,
        round: u64,
        credentials: DbCredentials,
        handle: F::Handle,
        summary: &mut RefresherSummary,
    ) -> Result<(), GateError> {
        match self.gate.await_full_quorum(&self.shutdown).await {
            Ok(()) => {}
            Err(GateError::Cancelled) => {
                self.factory.close(handle).await;
                return Err(GateError::Cancelled);
            }
            Err(e) => {
                summary.partial_installs += 1;
                tracing::warn!(round, error = %e, "Not every worker parked; installing anyway");
            }
        }

        tracing::info!(round, phase = %RefresherPhase::Installing, "Installing refreshed connection");
        self.gate.install(handle, credentials);

        let previous = self.gate.broadcast_refreshed()?;
        if let Some(old) = previous.connection().cloned() {
            drop(previous);
            self.factory.close(old).await;
        }

        Ok(())
    }

    fn fail(&self, round: u64, cause: FatalCause) {
        tracing::error!(round, phase = %RefresherPhase::Failing, cause = %cause, "Refresh failed");
        self.gate.broadcast_failed();
        self.fatal.fire(FatalEvent::new(round, cause));
    }
}
