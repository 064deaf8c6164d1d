//! One-shot fatal signal from the refresher to the supervisor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::observability::MetricsRecorder;
use crate::secrets::SecretsError;
use crate::storage::StorageError;

/// Why the process has to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalCause {
    /// New credentials could not be read.
    Credentials(SecretsError),
    /// A connection could not be opened with fresh credentials.
    Connection(StorageError),
    /// A coordination task crashed.
    TaskPanicked(String),
}

impl FatalCause {
    pub fn kind(&self) -> &'static str {
        match self {
            FatalCause::Credentials(_) => "credentials",
            FatalCause::Connection(_) => "connection",
            FatalCause::TaskPanicked(_) => "task_panicked",
        }
    }
}

impl fmt::Display for FatalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalCause::Credentials(e) => write!(f, "credential acquisition failed: {}", e),
            FatalCause::Connection(e) => write!(f, "connection failed: {}", e),
            FatalCause::TaskPanicked(message) => write!(f, "task panicked: {}", message),
        }
    }
}

/// The event carried by a fired [`FatalSignal`].
#[derive(Debug, Clone)]
pub struct FatalEvent {
    pub cause: FatalCause,
    /// Refresh round during which the failure happened.
    pub round: u64,
    pub raised_at: DateTime<Utc>,
}

impl FatalEvent {
    pub fn new(round: u64, cause: FatalCause) -> Self {
        Self { cause, round, raised_at: Utc::now() }
    }
}

impl fmt::Display for FatalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round {}: {}", self.round, self.cause)
    }
}

/// A signal that can be raised once and observed by any clone.
///
/// The first [`FatalSignal::fire`] wins; later attempts are counted but do not
/// replace the stored event.
#[derive(Debug, Clone)]
pub struct FatalSignal {
    tx: Arc<watch::Sender<Option<Arc<FatalEvent>>>>,
    attempts: Arc<AtomicU64>,
}

impl Default for FatalSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl FatalSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx), attempts: Arc::new(AtomicU64::new(0)) }
    }

    /// Raise the signal. Returns `true` if this call set it.
    pub fn fire(&self, event: FatalEvent) -> bool {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let mut pending = Some(event);
        let fired = self.tx.send_if_modified(|slot| match (slot.is_none(), pending.take()) {
            (true, Some(event)) => {
                *slot = Some(Arc::new(event));
                true
            }
            _ => false,
        });

        if fired {
            MetricsRecorder::new().record_fatal_signal();
            if let Some(event) = self.event() {
                tracing::error!(
                    round = event.round,
                    cause = %event.cause,
                    kind = event.cause.kind(),
                    "Fatal signal raised"
                );
            }
        } else {
            tracing::debug!("Fatal signal already raised; ignoring");
        }

        fired
    }

    pub fn is_fired(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn event(&self) -> Option<Arc<FatalEvent>> {
        self.tx.borrow().clone()
    }

    /// Number of `fire` calls, effective or not.
    pub fn fire_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Resolve once the signal is raised.
    pub async fn raised(&self) -> Arc<FatalEvent> {
        let mut rx = self.tx.subscribe();
        let event = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            // the sender lives as long as self
            Err(_) => None,
        };
        match event {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn credentials_failure() -> FatalEvent {
        FatalEvent::new(1, FatalCause::Credentials(SecretsError::not_found("postgresql/creds/x")))
    }

    #[test]
    #[traced_test]
    fn test_first_fire_wins() {
        let signal = FatalSignal::new();
        assert!(!signal.is_fired());

        assert!(signal.fire(credentials_failure()));
        assert!(!signal.fire(FatalEvent::new(
            2,
            FatalCause::Connection(StorageError::connect_failed("refused"))
        )));

        let event = signal.event().unwrap();
        assert_eq!(event.round, 1);
        assert_eq!(event.cause.kind(), "credentials");
        assert_eq!(signal.fire_attempts(), 2);
        assert!(logs_contain("Fatal signal raised"));
    }

    #[test]
    fn test_clones_share_state() {
        let signal = FatalSignal::new();
        let clone = signal.clone();
        clone.fire(credentials_failure());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_raised_resolves_after_fire() {
        let signal = FatalSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.raised().await })
        };

        tokio::task::yield_now().await;
        signal.fire(credentials_failure());

        let event = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(event.round, 1);
    }

    #[tokio::test]
    async fn test_raised_resolves_immediately_when_already_fired() {
        let signal = FatalSignal::new();
        signal.fire(credentials_failure());
        let event = signal.raised().await;
        assert!(event.to_string().contains("round 1"));
    }
}
