//! # Refresh Coordination
//!
//! `C` workers run a fixed query in a loop. Every `K` cycles each worker parks
//! at the [`RefreshGate`]; once enough have parked, the refresh-capable worker
//! wakes the [`Refresher`], which fetches new credentials, opens a new
//! connection and publishes it to every parked worker at once. If credentials
//! or the connection cannot be obtained the refresher raises the
//! [`FatalSignal`] and the [`Supervisor`] shuts the process down.
//!
//! ```rust,ignore
//! let coordinator = RefreshCoordinator::new(config, provider, factory, executor)?;
//! let report = coordinator.launch().supervise(ctrl_c()).await;
//! std::process::exit(report.exit.exit_code());
//! ```

pub mod coordinator;
pub mod fatal;
pub mod gate;
pub mod quorum;
pub mod refresher;
pub mod state;
pub mod supervisor;
pub mod worker;

pub use coordinator::{RefreshCoordinator, RunningCoordinator};
pub use fatal::{FatalCause, FatalEvent, FatalSignal};
pub use gate::{CheckIn, GateError, GateSnapshot, RefreshGate};
pub use quorum::QuorumTracker;
pub use refresher::{Refresher, RefresherSummary};
pub use state::{RefreshOutcome, SharedCredentialState, WorkerCursor, WorkerId};
pub use supervisor::{
    Supervisor, SupervisorExit, SupervisorReport, SupervisorSettings, TaskExit, FATAL_EXIT_CODE,
};
pub use worker::{Worker, WorkerSettings, WorkerSummary};
