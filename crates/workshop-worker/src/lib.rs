//! # Workshop Worker
//!
//! The process side of Workshop: a supervisor that hands queued jobs to a
//! pool of employees, each running its job in a forked child process.
//!
//! ## Architecture
//!
//! The worker is organized around:
//!
//! - `process`: fork, reap and kill wrappers over `libc`
//! - `employee`: [`Employee`], one child process slot
//! - `boss`: [`Boss`], the per-tick scheduling, dispatch and reconciliation
//! - `workshop`: [`Workshop`], the run loop and its stop states
//! - `signals`: SIGINT/SIGTERM handling for graceful and immediate shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use workshop_worker::{Boss, EmployeeOptions, PoolSpec, Workshop};
//!
//! let boss = Boss::new(pipeline).with_scheduler(scheduler);
//! let mut workshop = Workshop::new(boss, &[PoolSpec::new(4, EmployeeOptions::any())])
//!     .with_shutdown_signals(ShutdownSignals::install()?);
//! workshop.run(true)?;
//! ```

#![warn(missing_docs)]
#![warn(unused)]
#![warn(clippy::pedantic)]

pub mod boss;
pub mod employee;
pub mod process;
pub mod signals;
pub mod workshop;

use std::io;

use workshop_queue::QueueError;
use workshop_scheduler::SchedulerError;

pub use boss::Boss;
pub use employee::{Employee, EmployeeOptions, WorkState};
pub use process::{ExitStatus, Pid};
pub use signals::{InterruptTracker, ShutdownRequest, ShutdownSignals};
pub use workshop::{PoolSpec, Workshop, WorkshopState};

/// Worker error types
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct WorkerError(#[from] WorkerErrorKind);

impl WorkerError {
    /// The underlying error kind
    #[must_use]
    pub fn kind(&self) -> &WorkerErrorKind {
        &self.0
    }
}

/// What went wrong in the worker pool
#[derive(Debug, thiserror::Error)]
pub enum WorkerErrorKind {
    /// Employee filters are malformed
    #[error("invalid employee options: {reason}")]
    InvalidOptions {
        /// What is wrong with them.
        reason: String,
    },

    /// A job was assigned to an employee that already has one
    #[error("employee is not free")]
    NotFree,

    /// An employee was freed while its child is still running
    #[error("employee is still busy")]
    StillBusy,

    /// The OS refused to fork
    #[error("fork failed: {source}")]
    ForkFailed {
        /// The OS error.
        source: io::Error,
    },

    /// Reaping a child failed
    #[error("waiting on pid {pid} failed: {source}")]
    Wait {
        /// The child being reaped.
        pid: Pid,
        /// The OS error.
        source: io::Error,
    },

    /// Installing or sending a signal failed
    #[error("signal error: {source}")]
    Signal {
        /// The OS error.
        source: io::Error,
    },

    /// The queue failed
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The scheduler failed
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl From<QueueError> for WorkerError {
    fn from(err: QueueError) -> Self {
        WorkerErrorKind::Queue(err).into()
    }
}

impl From<SchedulerError> for WorkerError {
    fn from(err: SchedulerError) -> Self {
        WorkerErrorKind::Scheduler(err).into()
    }
}

/// Worker result type
pub type WorkerResult<T = ()> = Result<T, WorkerError>;
