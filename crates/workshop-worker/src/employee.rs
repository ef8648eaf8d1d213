//! Employees.
//!
//! An [`Employee`] is one slot in the worker pool. It runs at most one job at
//! a time, each in its own forked child, and reports how the child ended.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use tracing::{Dispatch, debug, dispatcher, error, info};

use workshop_core::{ForkHookChain, Job};
use workshop_queue::DequeueOptions;

use crate::process::{self, Fork, Pid};
use crate::signals;
use crate::{WorkerErrorKind, WorkerResult};

/// Exit status of a child whose job failed
pub const JOB_FAILED_EXIT_CODE: i32 = 1;

/// Where an employee is in its work cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// No job assigned
    Free,
    /// The child is running
    Busy,
    /// The child exited with status zero
    Complete,
    /// The child failed, crashed or was killed
    Failed,
}

/// Job type filters for one employee
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEmployeeOptions", into = "RawEmployeeOptions")]
pub struct EmployeeOptions {
    only: Option<BTreeSet<String>>,
    exclude: Option<BTreeSet<String>>,
}

#[derive(Serialize, Deserialize)]
struct RawEmployeeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    only: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exclude: Option<Vec<String>>,
}

impl TryFrom<RawEmployeeOptions> for EmployeeOptions {
    type Error = crate::WorkerError;

    fn try_from(raw: RawEmployeeOptions) -> WorkerResult<Self> {
        Self::new(raw.only, raw.exclude)
    }
}

impl From<EmployeeOptions> for RawEmployeeOptions {
    fn from(options: EmployeeOptions) -> Self {
        Self {
            only: options.only.map(|types| types.into_iter().collect()),
            exclude: options.exclude.map(|types| types.into_iter().collect()),
        }
    }
}

impl EmployeeOptions {
    /// Validates and builds filters.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidOptions` if a type name is empty. Both filters may
    /// be given; `exclude` then wins, as in [`DequeueOptions::accepts`].
    pub fn new(only: Option<Vec<String>>, exclude: Option<Vec<String>>) -> WorkerResult<Self> {
        for types in only.iter().chain(exclude.iter()) {
            if types.iter().any(|t| t.trim().is_empty()) {
                return Err(invalid("job type names cannot be empty"));
            }
        }

        Ok(Self {
            only: only.map(|types| types.into_iter().collect()),
            exclude: exclude.map(|types| types.into_iter().collect()),
        })
    }

    /// Accepts every job type
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Accepts only the given job types
    ///
    /// # Errors
    ///
    /// See [`EmployeeOptions::new`].
    pub fn only<I, S>(types: I) -> WorkerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(types.into_iter().map(Into::into).collect()), None)
    }

    /// Accepts every job type except the given ones
    ///
    /// # Errors
    ///
    /// See [`EmployeeOptions::new`].
    pub fn exclude<I, S>(types: I) -> WorkerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(None, Some(types.into_iter().map(Into::into).collect()))
    }

    /// The `only` filter
    #[must_use]
    pub fn only_types(&self) -> Option<&BTreeSet<String>> {
        self.only.as_ref()
    }

    /// The `exclude` filter
    #[must_use]
    pub fn exclude_types(&self) -> Option<&BTreeSet<String>> {
        self.exclude.as_ref()
    }

    /// The filters in the form the queue understands
    #[must_use]
    pub fn dequeue_options(&self) -> DequeueOptions {
        DequeueOptions {
            only: self.only.clone(),
            exclude: self.exclude.clone(),
        }
    }
}

fn invalid(reason: &str) -> crate::WorkerError {
    WorkerErrorKind::InvalidOptions {
        reason: reason.to_string(),
    }
    .into()
}

/// One child process slot of the worker pool
#[derive(Debug)]
pub struct Employee {
    options: EmployeeOptions,
    job: Option<Box<dyn Job>>,
    pid: Option<Pid>,
    state: WorkState,
    fork_hooks: ForkHookChain,
    logger: Dispatch,
}

impl Employee {
    /// Creates a free employee with no fork hooks and a no-op logger
    #[must_use]
    pub fn new(options: EmployeeOptions) -> Self {
        Self {
            options,
            job: None,
            pid: None,
            state: WorkState::Free,
            fork_hooks: ForkHookChain::new(),
            logger: Dispatch::none(),
        }
    }

    /// Sets the hooks run in each child before the job
    #[must_use]
    pub fn with_fork_hooks(mut self, hooks: ForkHookChain) -> Self {
        self.fork_hooks = hooks;
        self
    }

    /// Sets the logger used here and inside children
    #[must_use]
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = logger;
        self
    }

    /// The employee's job type filters
    #[must_use]
    pub fn options(&self) -> &EmployeeOptions {
        &self.options
    }

    /// The assigned job, if any
    #[must_use]
    pub fn job(&self) -> Option<&dyn Job> {
        self.job.as_deref()
    }

    /// The assigned job, mutably, for reconciling it with the queue
    pub fn job_mut(&mut self) -> Option<&mut dyn Job> {
        match &mut self.job {
            Some(job) => Some(job.as_mut()),
            None => None,
        }
    }

    /// The running child, if any
    #[must_use]
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// The last observed state, without polling
    #[must_use]
    pub fn state(&self) -> WorkState {
        self.state
    }

    /// Returns true if no job is assigned
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.job.is_none()
    }

    /// Polls the child and returns true while it is still running
    ///
    /// # Errors
    ///
    /// See [`Employee::poll_state`].
    pub fn is_busy(&mut self) -> WorkerResult<bool> {
        Ok(self.poll_state(false)? == WorkState::Busy)
    }

    /// Forks a child to perform `job`.
    ///
    /// In the child this never returns: the fork hooks and the job run, and
    /// the process exits with status zero on success or
    /// [`JOB_FAILED_EXIT_CODE`] on an error or panic.
    ///
    /// # Errors
    ///
    /// Fails with `NotFree` if a job is already assigned, or `ForkFailed` if
    /// the OS cannot create a process.
    pub fn assign(&mut self, mut job: Box<dyn Job>) -> WorkerResult<()> {
        if !self.is_free() {
            return Err(WorkerErrorKind::NotFree.into());
        }

        match process::fork().map_err(|source| WorkerErrorKind::ForkFailed { source })? {
            Fork::Child => run_child(job.as_mut(), &self.fork_hooks, &self.logger),
            Fork::Parent(pid) => {
                dispatcher::with_default(&self.logger, || {
                    info!(
                        %pid,
                        job_id = ?job.id(),
                        class_name = job.class_name(),
                        job_type = job.job_type(),
                        "started job"
                    );
                });
                self.pid = Some(pid);
                self.job = Some(job);
                self.state = WorkState::Busy;
                Ok(())
            }
        }
    }

    /// Refreshes and returns the work state.
    ///
    /// Without `wait` this never blocks and reports `Busy` while the child
    /// runs. With `wait` it blocks until the child exits. Once the child is
    /// reaped the result is cached and repeated calls return it.
    ///
    /// # Errors
    ///
    /// Fails with `Wait` if reaping fails for a reason other than the child
    /// being gone already.
    pub fn poll_state(&mut self, wait: bool) -> WorkerResult<WorkState> {
        let Some(pid) = self.pid else {
            return Ok(self.state);
        };

        if !process::is_alive(pid) {
            return Ok(self.finish(WorkState::Failed));
        }

        match process::wait(pid, wait) {
            Ok(None) => Ok(WorkState::Busy),
            Ok(Some(status)) => {
                let state = if status.success() {
                    WorkState::Complete
                } else {
                    WorkState::Failed
                };
                dispatcher::with_default(&self.logger, || {
                    debug!(%pid, %status, ?state, "reaped child");
                });
                Ok(self.finish(state))
            }
            Err(err) if err.raw_os_error() == Some(libc::ECHILD) => {
                Ok(self.finish(WorkState::Failed))
            }
            Err(source) => Err(WorkerErrorKind::Wait { pid, source }.into()),
        }
    }

    fn finish(&mut self, state: WorkState) -> WorkState {
        self.pid = None;
        self.state = state;
        state
    }

    /// Takes the job back so the employee can accept another.
    ///
    /// # Errors
    ///
    /// Fails with `StillBusy` while the child is running.
    pub fn free(&mut self) -> WorkerResult<Option<Box<dyn Job>>> {
        if self.is_busy()? {
            return Err(WorkerErrorKind::StillBusy.into());
        }
        self.state = WorkState::Free;
        Ok(self.job.take())
    }

    /// Kills a running child and waits for it, leaving the employee
    /// `Failed`. Does nothing when the employee is not busy.
    ///
    /// # Errors
    ///
    /// Fails with `Signal` if the kill cannot be sent, or `Wait` if the
    /// child cannot be reaped.
    pub fn terminate(&mut self) -> WorkerResult<WorkState> {
        if !self.is_busy()? {
            return Ok(self.state);
        }
        let Some(pid) = self.pid else {
            return Ok(self.state);
        };

        dispatcher::with_default(&self.logger, || {
            info!(%pid, job_id = ?self.job().and_then(|job| job.id()), "killing job");
        });
        process::kill(pid).map_err(|source| WorkerErrorKind::Signal { source })?;
        self.poll_state(true)
    }
}

fn run_child(job: &mut dyn Job, hooks: &ForkHookChain, logger: &Dispatch) -> ! {
    signals::restore_default_handlers();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        hooks.run(job)?;
        job.perform()
    }));

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(format!("{err:#}")),
        Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
    };

    let code = match failure {
        None => 0,
        Some(reason) => {
            dispatcher::with_default(logger, || {
                error!(
                    pid = std::process::id(),
                    job_id = ?job.id(),
                    class_name = job.class_name(),
                    job_type = job.job_type(),
                    error = %reason,
                    "uncaught error in job"
                );
            });
            JOB_FAILED_EXIT_CODE
        }
    };

    // `_exit` skips the flush std would do on a normal exit.
    let _ = io::stdout().flush();
    process::exit_child(code)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
