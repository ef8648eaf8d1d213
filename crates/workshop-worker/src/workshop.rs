//! The run loop.

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{dispatcher, info, warn};

use crate::WorkerResult;
use crate::boss::Boss;
use crate::employee::EmployeeOptions;
use crate::signals::{ShutdownRequest, ShutdownSignals};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where the run loop is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkshopState {
    /// Not running
    Stopped,
    /// Ticking the boss
    Running,
    /// Waiting for running jobs before stopping
    Stopping,
    /// Stopped after killing running jobs
    StoppedImmediate,
}

/// A group of identically configured employees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// How many employees to allocate
    pub count: usize,
    /// Their job type filters
    #[serde(flatten)]
    pub options: EmployeeOptions,
}

impl PoolSpec {
    /// Creates a pool of `count` employees with `options`
    #[must_use]
    pub fn new(count: usize, options: EmployeeOptions) -> Self {
        Self { count, options }
    }
}

/// Ticks a [`Boss`] until told to stop
#[derive(Debug)]
pub struct Workshop {
    boss: Boss,
    state: WorkshopState,
    signals: Option<ShutdownSignals>,
}

impl Workshop {
    /// Creates a stopped workshop, allocating the employees of each pool in
    /// order
    #[must_use]
    pub fn new(mut boss: Boss, pools: &[PoolSpec]) -> Self {
        for pool in pools {
            for _ in 0..pool.count {
                boss.allocate_employee(pool.options.clone());
            }
        }
        Self {
            boss,
            state: WorkshopState::Stopped,
            signals: None,
        }
    }

    /// Checks `signals` once per loop iteration
    #[must_use]
    pub fn with_shutdown_signals(mut self, signals: ShutdownSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> WorkshopState {
        self.state
    }

    /// The boss
    #[must_use]
    pub fn boss(&self) -> &Boss {
        &self.boss
    }

    /// The boss, mutably
    pub fn boss_mut(&mut self) -> &mut Boss {
        &mut self.boss
    }

    /// Runs ticks until stopped, then waits for running jobs and settles
    /// them. With `keep_going` false exactly one tick runs before the drain.
    ///
    /// # Errors
    ///
    /// Any queue, scheduler or process error ends the run.
    pub fn run(&mut self, keep_going: bool) -> WorkerResult<()> {
        self.state = WorkshopState::Running;
        self.log(|| {
            info!(
                employees = self.boss.employees().len(),
                keep_going, "workshop running"
            );
        });

        loop {
            self.dispatch_signals()?;
            if self.state != WorkshopState::Running {
                break;
            }

            self.boss.schedule_work()?;
            self.boss.delegate_work()?;
            self.boss.update_progress()?;

            if !keep_going {
                break;
            }
        }

        if self.state == WorkshopState::Running {
            self.state = WorkshopState::Stopping;
        }
        self.drain()?;
        if self.state == WorkshopState::Stopping {
            self.state = WorkshopState::Stopped;
        }

        self.log(|| info!(state = ?self.state, "workshop stopped"));
        Ok(())
    }

    /// Stops after the current tick, letting running jobs finish
    pub fn stop(&mut self) {
        if self.state == WorkshopState::Running {
            self.state = WorkshopState::Stopping;
        }
    }

    /// Stops now, killing running jobs and settling them as failed
    ///
    /// # Errors
    ///
    /// Propagates errors killing children or updating the queue.
    pub fn stop_now(&mut self) -> WorkerResult<()> {
        self.state = WorkshopState::StoppedImmediate;
        self.boss.stop_employees()?;
        self.boss.update_progress()?;
        Ok(())
    }

    fn drain(&mut self) -> WorkerResult<()> {
        // Keep listening while jobs finish so a repeated signal can still
        // escalate to an immediate stop.
        if self.signals.is_some() {
            while self.state != WorkshopState::StoppedImmediate && self.boss.busy_count()? > 0 {
                thread::sleep(DRAIN_POLL_INTERVAL);
                self.dispatch_signals()?;
            }
        }

        self.boss.wait_on_employees()?;
        self.boss.update_progress()?;
        Ok(())
    }

    fn dispatch_signals(&mut self) -> WorkerResult<()> {
        let Some(request) = self.signals.as_mut().and_then(ShutdownSignals::poll) else {
            return Ok(());
        };

        match request {
            ShutdownRequest::Graceful => {
                self.log(|| info!("shutdown requested, finishing running jobs"));
                self.stop();
            }
            ShutdownRequest::Immediate => {
                self.log(|| warn!("shutdown requested again, killing running jobs"));
                self.stop_now()?;
            }
        }
        Ok(())
    }

    fn log(&self, f: impl FnOnce()) {
        dispatcher::with_default(self.boss.logger(), f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workshop_core::testing::{self, TestJob};
    use workshop_queue::{MemoryBackend, Pipeline};

    fn boss() -> Boss {
        Boss::new(Pipeline::new(MemoryBackend::new(), testing::registry()))
            .with_idle_backoff(Duration::ZERO)
    }

    #[test]
    fn test_new_allocates_pools_in_order() {
        let workshop = Workshop::new(
            boss(),
            &[
                PoolSpec::new(2, EmployeeOptions::any()),
                PoolSpec::new(1, EmployeeOptions::only(["special"]).unwrap()),
            ],
        );

        let employees = workshop.boss().employees();
        assert_eq!(employees.len(), 3);
        assert!(employees[1].options().only_types().is_none());
        assert!(employees[2].options().only_types().is_some());
        assert_eq!(workshop.state(), WorkshopState::Stopped);
    }

    #[test]
    fn test_single_tick_run_ends_stopped() {
        let mut workshop = Workshop::new(boss(), &[PoolSpec::new(1, EmployeeOptions::any())]);
        workshop.run(false).unwrap();
        assert_eq!(workshop.state(), WorkshopState::Stopped);
    }

    #[test]
    fn test_stop_is_noop_when_not_running() {
        let mut workshop = Workshop::new(boss(), &[]);
        workshop.stop();
        assert_eq!(workshop.state(), WorkshopState::Stopped);
    }

    #[test]
    fn test_stop_now_kills_running_jobs() {
        let mut workshop = Workshop::new(boss(), &[PoolSpec::new(1, EmployeeOptions::any())]);
        let id = workshop
            .boss_mut()
            .pipeline_mut()
            .enqueue(&TestJob::named("forever").sleeping(30_000))
            .unwrap()
            .id()
            .unwrap();
        workshop.boss_mut().delegate_work().unwrap();
        let pid = workshop.boss().employees()[0].pid().unwrap();

        workshop.stop_now().unwrap();

        assert_eq!(workshop.state(), WorkshopState::StoppedImmediate);
        assert!(!crate::process::is_alive(pid));
        assert!(workshop.boss().employees()[0].is_free());
        let job = workshop
            .boss_mut()
            .pipeline_mut()
            .find(&id)
            .unwrap()
            .unwrap();
        assert_eq!(job.data().status(), Some("failed"));
    }

    #[test]
    fn test_pool_spec_deserializes_flat_filters() {
        let spec: PoolSpec = serde_json::from_str(r#"{"count":2,"exclude":["slow"]}"#).unwrap();
        assert_eq!(spec.count, 2);
        assert_eq!(
            spec.options.exclude_types().map(|t| t.len()),
            Some(1)
        );
    }

    fn raise_sigterm() {
        // SAFETY: only called while `ShutdownSignals` handles SIGTERM.
        unsafe { libc::raise(libc::SIGTERM) };
    }

    fn signalled_workshop(job: TestJob) -> (Workshop, workshop_core::JobId) {
        let mut workshop = Workshop::new(boss(), &[PoolSpec::new(1, EmployeeOptions::any())])
            .with_shutdown_signals(ShutdownSignals::install().unwrap());
        let id = workshop
            .boss_mut()
            .pipeline_mut()
            .enqueue(&job)
            .unwrap()
            .id()
            .unwrap();
        assert_eq!(workshop.boss_mut().delegate_work().unwrap(), 1);
        (workshop, id)
    }

    #[test]
    fn test_first_signal_drains_running_jobs() {
        let _guard = crate::signals::test_lock();
        let (mut workshop, id) = signalled_workshop(TestJob::named("short").sleeping(300));

        raise_sigterm();
        workshop.run(true).unwrap();

        assert_eq!(workshop.state(), WorkshopState::Stopped);
        assert!(workshop.boss().employees()[0].is_free());
        assert!(workshop.boss_mut().pipeline_mut().find(&id).unwrap().is_none());
    }

    #[test]
    fn test_two_signals_stop_immediately() {
        let _guard = crate::signals::test_lock();
        let (mut workshop, id) = signalled_workshop(TestJob::named("forever").sleeping(30_000));
        let pid = workshop.boss().employees()[0].pid().unwrap();

        raise_sigterm();
        raise_sigterm();
        workshop.run(true).unwrap();

        assert_eq!(workshop.state(), WorkshopState::StoppedImmediate);
        assert!(!crate::process::is_alive(pid));
        let job = workshop.boss_mut().pipeline_mut().find(&id).unwrap().unwrap();
        assert_eq!(job.data().status(), Some("failed"));
    }

    #[test]
    fn test_second_signal_during_drain_escalates() {
        let _guard = crate::signals::test_lock();
        let (mut workshop, id) = signalled_workshop(TestJob::named("forever").sleeping(30_000));
        let pid = workshop.boss().employees()[0].pid().unwrap();

        raise_sigterm();
        let later = thread::spawn(|| {
            thread::sleep(Duration::from_millis(300));
            raise_sigterm();
        });
        let started = std::time::Instant::now();
        let result = workshop.run(true);
        later.join().unwrap();
        result.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(workshop.state(), WorkshopState::StoppedImmediate);
        assert!(!crate::process::is_alive(pid));
        let job = workshop.boss_mut().pipeline_mut().find(&id).unwrap().unwrap();
        assert_eq!(job.data().status(), Some("failed"));
    }
}
