//! The supervisor.
//!
//! Each tick the [`Boss`] runs three steps in a fixed order: enqueue jobs
//! the scheduler says are due, hand queued jobs to free employees, then
//! reconcile employees whose child has exited with the queue. A job
//! enqueued in a tick is therefore never dispatched and reconciled in that
//! same tick.

use chrono::{Local, NaiveDateTime, Timelike};
use std::fmt;
use std::thread;
use std::time::Duration;
use tracing::{Dispatch, debug, dispatcher, info, warn};

use workshop_core::{ForkHook, ForkHookChain, Job, JobId};
use workshop_queue::Pipeline;
use workshop_scheduler::Scheduler;

use crate::WorkerResult;
use crate::employee::{Employee, EmployeeOptions, WorkState};

/// Default pause after a dequeue finds nothing
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(10);

type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

/// Owns the employees and drives them against the queue
pub struct Boss {
    pipeline: Pipeline,
    scheduler: Option<Scheduler>,
    employees: Vec<Employee>,
    fork_hooks: ForkHookChain,
    clock: Clock,
    idle_backoff: Duration,
    logger: Dispatch,
}

impl fmt::Debug for Boss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Boss")
            .field("pipeline", &self.pipeline)
            .field("scheduler", &self.scheduler)
            .field("employees", &self.employees)
            .field("fork_hooks", &self.fork_hooks)
            .field("idle_backoff", &self.idle_backoff)
            .finish_non_exhaustive()
    }
}

/// Local wall-clock time, to the second
fn local_now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

impl Boss {
    /// Creates a boss with no employees and no scheduler
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            scheduler: None,
            employees: Vec::new(),
            fork_hooks: ForkHookChain::new(),
            clock: Box::new(local_now),
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            logger: Dispatch::none(),
        }
    }

    /// Enqueues due recurring jobs from `scheduler` every tick
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the pause after a dequeue finds nothing
    #[must_use]
    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Replaces the clock used to ask the scheduler what is due
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Sets the logger, also handed to employees allocated afterwards
    #[must_use]
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = logger;
        self
    }

    /// Adds a hook run in every child before its job, for employees
    /// allocated afterwards
    #[must_use]
    pub fn with_fork_hook(mut self, hook: impl ForkHook + 'static) -> Self {
        self.fork_hooks.add(hook);
        self
    }

    /// The logger in use
    #[must_use]
    pub fn logger(&self) -> &Dispatch {
        &self.logger
    }

    /// Adds an employee to the end of the pool
    pub fn allocate_employee(&mut self, options: EmployeeOptions) -> &mut Employee {
        let employee = Employee::new(options)
            .with_fork_hooks(self.fork_hooks.clone())
            .with_logger(self.logger.clone());
        self.employees.push(employee);
        let idx = self.employees.len() - 1;
        &mut self.employees[idx]
    }

    /// The employees in allocation order
    #[must_use]
    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    /// The queue
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// The scheduler, if one is configured
    pub fn scheduler_mut(&mut self) -> Option<&mut Scheduler> {
        self.scheduler.as_mut()
    }

    fn logged<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let logger = self.logger.clone();
        dispatcher::with_default(&logger, || f(self))
    }

    /// Enqueues the recurring jobs due this minute. Returns how many were
    /// enqueued; always zero without a scheduler.
    ///
    /// # Errors
    ///
    /// Propagates scheduler and queue failures.
    pub fn schedule_work(&mut self) -> WorkerResult<usize> {
        self.logged(|boss| {
            let Some(scheduler) = boss.scheduler.as_mut() else {
                return Ok(0);
            };

            scheduler.reconnect()?;
            let now = (boss.clock)();
            let due = scheduler.jobs_for(now, true)?;
            for job in &due {
                boss.pipeline.enqueue(job.as_ref())?;
            }
            if !due.is_empty() {
                info!(count = due.len(), %now, "enqueued scheduled jobs");
            }
            Ok(due.len())
        })
    }

    /// Gives each free employee, in allocation order, at most one job that
    /// passes its filters. Returns how many jobs were started.
    ///
    /// # Errors
    ///
    /// Propagates queue failures and `ForkFailed`. A job whose fork failed is
    /// reset in the queue before the error is returned.
    pub fn delegate_work(&mut self) -> WorkerResult<usize> {
        self.logged(|boss| {
            let mut started = 0;
            for employee in &mut boss.employees {
                if !employee.is_free() {
                    continue;
                }

                let Some(job) = boss.pipeline.dequeue(&employee.options().dequeue_options())?
                else {
                    thread::sleep(boss.idle_backoff);
                    continue;
                };

                let id = job.id();
                if let Err(err) = employee.assign(job) {
                    if let Some(id) = id
                        && let Err(release_err) = release(&mut boss.pipeline, &id)
                    {
                        warn!(job_id = %id, error = %release_err, "could not release undispatched job");
                    }
                    return Err(err);
                }
                boss.pipeline.reconnect()?;
                started += 1;
            }
            Ok(started)
        })
    }

    /// Settles every employee whose child has exited: completed jobs are
    /// completed in the queue, failed ones are reset when they may try
    /// again and failed otherwise. The employee is freed only once the queue
    /// transition succeeds, so a queue error leaves the job with it for the
    /// next tick. Returns how many employees were settled.
    ///
    /// Errors from `before_complete` and `before_fail` are logged and do not
    /// stop the queue transition.
    ///
    /// # Errors
    ///
    /// Propagates queue failures and errors polling employees.
    pub fn update_progress(&mut self) -> WorkerResult<usize> {
        self.logged(|boss| {
            let mut settled = 0;
            for employee in &mut boss.employees {
                if employee.is_free() || employee.is_busy()? {
                    continue;
                }

                let state = employee.state();
                if let Some(job) = employee.job_mut() {
                    reconcile(&mut boss.pipeline, job, state)?;
                }
                employee.free()?;
                settled += 1;
            }
            Ok(settled)
        })
    }

    /// Polls every employee and counts those whose child is still running
    ///
    /// # Errors
    ///
    /// Propagates errors polling employees.
    pub fn busy_count(&mut self) -> WorkerResult<usize> {
        let mut busy = 0;
        for employee in &mut self.employees {
            if employee.is_busy()? {
                busy += 1;
            }
        }
        Ok(busy)
    }

    /// Blocks until every busy employee's child has exited
    ///
    /// # Errors
    ///
    /// Propagates errors reaping children.
    pub fn wait_on_employees(&mut self) -> WorkerResult<()> {
        self.logged(|boss| {
            for employee in &mut boss.employees {
                if employee.is_busy()? {
                    debug!(pid = ?employee.pid(), "waiting on employee");
                    employee.poll_state(true)?;
                }
            }
            Ok(())
        })
    }

    /// Kills every busy employee's child
    ///
    /// # Errors
    ///
    /// Propagates errors signalling or reaping children.
    pub fn stop_employees(&mut self) -> WorkerResult<()> {
        self.logged(|boss| {
            for employee in &mut boss.employees {
                if employee.is_busy()? {
                    employee.terminate()?;
                }
            }
            Ok(())
        })
    }
}

/// Puts a dequeued job that never reached a child back at the front of the
/// queue.
fn release(pipeline: &mut Pipeline, id: &JobId) -> WorkerResult<()> {
    if let Some(job) = pipeline.find(id)? {
        pipeline.reset(job.as_ref())?;
        debug!(job_id = %id, "released undispatched job");
    }
    Ok(())
}

fn reconcile(pipeline: &mut Pipeline, job: &mut dyn Job, state: WorkState) -> WorkerResult<()> {
    match state {
        WorkState::Complete => {
            if let Err(err) = job.before_complete() {
                warn!(job_id = ?job.id(), error = %format!("{err:#}"), "before_complete hook failed");
            }
            pipeline.complete(job)?;
            info!(job_id = ?job.id(), class_name = job.class_name(), "job completed");
        }
        WorkState::Failed => {
            if let Err(err) = job.before_fail() {
                warn!(job_id = ?job.id(), error = %format!("{err:#}"), "before_fail hook failed");
            }
            if job.may_try_again() {
                pipeline.reset(job)?;
                warn!(job_id = ?job.id(), class_name = job.class_name(), "job failed, will retry");
            } else {
                pipeline.fail(job)?;
                warn!(job_id = ?job.id(), class_name = job.class_name(), "job failed");
            }
        }
        WorkState::Free | WorkState::Busy => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use workshop_core::testing::{self, TestJob};
    use workshop_core::{Attributes, JobData};
    use workshop_queue::{
        BackendError, BackendResult, DequeueOptions, MemoryBackend, PipelineBackend,
    };
    use workshop_scheduler::{CalendarFields, MemoryScheduleBackend};

    fn boss() -> Boss {
        Boss::new(Pipeline::new(MemoryBackend::new(), testing::registry()))
            .with_idle_backoff(Duration::ZERO)
    }

    fn tick(boss: &mut Boss) {
        boss.delegate_work().unwrap();
        boss.wait_on_employees().unwrap();
        boss.update_progress().unwrap();
    }

    #[test]
    fn test_allocate_keeps_order() {
        let mut boss = boss();
        boss.allocate_employee(EmployeeOptions::any());
        boss.allocate_employee(EmployeeOptions::only(["special"]).unwrap());

        let employees = boss.employees();
        assert_eq!(employees.len(), 2);
        assert!(employees[0].options().only_types().is_none());
        assert!(employees[1].options().only_types().is_some());
    }

    #[test]
    fn test_schedule_work_without_scheduler() {
        assert_eq!(boss().schedule_work().unwrap(), 0);
    }

    #[test]
    fn test_schedule_work_enqueues_due_jobs_once_per_minute() {
        let registry = testing::registry();
        let mut scheduler = Scheduler::new(MemoryScheduleBackend::new(), registry.clone());
        scheduler
            .schedule(
                &TestJob::named("nightly"),
                CalendarFields::every_minute().hour(2).minute(5),
            )
            .unwrap();

        let at = NaiveDate::from_ymd_opt(2014, 5, 11)
            .unwrap()
            .and_hms_opt(2, 5, 30)
            .unwrap();
        let mut boss = Boss::new(Pipeline::new(MemoryBackend::new(), registry))
            .with_scheduler(scheduler)
            .with_clock(move || at);

        assert_eq!(boss.schedule_work().unwrap(), 1);
        assert_eq!(boss.schedule_work().unwrap(), 0);

        let job = boss
            .pipeline_mut()
            .dequeue(&DequeueOptions::any())
            .unwrap()
            .unwrap();
        assert_eq!(job.attributes()["name"], "nightly");
    }

    #[test]
    fn test_delegate_without_work_backs_off() {
        let mut boss = boss();
        boss.allocate_employee(EmployeeOptions::any());
        assert_eq!(boss.delegate_work().unwrap(), 0);
        assert!(boss.employees()[0].is_free());
    }

    #[test]
    fn test_failed_job_is_failed_in_queue() {
        let mut boss = boss();
        boss.allocate_employee(EmployeeOptions::any());
        let id = boss
            .pipeline_mut()
            .enqueue(&TestJob::named("bad").failing())
            .unwrap()
            .id()
            .unwrap();

        tick(&mut boss);

        let job = boss.pipeline_mut().find(&id).unwrap().unwrap();
        assert_eq!(job.data().status(), Some("failed"));
        assert!(boss.employees()[0].is_free());
    }

    #[test]
    fn test_retryable_job_is_reset() {
        let mut boss = boss();
        boss.allocate_employee(EmployeeOptions::any());
        let id = boss
            .pipeline_mut()
            .enqueue(&TestJob::named("flaky").failing().retryable())
            .unwrap()
            .id()
            .unwrap();

        tick(&mut boss);

        let job = boss.pipeline_mut().find(&id).unwrap().unwrap();
        assert_eq!(job.data().status(), Some("free"));
    }

    #[test]
    fn test_stop_employees_fails_running_jobs() {
        let mut boss = boss();
        boss.allocate_employee(EmployeeOptions::any());
        let id = boss
            .pipeline_mut()
            .enqueue(&TestJob::named("forever").sleeping(30_000))
            .unwrap()
            .id()
            .unwrap();

        assert_eq!(boss.delegate_work().unwrap(), 1);
        boss.stop_employees().unwrap();
        assert_eq!(boss.update_progress().unwrap(), 1);

        let job = boss.pipeline_mut().find(&id).unwrap().unwrap();
        assert_eq!(job.data().status(), Some("failed"));
    }

    static BEFORE_FAIL_CALLS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Default)]
    struct HookedJob {
        data: JobData,
    }

    impl Job for HookedJob {
        fn class_name(&self) -> &'static str {
            "hooked_job"
        }

        fn data(&self) -> &JobData {
            &self.data
        }

        fn data_mut(&mut self) -> &mut JobData {
            &mut self.data
        }

        fn perform(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("always fails")
        }

        fn before_fail(&mut self) -> anyhow::Result<()> {
            BEFORE_FAIL_CALLS.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("hook failed too")
        }
    }

    #[test]
    fn test_before_fail_error_does_not_drop_job() {
        let mut registry = workshop_core::JobRegistry::new();
        registry.register::<HookedJob>().unwrap();
        let mut boss = Boss::new(Pipeline::new(MemoryBackend::new(), Arc::new(registry)))
            .with_idle_backoff(Duration::ZERO);
        boss.allocate_employee(EmployeeOptions::any());
        let id = boss
            .pipeline_mut()
            .enqueue(&HookedJob::default())
            .unwrap()
            .id()
            .unwrap();

        tick(&mut boss);

        assert_eq!(BEFORE_FAIL_CALLS.load(Ordering::SeqCst), 1);
        let job = boss.pipeline_mut().find(&id).unwrap().unwrap();
        assert_eq!(job.data().status(), Some("failed"));
    }

    /// Memory backend whose next `complete` calls fail
    #[derive(Debug, Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        failing_completes: usize,
    }

    impl PipelineBackend for FlakyBackend {
        fn reconnect(&mut self) -> BackendResult<()> {
            self.inner.reconnect()
        }

        fn enqueue(
            &mut self,
            attributes: Attributes,
            not_before: Option<DateTime<Utc>>,
        ) -> BackendResult<Attributes> {
            self.inner.enqueue(attributes, not_before)
        }

        fn dequeue(&mut self, options: &DequeueOptions) -> BackendResult<Option<Attributes>> {
            self.inner.dequeue(options)
        }

        fn find(&mut self, id: &JobId) -> BackendResult<Option<Attributes>> {
            self.inner.find(id)
        }

        fn clear(&mut self) -> BackendResult<()> {
            self.inner.clear()
        }

        fn complete(&mut self, attributes: &Attributes) -> BackendResult<()> {
            if self.failing_completes > 0 {
                self.failing_completes -= 1;
                return Err(BackendError::Storage("connection lost".to_string()));
            }
            self.inner.complete(attributes)
        }

        fn reset(&mut self, attributes: Attributes) -> BackendResult<()> {
            self.inner.reset(attributes)
        }

        fn fail(&mut self, attributes: Attributes) -> BackendResult<()> {
            self.inner.fail(attributes)
        }
    }

    #[test]
    fn test_queue_error_keeps_job_for_next_tick() {
        let backend = FlakyBackend {
            failing_completes: 1,
            ..FlakyBackend::default()
        };
        let mut boss = Boss::new(Pipeline::new(backend, testing::registry()))
            .with_idle_backoff(Duration::ZERO);
        boss.allocate_employee(EmployeeOptions::any());
        let id = boss
            .pipeline_mut()
            .enqueue(&TestJob::named("ok"))
            .unwrap()
            .id()
            .unwrap();

        boss.delegate_work().unwrap();
        boss.wait_on_employees().unwrap();
        assert!(boss.update_progress().is_err());

        let employee = &boss.employees()[0];
        assert!(!employee.is_free());
        assert_eq!(employee.state(), WorkState::Complete);
        assert_eq!(employee.job().and_then(|job| job.id()), Some(id.clone()));

        assert_eq!(boss.update_progress().unwrap(), 1);
        assert!(boss.employees()[0].is_free());
        assert!(boss.pipeline_mut().find(&id).unwrap().is_none());
    }

    #[test]
    fn test_release_puts_locked_job_back_first() {
        let mut pipeline = Pipeline::new(MemoryBackend::new(), testing::registry());
        pipeline.enqueue(&TestJob::named("first")).unwrap();
        pipeline.enqueue(&TestJob::named("second")).unwrap();
        let job = pipeline.dequeue(&DequeueOptions::any()).unwrap().unwrap();
        let id = job.id().unwrap();

        release(&mut pipeline, &id).unwrap();
        release(&mut pipeline, &JobId::new("404")).unwrap();

        let found = pipeline.find(&id).unwrap().unwrap();
        assert_eq!(found.data().status(), Some("free"));
        let again = pipeline.dequeue(&DequeueOptions::any()).unwrap().unwrap();
        assert_eq!(again.attributes()["name"], "first");
    }
}
