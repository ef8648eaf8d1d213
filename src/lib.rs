//! # Workshop - process-based job processing
//!
//! A pool of worker processes pulls jobs from a pluggable queue and runs
//! each one in its own forked child, reporting success, failure or retry
//! back to the queue. An optional cron-style scheduler enqueues recurring
//! jobs once per matching minute.
//!
//! ## Crates
//!
//! - [`workshop_core`]: the `Job` trait, job registry and fork hooks
//! - [`workshop_queue`]: the queue (`Pipeline`) and its backends
//! - [`workshop_scheduler`]: calendar matching and the `Scheduler`
//! - [`workshop_worker`]: employees, the boss and the run loop
//! - [`workshop_cli`]: the `workshop` binary's commands and configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use workshop::prelude::*;
//!
//! let registry = Arc::new(JobRegistry::new().with::<MyJob>()?);
//! let mut pipeline = Pipeline::new(MemoryBackend::new(), registry.clone());
//! pipeline.enqueue(&MyJob::default())?;
//!
//! let boss = Boss::new(pipeline);
//! let mut workshop = Workshop::new(boss, &[PoolSpec::new(4, EmployeeOptions::any())]);
//! workshop.run(false)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub use workshop_cli;
pub use workshop_core;
pub use workshop_queue;
pub use workshop_scheduler;
pub use workshop_worker;

/// Common imports
pub mod prelude {
    pub use workshop_core::{Attributes, ForkHook, ForkHookChain, Job, JobData, JobId, JobRegistry};
    pub use workshop_queue::{DequeueOptions, MemoryBackend, Pipeline, PipelineBackend};
    pub use workshop_scheduler::{
        CalendarFields, MemoryScheduleBackend, ScheduleBackend, ScheduleEntry, Scheduler,
    };
    pub use workshop_worker::{
        Boss, Employee, EmployeeOptions, PoolSpec, ShutdownSignals, WorkState, Workshop,
        WorkshopState,
    };
}
