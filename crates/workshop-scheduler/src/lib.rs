//! # Workshop Scheduler
//!
//! Cron-style recurring jobs. Each tick the supervisor asks the
//! [`Scheduler`] which entries are due for the current minute and enqueues
//! their jobs.
//!
//! ## Architecture
//!
//! - `calendar`: [`CalendarFields`] and minute-resolution matching
//! - `backend`: the [`ScheduleBackend`] contract and stored [`EntryRecord`]s
//! - `memory`: [`MemoryScheduleBackend`], the reference backend
//! - `scheduler`: [`Scheduler`], rebuilding jobs from stored entries
//!
//! ## Example
//!
//! ```rust,ignore
//! use workshop_scheduler::{CalendarFields, MemoryScheduleBackend, Scheduler};
//!
//! let mut scheduler = Scheduler::new(MemoryScheduleBackend::new(), registry);
//! scheduler.schedule(&job, CalendarFields::every_minute().hour(2).minute(5))?;
//! let due = scheduler.jobs_for(now, true)?;
//! ```

#![warn(missing_docs)]
#![warn(unused)]
#![warn(clippy::pedantic)]

pub mod backend;
pub mod calendar;
pub mod entry;
pub mod error;
pub mod memory;
pub mod scheduler;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{EntryId, EntryRecord, ScheduleBackend};
pub use calendar::{CalendarComponents, CalendarField, CalendarFields, truncate_to_minute};
pub use entry::ScheduleEntry;
pub use error::{ScheduleBackendError, ScheduleBackendResult, SchedulerError, SchedulerResult};
pub use memory::MemoryScheduleBackend;
pub use scheduler::Scheduler;
