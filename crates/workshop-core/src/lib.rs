//! # Workshop Core
//!
//! The job contract shared by every Workshop crate.
//!
//! ## Architecture
//!
//! - `job`: the [`Job`] trait, its [`JobData`] attribute bag and [`JobId`]
//! - `registry`: the [`JobRegistry`] mapping stored `className`
//!   discriminators back to concrete job types
//! - `hooks`: [`ForkHook`]s run in worker children before a job performs
//!
//! ## Example
//!
//! ```rust
//! use workshop_core::{Job, JobData, JobRegistry};
//!
//! #[derive(Debug, Default)]
//! struct SendReport {
//!     data: JobData,
//! }
//!
//! impl Job for SendReport {
//!     fn class_name(&self) -> &'static str {
//!         "send_report"
//!     }
//!
//!     fn data(&self) -> &JobData {
//!         &self.data
//!     }
//!
//!     fn data_mut(&mut self) -> &mut JobData {
//!         &mut self.data
//!     }
//!
//!     fn perform(&mut self) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let registry = JobRegistry::new().with::<SendReport>().unwrap();
//! let stored = registry.serialize(&SendReport::default()).unwrap();
//! let job = registry.deserialize(stored).unwrap();
//! assert_eq!(job.class_name(), "send_report");
//! assert_eq!(job.job_type(), "job");
//! ```

#![warn(missing_docs)]
#![warn(unused)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod hooks;
pub mod job;
pub mod registry;

#[cfg(feature = "testing")]
pub mod testing;

pub use error::{CoreError, CoreResult};
pub use hooks::{ForkHook, ForkHookChain};
pub use job::{
    Attributes, DEFAULT_JOB_TYPE, ID_KEY, Job, JobData, JobId, NOT_BEFORE_KEY, STATUS_KEY,
};
pub use registry::{CLASS_NAME_KEY, JobFactory, JobRegistry, TYPE_KEY};
