//! # Workshop Queue
//!
//! The job queue ("pipeline") and its pluggable storage.
//!
//! ## Architecture
//!
//! - `backend`: the [`PipelineBackend`] contract and [`DequeueOptions`]
//! - `memory`: [`MemoryBackend`], the reference backend
//! - `pipeline`: [`Pipeline`], converting jobs to and from stored attributes
//!
//! ## Example
//!
//! ```rust,ignore
//! use workshop_queue::{DequeueOptions, MemoryBackend, Pipeline};
//!
//! let mut pipeline = Pipeline::new(MemoryBackend::new(), registry);
//! let stored = pipeline.enqueue(&job)?;
//! let next = pipeline.dequeue(&DequeueOptions::any())?;
//! ```

#![warn(missing_docs)]
#![warn(unused)]
#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod memory;
pub mod pipeline;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{DequeueOptions, JobStatus, PipelineBackend};
pub use error::{BackendError, BackendResult, QueueError, QueueResult};
pub use memory::MemoryBackend;
pub use pipeline::Pipeline;
