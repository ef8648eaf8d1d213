//! Queue error types

use thiserror::Error;
use workshop_core::{CoreError, JobId};

use crate::backend::JobStatus;

/// Errors reported by queue backends
#[derive(Debug, Error)]
pub enum BackendError {
    /// No job with this id exists
    #[error("job not found: {id}")]
    NotFound {
        /// The missing id.
        id: JobId,
    },

    /// The requested transition is not valid from the job's current status
    #[error("cannot {action} job {id} while it is {status}")]
    InvalidTransition {
        /// The job id.
        id: JobId,
        /// The attempted transition.
        action: &'static str,
        /// The job's current status.
        status: JobStatus,
    },

    /// Attributes handed to the backend carry no id
    #[error("job attributes have no id")]
    MissingId,

    /// A stored `not_before` value is not a timestamp
    #[error("invalid not_before timestamp: {value}")]
    InvalidTimestamp {
        /// The offending value.
        value: String,
    },

    /// Backend-specific storage failure
    #[error("storage error: {0}")]
    Storage(String),

    /// IO error talking to the store
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors reported by the [`Pipeline`](crate::Pipeline)
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backend failed
    #[error("queue backend error: {0}")]
    Backend(#[from] BackendError),

    /// A job could not be converted to or from its stored form
    #[error("job serialization error: {0}")]
    Codec(#[from] CoreError),
}

/// Backend result type
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Queue result type
pub type QueueResult<T = ()> = Result<T, QueueError>;
