//! Scheduler error types

use thiserror::Error;
use workshop_core::CoreError;

use crate::calendar::CalendarField;

/// Errors reported by schedule backends
#[derive(Debug, Error)]
pub enum ScheduleBackendError {
    /// Backend-specific storage failure
    #[error("storage error: {0}")]
    Storage(String),

    /// IO error talking to the store
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors reported by the [`Scheduler`](crate::Scheduler)
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The backend failed
    #[error("schedule backend error: {0}")]
    Backend(#[from] ScheduleBackendError),

    /// A job could not be converted to or from its stored form
    #[error("job serialization error: {0}")]
    Codec(#[from] CoreError),

    /// A calendar field is outside its valid range
    #[error("{field} must be between {min} and {max}, got {value}")]
    FieldOutOfRange {
        /// The offending field.
        field: CalendarField,
        /// The rejected value.
        value: u32,
        /// Smallest valid value.
        min: u32,
        /// Largest valid value.
        max: u32,
    },
}

/// Schedule backend result type
pub type ScheduleBackendResult<T = ()> = Result<T, ScheduleBackendError>;

/// Scheduler result type
pub type SchedulerResult<T = ()> = Result<T, SchedulerError>;
