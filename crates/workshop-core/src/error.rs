//! Error types for the job contract

use thiserror::Error;

/// Errors raised while registering or rebuilding jobs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A job type reported an empty class name
    #[error("Job class name cannot be empty")]
    EmptyClassName,

    /// A class name was registered twice
    #[error("Job class '{class_name}' is already registered")]
    DuplicateJobClass {
        /// The duplicated class name.
        class_name: String,
    },

    /// Stored attributes carry no `className`
    #[error("Stored job has no className")]
    MissingClassName,

    /// Stored attributes name a class this process does not know
    #[error("Unknown job class '{class_name}'")]
    UnknownJobClass {
        /// The unknown class name.
        class_name: String,
    },
}

/// Core result type
pub type CoreResult<T = ()> = Result<T, CoreError>;
