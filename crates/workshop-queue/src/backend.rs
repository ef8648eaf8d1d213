//! Queue backend contract.
//!
//! Backends store jobs as flat attribute maps. Beyond the job's own keys the
//! framework relies on `id`, `status`, `className`, `type` and `not_before`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use workshop_core::{Attributes, DEFAULT_JOB_TYPE, JobId, NOT_BEFORE_KEY, TYPE_KEY};

use crate::error::{BackendError, BackendResult};

/// Storage behind a [`Pipeline`](crate::Pipeline)
///
/// Implementations must provide at-most-one-consumer semantics for
/// `dequeue`; the framework does no locking of its own.
pub trait PipelineBackend: Send + fmt::Debug {
    /// Re-establishes the connection or drops read caches. Called by the
    /// supervisor after every dispatch.
    fn reconnect(&mut self) -> BackendResult<()>;

    /// Stores a new job, assigning its `id` and setting `status` to `free`.
    /// Returns the stored attributes.
    fn enqueue(
        &mut self,
        attributes: Attributes,
        not_before: Option<DateTime<Utc>>,
    ) -> BackendResult<Attributes>;

    /// Locks and returns the next available job matching the filters
    fn dequeue(&mut self, options: &DequeueOptions) -> BackendResult<Option<Attributes>>;

    /// Looks up a job by id in any status
    fn find(&mut self, id: &JobId) -> BackendResult<Option<Attributes>>;

    /// Removes every job
    fn clear(&mut self) -> BackendResult<()>;

    /// Removes a locked job permanently
    fn complete(&mut self, attributes: &Attributes) -> BackendResult<()>;

    /// Puts a locked or failed job back at the front of the queue
    fn reset(&mut self, attributes: Attributes) -> BackendResult<()>;

    /// Marks a locked or already failed job failed, keeping it for inspection
    fn fail(&mut self, attributes: Attributes) -> BackendResult<()>;
}

/// Job status as stored by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be dequeued
    Free,
    /// Handed to a worker
    Locked,
    /// Failed and retained
    Failed,
}

impl JobStatus {
    /// The stored string form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Locked => "locked",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type filters applied when dequeuing
///
/// When both sets are present, `exclude` wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DequeueOptions {
    /// Only dequeue jobs of these types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<BTreeSet<String>>,
    /// Never dequeue jobs of these types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<BTreeSet<String>>,
}

impl DequeueOptions {
    /// Accepts any job type
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Accepts only the given types
    #[must_use]
    pub fn only<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: Some(types.into_iter().map(Into::into).collect()),
            exclude: None,
        }
    }

    /// Accepts every type except the given ones
    #[must_use]
    pub fn exclude<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: None,
            exclude: Some(types.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns true if a job of this type passes the filters
    #[must_use]
    pub fn accepts(&self, job_type: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            return !exclude.contains(job_type);
        }
        if let Some(only) = &self.only {
            return only.contains(job_type);
        }
        true
    }
}

/// Reads the `type` of stored attributes
#[must_use]
pub fn job_type_of(attributes: &Attributes) -> &str {
    attributes
        .get(TYPE_KEY)
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_JOB_TYPE)
}

/// Reads the `id` of stored attributes
///
/// # Errors
///
/// Fails if the attributes carry no usable id.
pub fn job_id_of(attributes: &Attributes) -> BackendResult<JobId> {
    attributes
        .get(workshop_core::ID_KEY)
        .and_then(JobId::from_value)
        .ok_or(BackendError::MissingId)
}

/// Reads the `not_before` timestamp of stored attributes
///
/// # Errors
///
/// Fails if the value is present but not an RFC 3339 timestamp.
pub fn not_before_of(attributes: &Attributes) -> BackendResult<Option<DateTime<Utc>>> {
    match attributes.get(NOT_BEFORE_KEY) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(value)) => DateTime::parse_from_rfc3339(value)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| BackendError::InvalidTimestamp {
                value: value.clone(),
            }),
        Some(other) => Err(BackendError::InvalidTimestamp {
            value: other.to_string(),
        }),
    }
}

/// Encodes a `not_before` timestamp for storage
#[must_use]
pub fn not_before_value(not_before: Option<DateTime<Utc>>) -> serde_json::Value {
    not_before.map_or(serde_json::Value::Null, |t| {
        serde_json::Value::String(t.to_rfc3339())
    })
}
