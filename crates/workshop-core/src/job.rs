//! Job contract.
//!
//! A job is a unit of work with a backend-assigned identity, a type tag used
//! for worker filtering, a retry policy and a bag of serializable attributes.
//! Implementations embed a [`JobData`] and only have to provide
//! [`Job::perform`] and a class name; everything else has a default.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// String-keyed attribute map stored alongside a job
pub type Attributes = Map<String, Value>;

/// Type tag given to jobs that do not set one
pub const DEFAULT_JOB_TYPE: &str = "job";

/// Attribute key holding the backend-assigned id
pub const ID_KEY: &str = "id";

/// Attribute key holding the backend status (`free`, `locked`, `failed`)
pub const STATUS_KEY: &str = "status";

/// Attribute key holding the earliest time a job may be dequeued
pub const NOT_BEFORE_KEY: &str = "not_before";

/// Opaque job identifier assigned by a queue backend on first enqueue
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates an id from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads an id out of an attribute value. Backends may store ids as
    /// strings or numbers.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Converts the id into an attribute value
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Type tag and attributes shared by every job implementation
#[derive(Debug, Clone, PartialEq)]
pub struct JobData {
    job_type: String,
    attributes: Attributes,
}

impl Default for JobData {
    fn default() -> Self {
        Self {
            job_type: DEFAULT_JOB_TYPE.to_string(),
            attributes: Attributes::new(),
        }
    }
}

impl JobData {
    /// Creates empty job data with the default type
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the type tag
    #[must_use]
    pub fn with_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = job_type.into();
        self
    }

    /// Sets a single attribute
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the id, present once the job has been enqueued
    #[must_use]
    pub fn id(&self) -> Option<JobId> {
        self.attributes.get(ID_KEY).and_then(JobId::from_value)
    }

    /// Returns the backend status, if the job was loaded from a backend
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.attributes.get(STATUS_KEY).and_then(Value::as_str)
    }

    /// Returns the type tag
    #[must_use]
    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// Replaces the type tag
    pub fn set_job_type(&mut self, job_type: impl Into<String>) {
        self.job_type = job_type.into();
    }

    /// Returns the attribute bag
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Replaces the attribute bag
    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }

    /// Looks up a single attribute
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Sets a single attribute
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }
}

/// A unit of work executed in an isolated worker process
///
/// `perform` runs in a forked child; returning an error (or panicking) makes
/// the child exit with a non-zero status, which the supervisor observes as a
/// failed job.
#[allow(clippy::missing_errors_doc)]
pub trait Job: fmt::Debug + Send {
    /// Discriminator used to rebuild the concrete type from stored attributes.
    /// Must match the name the type was registered under.
    fn class_name(&self) -> &'static str;

    /// Shared job data
    fn data(&self) -> &JobData;

    /// Shared job data, mutably
    fn data_mut(&mut self) -> &mut JobData;

    /// Executes the job
    fn perform(&mut self) -> anyhow::Result<()>;

    /// Whether a failed run should be put back at the front of the queue
    fn may_try_again(&self) -> bool {
        false
    }

    /// Runs in the supervisor right before the job is marked complete
    fn before_complete(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs in the supervisor right before the job is reset or marked failed
    fn before_fail(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Backend-assigned id, unset until enqueued
    fn id(&self) -> Option<JobId> {
        self.data().id()
    }

    /// Type tag used by worker filters
    fn job_type(&self) -> &str {
        self.data().job_type()
    }

    /// Replaces the type tag
    fn set_job_type(&mut self, job_type: String) {
        self.data_mut().set_job_type(job_type);
    }

    /// Attributes persisted with the job
    fn attributes(&self) -> &Attributes {
        self.data().attributes()
    }

    /// Replaces the persisted attributes (used when loading a job)
    fn set_attributes(&mut self, attributes: Attributes) {
        self.data_mut().set_attributes(attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct NoopJob {
        data: JobData,
    }

    impl Job for NoopJob {
        fn class_name(&self) -> &'static str {
            "noop"
        }

        fn data(&self) -> &JobData {
            &self.data
        }

        fn data_mut(&mut self) -> &mut JobData {
            &mut self.data
        }

        fn perform(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_job_defaults() {
        let job = NoopJob::default();
        assert_eq!(job.job_type(), DEFAULT_JOB_TYPE);
        assert!(job.id().is_none());
        assert!(!job.may_try_again());
        assert!(job.attributes().is_empty());
    }

    #[test]
    fn test_job_id_from_attributes() {
        let mut job = NoopJob::default();
        let mut attributes = Attributes::new();
        attributes.insert(ID_KEY.to_string(), json!(7));
        job.set_attributes(attributes);
        assert_eq!(job.id(), Some(JobId::from(7)));

        job.data_mut().insert(ID_KEY, "abc");
        assert_eq!(job.id(), Some(JobId::new("abc")));
    }

    #[test]
    fn test_job_id_rejects_empty_and_null() {
        assert!(JobId::from_value(&json!("")).is_none());
        assert!(JobId::from_value(&Value::Null).is_none());
        assert!(JobId::from_value(&json!(true)).is_none());
    }

    #[test]
    fn test_job_data_builder() {
        let data = JobData::new()
            .with_type("special")
            .with("name", "report")
            .with(STATUS_KEY, "locked");
        assert_eq!(data.job_type(), "special");
        assert_eq!(data.get("name"), Some(&json!("report")));
        assert_eq!(data.status(), Some("locked"));
    }

    #[test]
    fn test_set_job_type() {
        let mut job = NoopJob::default();
        job.set_job_type("mail".to_string());
        assert_eq!(job.job_type(), "mail");
    }
}
