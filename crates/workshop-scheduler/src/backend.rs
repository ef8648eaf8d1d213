//! Schedule backend contract.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use workshop_core::Attributes;

use crate::calendar::CalendarFields;
use crate::error::ScheduleBackendResult;

/// Identifier of a schedule entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
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
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for EntryId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A schedule entry as stored by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    /// Backend-assigned id
    pub id: EntryId,
    /// Serialized job to enqueue when the entry fires
    pub job: Attributes,
    /// When the entry fires
    #[serde(flatten)]
    pub fields: CalendarFields,
    /// Last minute the entry was handed out with locking
    pub locked_until: Option<NaiveDateTime>,
}

/// Storage behind a [`Scheduler`](crate::Scheduler)
///
/// Backends shared by several scheduler processes must make the lock taken
/// by `jobs_for` atomic, so that each entry fires once per minute overall.
pub trait ScheduleBackend: Send + fmt::Debug {
    /// Re-establishes the connection if needed. Called once per supervisor
    /// tick before the schedule is read.
    fn reconnect(&mut self) -> ScheduleBackendResult<()>;

    /// Removes every entry
    fn clear(&mut self) -> ScheduleBackendResult<()>;

    /// Every entry, in the order they were scheduled
    fn all_entries(&mut self) -> ScheduleBackendResult<Vec<EntryRecord>>;

    /// Looks up an entry by id
    fn find(&mut self, id: &EntryId) -> ScheduleBackendResult<Option<EntryRecord>>;

    /// Removes an entry; unknown ids are ignored
    fn delete(&mut self, id: &EntryId) -> ScheduleBackendResult<()>;

    /// Stores a new entry and returns it with its id
    fn schedule(
        &mut self,
        job: Attributes,
        fields: CalendarFields,
    ) -> ScheduleBackendResult<EntryRecord>;

    /// Serialized jobs of the entries matching the minute `at`, in the order
    /// they were scheduled. With `lock`, entries already handed out for this
    /// minute are skipped and the returned ones are locked through `at`.
    fn jobs_for(&mut self, at: NaiveDateTime, lock: bool) -> ScheduleBackendResult<Vec<Attributes>>;
}
