//! Schedule entries as seen by callers.

use workshop_core::{Job, JobRegistry};

use crate::backend::{EntryId, EntryRecord};
use crate::calendar::CalendarFields;
use crate::error::SchedulerResult;

/// A recurring job definition with its job rebuilt
#[derive(Debug)]
pub struct ScheduleEntry {
    /// Backend-assigned id
    pub id: EntryId,
    /// The job enqueued each time the entry fires
    pub job: Box<dyn Job>,
    /// When the entry fires
    pub fields: CalendarFields,
}

impl ScheduleEntry {
    pub(crate) fn from_record(record: EntryRecord, registry: &JobRegistry) -> SchedulerResult<Self> {
        Ok(Self {
            id: record.id,
            job: registry.deserialize(record.job)?,
            fields: record.fields,
        })
    }
}
