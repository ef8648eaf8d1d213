//! Recurring job scheduling.

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::debug;

use workshop_core::{Job, JobRegistry};

use crate::backend::{EntryId, ScheduleBackend};
use crate::calendar::{CalendarFields, truncate_to_minute};
use crate::entry::ScheduleEntry;
use crate::error::SchedulerResult;

/// Cron-style schedule of recurring jobs
#[derive(Debug)]
pub struct Scheduler {
    backend: Box<dyn ScheduleBackend>,
    registry: Arc<JobRegistry>,
}

impl Scheduler {
    /// Creates a scheduler over the given backend
    #[must_use]
    pub fn new(backend: impl ScheduleBackend + 'static, registry: Arc<JobRegistry>) -> Self {
        Self::from_boxed(Box::new(backend), registry)
    }

    /// Creates a scheduler over an already boxed backend
    #[must_use]
    pub fn from_boxed(backend: Box<dyn ScheduleBackend>, registry: Arc<JobRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Reconnects the backend if it needs it
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn reconnect(&mut self) -> SchedulerResult<()> {
        self.backend.reconnect()?;
        Ok(())
    }

    /// Removes every entry
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn clear(&mut self) -> SchedulerResult<()> {
        self.backend.clear()?;
        Ok(())
    }

    /// Adds a recurring job firing whenever `fields` match
    ///
    /// # Errors
    ///
    /// Fails if a field is out of range, the job's class is unregistered, or
    /// the backend fails.
    pub fn schedule(
        &mut self,
        job: &dyn Job,
        fields: CalendarFields,
    ) -> SchedulerResult<ScheduleEntry> {
        fields.validate()?;
        let attributes = self.registry.serialize(job)?;
        let record = self.backend.schedule(attributes, fields)?;
        debug!(
            entry_id = %record.id,
            class_name = job.class_name(),
            ?fields,
            "scheduled job"
        );
        ScheduleEntry::from_record(record, &self.registry)
    }

    /// Every entry in the order they were scheduled
    ///
    /// # Errors
    ///
    /// Fails if a stored job cannot be rebuilt or the backend fails.
    pub fn all_entries(&mut self) -> SchedulerResult<Vec<ScheduleEntry>> {
        self.backend
            .all_entries()?
            .into_iter()
            .map(|record| ScheduleEntry::from_record(record, &self.registry))
            .collect()
    }

    /// Looks up an entry by id
    ///
    /// # Errors
    ///
    /// Fails if the stored job cannot be rebuilt or the backend fails.
    pub fn find(&mut self, id: &EntryId) -> SchedulerResult<Option<ScheduleEntry>> {
        match self.backend.find(id)? {
            Some(record) => Ok(Some(ScheduleEntry::from_record(record, &self.registry)?)),
            None => Ok(None),
        }
    }

    /// Removes an entry; unknown ids are ignored
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn delete(&mut self, id: &EntryId) -> SchedulerResult<()> {
        self.backend.delete(id)?;
        Ok(())
    }

    /// Jobs due during the minute containing `at`, in the order their entries
    /// were scheduled
    ///
    /// With `lock`, each entry is returned at most once per minute across
    /// every scheduler sharing the backend. Without it this is a plain read.
    ///
    /// # Errors
    ///
    /// Fails if a stored job cannot be rebuilt or the backend fails.
    pub fn jobs_for(&mut self, at: NaiveDateTime, lock: bool) -> SchedulerResult<Vec<Box<dyn Job>>> {
        let at = truncate_to_minute(at);
        let jobs = self
            .backend
            .jobs_for(at, lock)?
            .into_iter()
            .map(|attributes| self.registry.deserialize(attributes))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(%at, lock, due = jobs.len(), "evaluated schedule");
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use crate::memory::MemoryScheduleBackend;
    use chrono::NaiveDate;
    use workshop_core::testing::{self, TestJob};

    fn scheduler() -> Scheduler {
        Scheduler::new(MemoryScheduleBackend::new(), testing::registry())
    }

    #[test]
    fn test_schedule_returns_entry_with_job() {
        let mut scheduler = scheduler();
        let entry = scheduler
            .schedule(
                &TestJob::named("nightly").with_type("special"),
                CalendarFields::every_minute().hour(2),
            )
            .unwrap();

        assert_eq!(entry.id, EntryId::from(1));
        assert_eq!(entry.fields.hour, Some(2));
        assert_eq!(entry.job.class_name(), "test_job");
        assert_eq!(entry.job.job_type(), "special");
    }

    #[test]
    fn test_schedule_rejects_out_of_range_fields() {
        let mut scheduler = scheduler();
        let result = scheduler.schedule(
            &TestJob::named("bad"),
            CalendarFields::every_minute().minute(61),
        );
        assert!(matches!(result, Err(SchedulerError::FieldOutOfRange { .. })));
        assert!(scheduler.all_entries().unwrap().is_empty());
    }

    #[test]
    fn test_jobs_for_ignores_seconds() {
        let mut scheduler = scheduler();
        scheduler
            .schedule(
                &TestJob::named("a"),
                CalendarFields::every_minute().hour(2).minute(5),
            )
            .unwrap();

        let late_in_minute = NaiveDate::from_ymd_opt(2014, 5, 11)
            .unwrap()
            .and_hms_opt(2, 5, 59)
            .unwrap();
        let early_in_minute = NaiveDate::from_ymd_opt(2014, 5, 11)
            .unwrap()
            .and_hms_opt(2, 5, 0)
            .unwrap();

        assert_eq!(scheduler.jobs_for(late_in_minute, true).unwrap().len(), 1);
        assert!(scheduler.jobs_for(early_in_minute, true).unwrap().is_empty());
    }

    #[test]
    fn test_memory_backend_conformance() {
        crate::testing::run_all(scheduler);
    }
}
