//! In-memory schedule backend.

use chrono::NaiveDateTime;

use workshop_core::Attributes;

use crate::backend::{EntryId, EntryRecord, ScheduleBackend};
use crate::calendar::CalendarFields;
use crate::error::ScheduleBackendResult;

/// Schedule held in process memory
#[derive(Debug, Default)]
pub struct MemoryScheduleBackend {
    next_id: u64,
    entries: Vec<EntryRecord>,
}

impl MemoryScheduleBackend {
    /// Creates an empty schedule
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is scheduled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ScheduleBackend for MemoryScheduleBackend {
    fn reconnect(&mut self) -> ScheduleBackendResult<()> {
        Ok(())
    }

    fn clear(&mut self) -> ScheduleBackendResult<()> {
        self.next_id = 0;
        self.entries.clear();
        Ok(())
    }

    fn all_entries(&mut self) -> ScheduleBackendResult<Vec<EntryRecord>> {
        Ok(self.entries.clone())
    }

    fn find(&mut self, id: &EntryId) -> ScheduleBackendResult<Option<EntryRecord>> {
        Ok(self.entries.iter().find(|e| &e.id == id).cloned())
    }

    fn delete(&mut self, id: &EntryId) -> ScheduleBackendResult<()> {
        self.entries.retain(|e| &e.id != id);
        Ok(())
    }

    fn schedule(
        &mut self,
        job: Attributes,
        fields: CalendarFields,
    ) -> ScheduleBackendResult<EntryRecord> {
        self.next_id += 1;
        let entry = EntryRecord {
            id: EntryId::from(self.next_id),
            job,
            fields,
            locked_until: None,
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn jobs_for(&mut self, at: NaiveDateTime, lock: bool) -> ScheduleBackendResult<Vec<Attributes>> {
        let mut jobs = Vec::new();

        for entry in &mut self.entries {
            if !entry.fields.matches(&at) {
                continue;
            }

            if lock {
                if entry.locked_until.is_some_and(|locked| locked >= at) {
                    continue;
                }
                entry.locked_until = Some(at);
            }

            jobs.push(entry.job.clone());
        }

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 5, 11)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn job(name: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!(name));
        attributes
    }

    #[test]
    fn test_schedule_assigns_sequential_ids() {
        let mut backend = MemoryScheduleBackend::new();
        let first = backend
            .schedule(job("a"), CalendarFields::every_minute())
            .unwrap();
        let second = backend
            .schedule(job("b"), CalendarFields::every_minute())
            .unwrap();
        assert_eq!(first.id, EntryId::from(1));
        assert_eq!(second.id, EntryId::from(2));
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_clear_restarts_ids() {
        let mut backend = MemoryScheduleBackend::new();
        backend
            .schedule(job("a"), CalendarFields::every_minute())
            .unwrap();
        backend.clear().unwrap();
        assert!(backend.is_empty());
        let entry = backend
            .schedule(job("b"), CalendarFields::every_minute())
            .unwrap();
        assert_eq!(entry.id, EntryId::from(1));
    }

    #[test]
    fn test_lock_records_minute() {
        let mut backend = MemoryScheduleBackend::new();
        let entry = backend
            .schedule(job("a"), CalendarFields::every_minute())
            .unwrap();

        assert_eq!(backend.jobs_for(at(2, 5), true).unwrap().len(), 1);
        let stored = backend.find(&entry.id).unwrap().unwrap();
        assert_eq!(stored.locked_until, Some(at(2, 5)));
    }

    #[test]
    fn test_unlocked_read_leaves_lock_alone() {
        let mut backend = MemoryScheduleBackend::new();
        let entry = backend
            .schedule(job("a"), CalendarFields::every_minute())
            .unwrap();

        backend.jobs_for(at(2, 5), false).unwrap();
        assert_eq!(backend.find(&entry.id).unwrap().unwrap().locked_until, None);
    }

    #[test]
    fn test_earlier_minute_stays_locked() {
        let mut backend = MemoryScheduleBackend::new();
        backend
            .schedule(job("a"), CalendarFields::every_minute())
            .unwrap();

        backend.jobs_for(at(2, 6), true).unwrap();
        assert!(backend.jobs_for(at(2, 5), true).unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_is_ignored() {
        let mut backend = MemoryScheduleBackend::new();
        backend
            .schedule(job("a"), CalendarFields::every_minute())
            .unwrap();
        backend.delete(&EntryId::new("nope")).unwrap();
        assert_eq!(backend.len(), 1);
    }
}
