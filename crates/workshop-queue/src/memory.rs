//! In-memory queue backend.
//!
//! Useful for tests and for single-process runs where jobs do not need to
//! survive a restart. Jobs are kept in three pools: a FIFO of free jobs, the
//! locked jobs handed to workers, and failed jobs retained for inspection.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;

use workshop_core::{Attributes, ID_KEY, JobId, NOT_BEFORE_KEY, STATUS_KEY};

use crate::backend::{
    DequeueOptions, JobStatus, PipelineBackend, job_id_of, job_type_of, not_before_of,
    not_before_value,
};
use crate::error::{BackendError, BackendResult};

/// Queue backend held in process memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    next_id: u64,
    free: VecDeque<Attributes>,
    locked: Vec<Attributes>,
    failed: Vec<Attributes>,
}

impl MemoryBackend {
    /// Creates an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to be dequeued
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of jobs handed to workers
    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.locked.len()
    }

    /// Number of failed jobs
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Returns true if no job is stored in any status
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty() && self.locked.is_empty() && self.failed.is_empty()
    }

    fn status_of(&self, id: &JobId) -> Option<JobStatus> {
        if position(&self.locked, id).is_some() {
            Some(JobStatus::Locked)
        } else if position(&self.failed, id).is_some() {
            Some(JobStatus::Failed)
        } else if self.free.iter().any(|a| has_id(a, id)) {
            Some(JobStatus::Free)
        } else {
            None
        }
    }

    fn rejected(&self, id: JobId, action: &'static str) -> BackendError {
        match self.status_of(&id) {
            Some(status) => BackendError::InvalidTransition { id, action, status },
            None => BackendError::NotFound { id },
        }
    }

    fn is_available(attributes: &Attributes, now: DateTime<Utc>) -> BackendResult<bool> {
        Ok(not_before_of(attributes)?.is_none_or(|not_before| not_before <= now))
    }
}

fn has_id(attributes: &Attributes, id: &JobId) -> bool {
    attributes.get(ID_KEY).and_then(JobId::from_value).as_ref() == Some(id)
}

fn position(pool: &[Attributes], id: &JobId) -> Option<usize> {
    pool.iter().position(|a| has_id(a, id))
}

fn set_status(attributes: &mut Attributes, status: JobStatus) {
    attributes.insert(
        STATUS_KEY.to_string(),
        Value::String(status.as_str().to_string()),
    );
}

impl PipelineBackend for MemoryBackend {
    fn reconnect(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn enqueue(
        &mut self,
        mut attributes: Attributes,
        not_before: Option<DateTime<Utc>>,
    ) -> BackendResult<Attributes> {
        self.next_id += 1;
        attributes.insert(ID_KEY.to_string(), JobId::from(self.next_id).to_value());
        set_status(&mut attributes, JobStatus::Free);
        attributes.insert(NOT_BEFORE_KEY.to_string(), not_before_value(not_before));

        self.free.push_back(attributes.clone());
        Ok(attributes)
    }

    fn dequeue(&mut self, options: &DequeueOptions) -> BackendResult<Option<Attributes>> {
        let now = Utc::now();

        let mut found = None;
        for (idx, attributes) in self.free.iter().enumerate() {
            if options.accepts(job_type_of(attributes)) && Self::is_available(attributes, now)? {
                found = Some(idx);
                break;
            }
        }

        let Some(mut attributes) = found.and_then(|idx| self.free.remove(idx)) else {
            return Ok(None);
        };
        set_status(&mut attributes, JobStatus::Locked);
        self.locked.push(attributes.clone());
        Ok(Some(attributes))
    }

    fn find(&mut self, id: &JobId) -> BackendResult<Option<Attributes>> {
        let found = self
            .locked
            .iter()
            .chain(self.failed.iter())
            .chain(self.free.iter())
            .find(|a| has_id(a, id))
            .cloned();
        Ok(found)
    }

    fn clear(&mut self) -> BackendResult<()> {
        self.free.clear();
        self.locked.clear();
        self.failed.clear();
        Ok(())
    }

    fn complete(&mut self, attributes: &Attributes) -> BackendResult<()> {
        let id = job_id_of(attributes)?;
        match position(&self.locked, &id) {
            Some(idx) => {
                self.locked.remove(idx);
                Ok(())
            }
            None => Err(self.rejected(id, "complete")),
        }
    }

    fn reset(&mut self, mut attributes: Attributes) -> BackendResult<()> {
        let id = job_id_of(&attributes)?;
        if let Some(idx) = position(&self.locked, &id) {
            self.locked.remove(idx);
        } else if let Some(idx) = position(&self.failed, &id) {
            self.failed.remove(idx);
        } else {
            return Err(self.rejected(id, "reset"));
        }

        set_status(&mut attributes, JobStatus::Free);
        self.free.push_front(attributes);
        Ok(())
    }

    fn fail(&mut self, mut attributes: Attributes) -> BackendResult<()> {
        let id = job_id_of(&attributes)?;
        if let Some(idx) = position(&self.locked, &id) {
            self.locked.remove(idx);
        } else if let Some(idx) = position(&self.failed, &id) {
            self.failed.remove(idx);
        } else {
            return Err(self.rejected(id, "fail"));
        }

        set_status(&mut attributes, JobStatus::Failed);
        self.failed.push(attributes);
        Ok(())
    }
}
