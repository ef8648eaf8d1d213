//! The job queue.
//!
//! A [`Pipeline`] converts jobs to and from the attribute maps a
//! [`PipelineBackend`] stores, using a [`JobRegistry`] to rebuild concrete
//! job types.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use workshop_core::{Job, JobId, JobRegistry};

use crate::backend::{DequeueOptions, PipelineBackend};
use crate::error::QueueResult;

/// Queue of jobs backed by a pluggable store
#[derive(Debug)]
pub struct Pipeline {
    backend: Box<dyn PipelineBackend>,
    registry: Arc<JobRegistry>,
}

impl Pipeline {
    /// Creates a pipeline over the given backend
    #[must_use]
    pub fn new(backend: impl PipelineBackend + 'static, registry: Arc<JobRegistry>) -> Self {
        Self::from_boxed(Box::new(backend), registry)
    }

    /// Creates a pipeline over an already boxed backend
    #[must_use]
    pub fn from_boxed(backend: Box<dyn PipelineBackend>, registry: Arc<JobRegistry>) -> Self {
        Self { backend, registry }
    }

    /// The registry used to rebuild jobs
    #[must_use]
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Reconnects the backend if it needs it
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn reconnect(&mut self) -> QueueResult<()> {
        self.backend.reconnect()?;
        Ok(())
    }

    /// Pushes a job onto the queue, returning the stored copy with its id
    ///
    /// # Errors
    ///
    /// Fails if the job's class is unregistered or the backend fails.
    pub fn enqueue(&mut self, job: &dyn Job) -> QueueResult<Box<dyn Job>> {
        self.enqueue_at(job, None)
    }

    /// Pushes a job that must not be dequeued before `not_before`
    ///
    /// # Errors
    ///
    /// See [`Pipeline::enqueue`].
    pub fn enqueue_delayed(
        &mut self,
        job: &dyn Job,
        not_before: DateTime<Utc>,
    ) -> QueueResult<Box<dyn Job>> {
        self.enqueue_at(job, Some(not_before))
    }

    fn enqueue_at(
        &mut self,
        job: &dyn Job,
        not_before: Option<DateTime<Utc>>,
    ) -> QueueResult<Box<dyn Job>> {
        let attributes = self.registry.serialize(job)?;
        let stored = self.backend.enqueue(attributes, not_before)?;
        let job = self.registry.deserialize(stored)?;
        debug!(
            job_id = ?job.id(),
            job_type = job.job_type(),
            class_name = job.class_name(),
            "enqueued job"
        );
        Ok(job)
    }

    /// Takes the next available job matching the filters
    ///
    /// # Errors
    ///
    /// Fails if the stored job cannot be rebuilt or the backend fails.
    pub fn dequeue(&mut self, options: &DequeueOptions) -> QueueResult<Option<Box<dyn Job>>> {
        match self.backend.dequeue(options)? {
            Some(attributes) => Ok(Some(self.registry.deserialize(attributes)?)),
            None => Ok(None),
        }
    }

    /// Finds a job by id, whatever its status
    ///
    /// # Errors
    ///
    /// Fails if the stored job cannot be rebuilt or the backend fails.
    pub fn find(&mut self, id: &JobId) -> QueueResult<Option<Box<dyn Job>>> {
        match self.backend.find(id)? {
            Some(attributes) => Ok(Some(self.registry.deserialize(attributes)?)),
            None => Ok(None),
        }
    }

    /// Deletes every job
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn clear(&mut self) -> QueueResult<()> {
        self.backend.clear()?;
        Ok(())
    }

    /// Marks a locked job completed, removing it
    ///
    /// # Errors
    ///
    /// Propagates backend failures, including an invalid transition.
    pub fn complete(&mut self, job: &dyn Job) -> QueueResult<()> {
        let attributes = self.registry.serialize(job)?;
        self.backend.complete(&attributes)?;
        debug!(job_id = ?job.id(), "completed job");
        Ok(())
    }

    /// Puts a job back at the front of the queue
    ///
    /// # Errors
    ///
    /// Propagates backend failures, including an invalid transition.
    pub fn reset(&mut self, job: &dyn Job) -> QueueResult<()> {
        let attributes = self.registry.serialize(job)?;
        self.backend.reset(attributes)?;
        debug!(job_id = ?job.id(), "reset job");
        Ok(())
    }

    /// Marks a job failed, keeping it for inspection
    ///
    /// # Errors
    ///
    /// Propagates backend failures, including an invalid transition.
    pub fn fail(&mut self, job: &dyn Job) -> QueueResult<()> {
        let attributes = self.registry.serialize(job)?;
        self.backend.fail(attributes)?;
        debug!(job_id = ?job.id(), "failed job");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;
    use crate::error::{BackendError, QueueError};
    use workshop_core::testing::{self, TestJob};
    use workshop_core::{CoreError, JobData};

    fn pipeline() -> Pipeline {
        Pipeline::new(MemoryBackend::new(), testing::registry())
    }

    #[test]
    fn test_enqueue_returns_stored_job() {
        let mut pipeline = pipeline();
        let job = pipeline
            .enqueue(&TestJob::named("a").with_type("special"))
            .unwrap();

        assert_eq!(job.class_name(), "test_job");
        assert_eq!(job.job_type(), "special");
        assert_eq!(job.id(), Some(JobId::new("1")));
        assert_eq!(job.data().status(), Some("free"));
        assert_eq!(job.attributes()["name"], "a");
    }

    #[test]
    fn test_dequeue_rebuilds_concrete_job() {
        let mut pipeline = pipeline();
        pipeline.enqueue(&TestJob::named("a").retryable()).unwrap();

        let job = pipeline.dequeue(&DequeueOptions::any()).unwrap().unwrap();
        assert!(job.may_try_again());
        assert_eq!(job.data().status(), Some("locked"));
    }

    #[test]
    fn test_complete_then_find() {
        let mut pipeline = pipeline();
        let stored = pipeline.enqueue(&TestJob::named("a")).unwrap();
        let id = stored.id().unwrap();

        let job = pipeline.dequeue(&DequeueOptions::any()).unwrap().unwrap();
        pipeline.complete(job.as_ref()).unwrap();
        assert!(pipeline.find(&id).unwrap().is_none());
    }

    #[test]
    fn test_fail_then_find() {
        let mut pipeline = pipeline();
        let id = pipeline.enqueue(&TestJob::named("a")).unwrap().id().unwrap();

        let job = pipeline.dequeue(&DequeueOptions::any()).unwrap().unwrap();
        pipeline.fail(job.as_ref()).unwrap();
        let found = pipeline.find(&id).unwrap().unwrap();
        assert_eq!(found.data().status(), Some("failed"));
    }

    #[test]
    fn test_complete_unlocked_job_is_rejected() {
        let mut pipeline = pipeline();
        let job = pipeline.enqueue(&TestJob::named("a")).unwrap();
        assert!(matches!(
            pipeline.complete(job.as_ref()),
            Err(QueueError::Backend(BackendError::InvalidTransition { .. }))
        ));
    }

    #[derive(Debug, Default)]
    struct Unregistered {
        data: JobData,
    }

    impl Job for Unregistered {
        fn class_name(&self) -> &'static str {
            "unregistered"
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
    fn test_enqueue_unregistered_job_is_rejected() {
        let mut pipeline = pipeline();
        assert!(matches!(
            pipeline.enqueue(&Unregistered::default()),
            Err(QueueError::Codec(CoreError::UnknownJobClass { .. }))
        ));
    }

    #[test]
    fn test_memory_backend_conformance() {
        crate::testing::run_all(pipeline);
    }
}
