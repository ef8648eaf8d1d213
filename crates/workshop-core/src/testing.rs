//! Jobs for exercising queues, schedulers and workers in tests.
//!
//! [`TestJob`] is driven entirely by its attributes so that its behaviour
//! survives a round trip through any backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::job::{Job, JobData};
use crate::registry::JobRegistry;

/// Configurable job used by test suites
#[derive(Debug, Default, Clone)]
pub struct TestJob {
    data: JobData,
}

impl TestJob {
    /// Creates a job carrying a `name` attribute
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            data: JobData::new().with("name", name),
        }
    }

    /// Sets the type tag
    #[must_use]
    pub fn with_type(mut self, job_type: &str) -> Self {
        self.data.set_job_type(job_type);
        self
    }

    /// Makes `perform` return an error
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.data.insert("fail", true);
        self
    }

    /// Makes `perform` panic
    #[must_use]
    pub fn panicking(mut self) -> Self {
        self.data.insert("panic", true);
        self
    }

    /// Makes `perform` sleep before doing anything else
    #[must_use]
    pub fn sleeping(mut self, millis: u64) -> Self {
        self.data.insert("sleep_ms", millis);
        self
    }

    /// Allows the job to be retried after a failure
    #[must_use]
    pub fn retryable(mut self) -> Self {
        self.data.insert("retry", true);
        self
    }

    /// Makes `perform` write the job name to a file, so a test can observe
    /// work done in a child process
    #[must_use]
    pub fn with_marker(mut self, path: &Path) -> Self {
        self.data.insert("marker", path.to_string_lossy().into_owned());
        self
    }

    /// The `name` attribute
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(|v| v.as_str())
    }

    fn flag(&self, key: &str) -> bool {
        self.data
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

impl Job for TestJob {
    fn class_name(&self) -> &'static str {
        "test_job"
    }

    fn data(&self) -> &JobData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut JobData {
        &mut self.data
    }

    fn perform(&mut self) -> anyhow::Result<()> {
        if let Some(millis) = self.data.get("sleep_ms").and_then(serde_json::Value::as_u64) {
            std::thread::sleep(Duration::from_millis(millis));
        }
        if self.flag("panic") {
            panic!("test job panicked");
        }
        if self.flag("fail") {
            anyhow::bail!("test job failed");
        }
        if let Some(marker) = self.data.get("marker").and_then(|v| v.as_str()) {
            std::fs::write(marker, self.name().unwrap_or_default())?;
        }
        Ok(())
    }

    fn may_try_again(&self) -> bool {
        self.flag("retry")
    }
}

/// A registry containing [`TestJob`]
#[must_use]
pub fn registry() -> Arc<JobRegistry> {
    let mut registry = JobRegistry::new();
    registry
        .register::<TestJob>()
        .expect("fresh registry accepts TestJob");
    Arc::new(registry)
}
