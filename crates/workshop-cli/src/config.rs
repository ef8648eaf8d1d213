//! Configuration file.
//!
//! A YAML document describing the queue and schedule backends, the shape of
//! the worker pool, and optionally jobs to enqueue and schedule at start-up.

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::Dispatch;

use workshop_core::{Attributes, Job, JobRegistry};
use workshop_queue::{MemoryBackend, Pipeline};
use workshop_scheduler::{CalendarFields, MemoryScheduleBackend, Scheduler};
use workshop_worker::{Boss, PoolSpec, Workshop};

use crate::CliResult;
use crate::logging::LogFormat;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_idle_backoff_ms() -> u64 {
    10
}

/// Whole configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkshopConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Pause after a dequeue finds nothing, in milliseconds
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
    /// Queue storage
    pub pipeline: BackendConfig,
    /// Schedule storage; no scheduling happens without it
    #[serde(default)]
    pub scheduler: Option<BackendConfig>,
    /// Worker pool shape
    pub employees: Vec<PoolSpec>,
    /// Jobs enqueued at start-up
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
    /// Recurring jobs registered at start-up
    #[serde(default)]
    pub schedule: Vec<ScheduleConfig>,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process memory
    Memory,
}

impl BackendKind {
    /// Returns true if jobs outlive the process that stored them
    #[must_use]
    pub fn is_persistent(self) -> bool {
        match self {
            Self::Memory => false,
        }
    }
}

/// A backend section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Which backend to use
    pub backend: BackendKind,
}

/// A job definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Registered class name, e.g. `shell`
    pub class: String,
    /// Type tag used by employee filters
    #[serde(rename = "type", default)]
    pub job_type: Option<String>,
    /// Not dequeued before this time
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    /// Job attributes
    #[serde(default)]
    pub attributes: Attributes,
}

impl JobConfig {
    /// Instantiates the job from `registry`
    ///
    /// # Errors
    ///
    /// Fails if the class is not registered.
    pub fn build(&self, registry: &JobRegistry) -> CliResult<Box<dyn Job>> {
        let mut job = registry
            .instantiate(&self.class)
            .with_context(|| format!("unknown job class `{}`", self.class))?;
        job.set_attributes(self.attributes.clone());
        if let Some(job_type) = &self.job_type {
            job.set_job_type(job_type.clone());
        }
        Ok(job)
    }
}

/// A recurring job definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// The job to enqueue
    pub job: JobConfig,
    /// When to enqueue it
    #[serde(flatten)]
    pub fields: CalendarFields,
}

impl WorkshopConfig {
    /// Reads and validates a configuration file
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parses and validates configuration text
    ///
    /// # Errors
    ///
    /// Fails if the YAML is malformed or the configuration is invalid.
    pub fn parse(text: &str) -> CliResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks what the types alone cannot
    ///
    /// # Errors
    ///
    /// Describes the first problem found.
    pub fn validate(&self) -> CliResult<()> {
        if self.employees.iter().map(|pool| pool.count).sum::<usize>() == 0 {
            bail!("employees must allocate at least one employee");
        }
        if !self.schedule.is_empty() && self.scheduler.is_none() {
            bail!("schedule entries need a scheduler section");
        }
        for entry in &self.schedule {
            entry
                .fields
                .validate()
                .with_context(|| format!("schedule entry for `{}`", entry.job.class))?;
            if entry.job.not_before.is_some() {
                bail!("scheduled job `{}` cannot set not_before", entry.job.class);
            }
        }
        Ok(())
    }

    /// Pause after a dequeue finds nothing
    #[must_use]
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    /// Opens the configured queue
    #[must_use]
    pub fn pipeline(&self, registry: Arc<JobRegistry>) -> Pipeline {
        match self.pipeline.backend {
            BackendKind::Memory => Pipeline::new(MemoryBackend::new(), registry),
        }
    }

    /// Opens the configured schedule, if any
    #[must_use]
    pub fn scheduler(&self, registry: Arc<JobRegistry>) -> Option<Scheduler> {
        self.scheduler.as_ref().map(|section| match section.backend {
            BackendKind::Memory => Scheduler::new(MemoryScheduleBackend::new(), registry),
        })
    }

    /// Builds the workshop: opens the backends, enqueues and schedules the
    /// start-up jobs, and allocates the employees
    ///
    /// # Errors
    ///
    /// Fails if a job class is unknown or a backend call fails.
    pub fn build_workshop(&self, registry: &Arc<JobRegistry>, logger: Dispatch) -> CliResult<Workshop> {
        let mut pipeline = self.pipeline(registry.clone());
        for definition in &self.jobs {
            let job = definition.build(registry)?;
            match definition.not_before {
                Some(not_before) => pipeline.enqueue_delayed(job.as_ref(), not_before)?,
                None => pipeline.enqueue(job.as_ref())?,
            };
        }

        let mut boss = Boss::new(pipeline)
            .with_idle_backoff(self.idle_backoff())
            .with_logger(logger);

        if let Some(mut scheduler) = self.scheduler(registry.clone()) {
            for entry in &self.schedule {
                let job = entry.job.build(registry)?;
                scheduler.schedule(job.as_ref(), entry.fields)?;
            }
            boss = boss.with_scheduler(scheduler);
        }

        Ok(Workshop::new(boss, &self.employees))
    }
}
