//! Built-in jobs available to configuration files.

use anyhow::{Context, bail};
use std::process::Command;
use std::sync::Arc;

use workshop_core::{Job, JobData, JobRegistry};

/// Runs `attributes.command` through `sh -c`
///
/// The job fails when the command exits non-zero, and is retried after a
/// failure when `attributes.retry` is true.
#[derive(Debug, Default, Clone)]
pub struct ShellJob {
    data: JobData,
}

impl ShellJob {
    /// Creates a job running `command`
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            data: JobData::new().with("command", command),
        }
    }

    /// Allows a retry after a failure
    #[must_use]
    pub fn retryable(mut self) -> Self {
        self.data.insert("retry", true);
        self
    }

    /// The command line
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.data.get("command").and_then(|v| v.as_str())
    }
}

impl Job for ShellJob {
    fn class_name(&self) -> &'static str {
        "shell"
    }

    fn data(&self) -> &JobData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut JobData {
        &mut self.data
    }

    fn perform(&mut self) -> anyhow::Result<()> {
        let command = self.command().context("shell job has no command")?;
        tracing::debug!(command, "running shell job");

        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .with_context(|| format!("failed to start: {command}"))?;

        if !status.success() {
            bail!("command `{command}` failed with {status}");
        }
        Ok(())
    }

    fn may_try_again(&self) -> bool {
        self.data
            .get("retry")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// Registry of every built-in job class
///
/// # Errors
///
/// Fails only if two built-in jobs share a class name.
pub fn registry() -> anyhow::Result<Arc<JobRegistry>> {
    let registry = JobRegistry::new().with::<ShellJob>()?;
    Ok(Arc::new(registry))
}
