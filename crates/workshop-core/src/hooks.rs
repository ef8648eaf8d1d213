//! Fork hooks.
//!
//! Hooks run inside the worker child right after the fork and before the
//! job's `perform`. Use them to re-establish per-process resources such as
//! database connections that must not be shared with the supervisor.

use std::fmt;
use std::sync::Arc;

use crate::job::Job;

/// Code run in a freshly forked worker process
pub trait ForkHook: Send + Sync {
    /// Runs the hook for the job about to be performed
    ///
    /// # Errors
    ///
    /// An error fails the job without calling `perform`.
    fn run(&self, job: &dyn Job) -> anyhow::Result<()>;
}

impl<F> ForkHook for F
where
    F: Fn(&dyn Job) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, job: &dyn Job) -> anyhow::Result<()> {
        self(job)
    }
}

/// Ordered list of fork hooks
#[derive(Clone, Default)]
pub struct ForkHookChain {
    hooks: Vec<Arc<dyn ForkHook>>,
}

impl ForkHookChain {
    /// Creates an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook
    pub fn add(&mut self, hook: impl ForkHook + 'static) {
        self.hooks.push(Arc::new(hook));
    }

    /// Runs every hook in order, stopping at the first failure
    ///
    /// # Errors
    ///
    /// Returns the first hook error.
    pub fn run(&self, job: &dyn Job) -> anyhow::Result<()> {
        for hook in &self.hooks {
            hook.run(job)?;
        }
        Ok(())
    }

    /// Number of hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if there are no hooks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for ForkHookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkHookChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
