//! Shutdown signals.
//!
//! SIGINT and SIGTERM only bump an atomic counter. The run loop drains the
//! counter once per iteration through [`ShutdownSignals::poll`], so no tick
//! logic ever runs inside a signal handler. A second signal within the grace
//! window escalates a graceful stop to an immediate one.

use std::fmt;
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::{WorkerErrorKind, WorkerResult};

/// Window in which a repeated signal escalates the shutdown
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

const SHUTDOWN_SIGNALS: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

static RECEIVED: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_shutdown_signal(_signal: libc::c_int) {
    RECEIVED.fetch_add(1, Ordering::SeqCst);
}

/// Puts SIGINT and SIGTERM back to their default action. Called in forked
/// children, which must die on these signals rather than count them.
pub(crate) fn restore_default_handlers() {
    for signal in SHUTDOWN_SIGNALS {
        // SAFETY: an all-zero sigaction with `SIG_DFL` and an empty mask is a
        // valid default disposition.
        unsafe {
            let mut action: libc::sigaction = mem::zeroed();
            action.sa_sigaction = libc::SIG_DFL;
            libc::sigemptyset(&raw mut action.sa_mask);
            libc::sigaction(signal, &raw const action, ptr::null_mut());
        }
    }
}

/// Serializes tests that install handlers or raise shutdown signals
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// What a shutdown signal asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownRequest {
    /// Stop taking work and let running jobs finish
    Graceful,
    /// Kill running jobs and stop
    Immediate,
}

/// Decides whether an interrupt is the first or a repeated one
#[derive(Debug, Clone)]
pub struct InterruptTracker {
    last: Option<Instant>,
    grace: Duration,
}

impl Default for InterruptTracker {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl InterruptTracker {
    /// Creates a tracker escalating interrupts closer together than `grace`
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self { last: None, grace }
    }

    /// Records an interrupt received at `now`
    pub fn interrupt(&mut self, now: Instant) -> ShutdownRequest {
        match self.last {
            Some(last) if now.saturating_duration_since(last) <= self.grace => {
                ShutdownRequest::Immediate
            }
            _ => {
                self.last = Some(now);
                ShutdownRequest::Graceful
            }
        }
    }
}

/// Installed SIGINT/SIGTERM handlers. Dropping this restores the previous
/// handlers.
pub struct ShutdownSignals {
    tracker: InterruptTracker,
    previous: Vec<(libc::c_int, libc::sigaction)>,
}

impl fmt::Debug for ShutdownSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignals")
            .field("tracker", &self.tracker)
            .field("signals", &self.previous.iter().map(|(s, _)| s).collect::<Vec<_>>())
            .finish()
    }
}

impl ShutdownSignals {
    /// Installs the handlers with the default grace window
    ///
    /// # Errors
    ///
    /// Fails with `Signal` if a handler cannot be installed.
    pub fn install() -> WorkerResult<Self> {
        Self::install_with(InterruptTracker::default())
    }

    /// Installs the handlers with a custom tracker
    ///
    /// # Errors
    ///
    /// Fails with `Signal` if a handler cannot be installed.
    pub fn install_with(tracker: InterruptTracker) -> WorkerResult<Self> {
        let mut signals = Self {
            tracker,
            previous: Vec::with_capacity(SHUTDOWN_SIGNALS.len()),
        };
        RECEIVED.store(0, Ordering::SeqCst);

        for signal in SHUTDOWN_SIGNALS {
            // SAFETY: an all-zero sigaction is valid; every field we rely on is
            // set below before it is passed to the kernel.
            let mut action: libc::sigaction = unsafe { mem::zeroed() };
            action.sa_sigaction = on_shutdown_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = libc::SA_RESTART;
            let mut previous: libc::sigaction = unsafe { mem::zeroed() };

            // SAFETY: both pointers reference live stack values, and the
            // handler only touches an atomic.
            let rc = unsafe {
                libc::sigemptyset(&raw mut action.sa_mask);
                libc::sigaction(signal, &raw const action, &raw mut previous)
            };
            if rc != 0 {
                return Err(WorkerErrorKind::Signal {
                    source: io::Error::last_os_error(),
                }
                .into());
            }
            signals.previous.push((signal, previous));
        }

        Ok(signals)
    }

    /// Consumes signals received since the last poll and returns the
    /// strongest request among them
    pub fn poll(&mut self) -> Option<ShutdownRequest> {
        let received = RECEIVED.swap(0, Ordering::SeqCst);
        let now = Instant::now();
        (0..received).map(|_| self.tracker.interrupt(now)).max()
    }
}

impl Drop for ShutdownSignals {
    fn drop(&mut self) {
        for (signal, previous) in self.previous.drain(..).rev() {
            // SAFETY: restores an action previously returned by the kernel.
            unsafe {
                libc::sigaction(signal, &raw const previous, ptr::null_mut());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_interrupt_is_graceful() {
        let mut tracker = InterruptTracker::default();
        assert_eq!(tracker.interrupt(Instant::now()), ShutdownRequest::Graceful);
    }

    #[test]
    fn test_second_interrupt_within_grace_is_immediate() {
        let mut tracker = InterruptTracker::new(Duration::from_secs(5));
        let first = Instant::now();
        tracker.interrupt(first);
        assert_eq!(
            tracker.interrupt(first + Duration::from_secs(4)),
            ShutdownRequest::Immediate
        );
    }

    #[test]
    fn test_late_interrupt_starts_over() {
        let mut tracker = InterruptTracker::new(Duration::from_secs(5));
        let first = Instant::now();
        tracker.interrupt(first);
        assert_eq!(
            tracker.interrupt(first + Duration::from_secs(6)),
            ShutdownRequest::Graceful
        );
        assert_eq!(
            tracker.interrupt(first + Duration::from_secs(7)),
            ShutdownRequest::Immediate
        );
    }

    #[test]
    fn test_raised_signals_are_polled() {
        let _guard = test_lock();
        let mut signals = ShutdownSignals::install().unwrap();
        assert_eq!(signals.poll(), None);

        // SAFETY: our handler is installed for SIGTERM.
        unsafe { libc::raise(libc::SIGTERM) };
        assert_eq!(signals.poll(), Some(ShutdownRequest::Graceful));

        // SAFETY: as above, for SIGINT.
        unsafe { libc::raise(libc::SIGINT) };
        assert_eq!(signals.poll(), Some(ShutdownRequest::Immediate));
        assert_eq!(signals.poll(), None);
    }
}
