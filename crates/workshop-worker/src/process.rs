//! Process control.
//!
//! Thin wrappers over `fork`, `waitpid` and `kill`. Everything else in the
//! crate goes through these so that the unsafe surface stays in one place.

use std::fmt;
use std::io;

/// OS process id of a forked child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(libc::pid_t);

impl Pid {
    /// Wraps a raw pid
    #[must_use]
    pub fn from_raw(pid: libc::pid_t) -> Self {
        Self(pid)
    }

    /// The raw pid
    #[must_use]
    pub fn as_raw(self) -> libc::pid_t {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a fork the caller is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    /// The original process, holding the child's pid
    Parent(Pid),
    /// The new process
    Child,
}

/// How a reaped child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The child called `exit` with this code
    Exited(i32),
    /// The child was killed by this signal
    Signaled(i32),
}

impl ExitStatus {
    /// Returns true for a normal exit with status zero
    #[must_use]
    pub fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    fn from_raw(status: libc::c_int) -> Self {
        if libc::WIFEXITED(status) {
            Self::Exited(libc::WEXITSTATUS(status))
        } else {
            Self::Signaled(libc::WTERMSIG(status))
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit status {code}"),
            Self::Signaled(signal) => write!(f, "killed by signal {signal}"),
        }
    }
}

/// Forks the current process.
///
/// The child must only run job code and leave through [`exit_child`]; it
/// never returns into the supervisor loop.
///
/// # Errors
///
/// Returns the OS error if no process could be created.
pub fn fork() -> io::Result<Fork> {
    // SAFETY: the supervisor is single threaded, and the child ends in
    // `_exit` without running the parent's destructors.
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(Pid(pid))),
    }
}

/// Reaps `pid`.
///
/// Returns `None` while the child is still running and `block` is false.
///
/// # Errors
///
/// Returns the OS error, e.g. `ECHILD` if `pid` is not our child.
pub fn wait(pid: Pid, block: bool) -> io::Result<Option<ExitStatus>> {
    let flags = if block { 0 } else { libc::WNOHANG };
    let mut status: libc::c_int = 0;

    loop {
        // SAFETY: `status` is a valid out pointer for the duration of the call.
        let reaped = unsafe { libc::waitpid(pid.0, &raw mut status, flags) };
        match reaped {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            0 => return Ok(None),
            _ => return Ok(Some(ExitStatus::from_raw(status))),
        }
    }
}

/// Returns true if `pid` still exists, including as an unreaped zombie
#[must_use]
pub fn is_alive(pid: Pid) -> bool {
    // SAFETY: signal 0 only checks for existence and permission.
    if unsafe { libc::kill(pid.0, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Sends SIGKILL to `pid`. A process that is already gone is not an error.
///
/// # Errors
///
/// Returns the OS error for anything other than `ESRCH`.
pub fn kill(pid: Pid) -> io::Result<()> {
    // SAFETY: plain syscall on a pid we forked.
    if unsafe { libc::kill(pid.0, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// Ends a forked child immediately with `code`.
///
/// Uses `_exit` so the parent's atexit handlers and buffered state are not
/// replayed from the child.
pub fn exit_child(code: i32) -> ! {
    // SAFETY: terminates the calling process; nothing runs afterwards.
    unsafe { libc::_exit(code) }
}
