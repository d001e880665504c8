//! Signal forwarding to the task process.
//!
//! From the moment a task guard starts, HUP/QUIT/INT/TERM delivered to the
//! wrapper are recorded by a handler. Before the task command is spawned a
//! recorded signal ends the task; while it runs, the wait loop passes it on to
//! the child and reports the task as aborted.

use crate::error::{EcfjobError, Result};
use std::io;
use std::sync::atomic::{AtomicI32, Ordering};

static PENDING: AtomicI32 = AtomicI32::new(0);

/// Signals forwarded to the task.
#[cfg(unix)]
pub const FORWARDED_SIGNALS: [i32; 4] = [libc::SIGHUP, libc::SIGQUIT, libc::SIGINT, libc::SIGTERM];

#[cfg(unix)]
extern "C" fn record_signal(signo: libc::c_int) {
    PENDING.store(signo, Ordering::SeqCst);
}

/// Installed handlers; the previous ones come back on drop.
pub struct SignalForwarder {
    #[cfg(unix)]
    previous: Vec<(libc::c_int, libc::sigaction)>,
}

impl std::fmt::Debug for SignalForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("SignalForwarder");
        #[cfg(unix)]
        out.field(
            "signals",
            &self.previous.iter().map(|(signo, _)| *signo).collect::<Vec<_>>(),
        );
        out.finish()
    }
}

impl SignalForwarder {
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        PENDING.store(0, Ordering::SeqCst);
        let mut forwarder = Self {
            previous: Vec::new(),
        };

        for signo in FORWARDED_SIGNALS {
            // SAFETY: an all-zero sigaction is a valid value; the handler only
            // stores into an atomic, which is async-signal-safe.
            let rc = unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = record_signal as extern "C" fn(libc::c_int) as usize;
                action.sa_flags = libc::SA_RESTART;
                libc::sigemptyset(&mut action.sa_mask);

                let mut old: libc::sigaction = std::mem::zeroed();
                let rc = libc::sigaction(signo, &action, &mut old);
                if rc == 0 {
                    forwarder.previous.push((signo, old));
                }
                rc
            };

            if rc != 0 {
                return Err(EcfjobError::UserError(format!(
                    "failed to install handler for {}: {}",
                    signal_name(signo),
                    io::Error::last_os_error()
                )));
            }
        }

        Ok(forwarder)
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        Ok(Self {})
    }

    /// The most recent signal received since the last call, if any.
    pub fn take_pending(&self) -> Option<i32> {
        let signo = PENDING.swap(0, Ordering::SeqCst);
        (signo != 0).then_some(signo)
    }
}

#[cfg(unix)]
impl Drop for SignalForwarder {
    fn drop(&mut self) {
        for (signo, old) in self.previous.iter().rev() {
            // SAFETY: `old` was filled in by a successful sigaction call.
            unsafe {
                libc::sigaction(*signo, old, std::ptr::null_mut());
            }
        }
    }
}

/// Send `signo` to process `pid`.
#[cfg(unix)]
pub fn forward(pid: u32, signo: i32) -> io::Result<()> {
    // SAFETY: kill has no memory-safety preconditions.
    if unsafe { libc::kill(pid as libc::pid_t, signo) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn forward(_pid: u32, _signo: i32) -> io::Result<()> {
    Ok(())
}

/// Conventional name of a signal number.
pub fn signal_name(signo: i32) -> String {
    #[cfg(unix)]
    {
        let name = match signo {
            libc::SIGHUP => "SIGHUP",
            libc::SIGQUIT => "SIGQUIT",
            libc::SIGINT => "SIGINT",
            libc::SIGTERM => "SIGTERM",
            libc::SIGKILL => "SIGKILL",
            _ => "",
        };
        if !name.is_empty() {
            return name.to_string();
        }
    }
    format!("signal {}", signo)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
        assert_eq!(signal_name(libc::SIGHUP), "SIGHUP");
        assert_eq!(signal_name(libc::SIGUSR1), format!("signal {}", libc::SIGUSR1));
    }

    #[test]
    #[serial]
    fn test_handler_records_signal() {
        let forwarder = SignalForwarder::install().unwrap();
        assert_eq!(forwarder.take_pending(), None);

        forward(std::process::id(), libc::SIGHUP).unwrap();
        let mut received = None;
        for _ in 0..100 {
            received = forwarder.take_pending();
            if received.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(received, Some(libc::SIGHUP));
        assert_eq!(forwarder.take_pending(), None);
    }

    #[test]
    fn test_forward_to_missing_process_fails() {
        // pid_t::MAX is never a live process
        assert!(forward(i32::MAX as u32, libc::SIGTERM).is_err());
    }
}
