//! Signal delivery and forced termination.
//!
//! Supervised children are started as process-group leaders, so a forced
//! kill can take out the whole group (a diagnostic wrapper and the program
//! it runs) with one call.

use fusevisor_common::{SupervisorError, SupervisorResult};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::str::FromStr;
use tracing::{debug, warn};

/// Send `signal` to a single process.
pub fn send_signal(pid: u32, signal: Signal) -> SupervisorResult<()> {
    debug!(pid, signal = %signal, "Sending signal");
    kill(Pid::from_raw(pid as i32), signal)
        .map_err(|e| SupervisorError::signal(pid, signal.as_str(), e.to_string()))
}

/// Ask a process to exit (SIGTERM).
pub fn terminate_gracefully(pid: u32) -> SupervisorResult<()> {
    send_signal(pid, Signal::SIGTERM)
}

/// SIGKILL a single process. A process that is already gone is not an error.
pub fn force_kill(pid: u32) -> SupervisorResult<()> {
    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!(pid, "Process already gone before SIGKILL");
            Ok(())
        }
        Err(e) => Err(SupervisorError::signal(pid, "SIGKILL", e.to_string())),
    }
}

/// SIGKILL every process in the group led by `pgid`.
///
/// Falls back to killing the leader alone if the group no longer exists.
pub fn force_kill_group(pgid: u32) -> SupervisorResult<()> {
    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) => {
            debug!(pgid, "Sent SIGKILL to process group");
            Ok(())
        }
        Err(Errno::ESRCH) => {
            warn!(pgid, "Process group not found, killing leader only");
            force_kill(pgid)
        }
        Err(e) => Err(SupervisorError::signal(pgid, "SIGKILL", e.to_string())),
    }
}

/// Parse a signal name: `SIGTERM`, `TERM` and `term` are all accepted.
pub fn parse_signal(name: &str) -> SupervisorResult<Signal> {
    let upper = name.trim().to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };

    Signal::from_str(&full)
        .map_err(|_| SupervisorError::configuration(format!("unknown signal name '{name}'")))
}
