//! Process existence checks.

use fusevisor_common::{SupervisorError, SupervisorResult};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Check if a process with the given PID exists.
///
/// Uses `kill(pid, 0)`, which delivers nothing. A zombie that has not been
/// reaped still counts as existing.
///
/// * `Ok(true)` - process exists (possibly owned by another user)
/// * `Ok(false)` - no such process
pub fn process_exists(pid: u32) -> SupervisorResult<bool> {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(Errno::EPERM) => Ok(true),
        Err(e) => Err(SupervisorError::signal(pid, "0", format!("failed to check process: {e}"))),
    }
}
