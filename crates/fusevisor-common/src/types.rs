//! Plain data records shared across the supervisor crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

/// The resources a supervised filesystem daemon works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountTarget {
    /// Backing device or image file.
    pub device: PathBuf,
    /// Directory the filesystem is mounted on.
    pub mountpoint: PathBuf,
}

impl MountTarget {
    pub fn new(device: impl Into<PathBuf>, mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            mountpoint: mountpoint.into(),
        }
    }
}

impl fmt::Display for MountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.device.display(), self.mountpoint.display())
    }
}

/// Terminal outcome of a reaped process.
///
/// `exit_code` is absent when the process died from a signal; `signal` then
/// holds the signal number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutcome {
    pub fn from_status(status: ExitStatus, stdout: String, stderr: String) -> Self {
        Self {
            exit_code: status.code(),
            signal: exit_signal(&status),
            stdout,
            stderr,
        }
    }

    /// True if the process exited normally with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
