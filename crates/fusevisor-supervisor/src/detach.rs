//! Out-of-band detach requests
//!
//! `unmount()` never signals the daemon directly first. It asks the
//! environment to detach the mounted filesystem and expects the daemon to
//! notice and exit on its own.

use async_trait::async_trait;
use fusevisor_common::{MountTarget, SupervisorError, SupervisorResult};
use fusevisor_process::{run, send_signal, RunOptions};
use nix::sys::signal::Signal;
use std::ffi::OsStr;
use std::fmt;
use tracing::{debug, info};

/// A request that should make the supervised daemon exit.
#[async_trait]
pub trait DetachRequest: Send + Sync + fmt::Debug {
    /// Issue the request. `pid` is the supervised (possibly wrapped) child.
    async fn detach(&self, target: &MountTarget, pid: u32) -> SupervisorResult<()>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Lazy unmount through `fusermount3 -zu <mountpoint>`.
#[derive(Debug, Clone)]
pub struct FusermountDetach {
    program: String,
    args: Vec<String>,
}

impl FusermountDetach {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for FusermountDetach {
    fn default() -> Self {
        Self::new("fusermount3", vec!["-zu".to_string()])
    }
}

#[async_trait]
impl DetachRequest for FusermountDetach {
    async fn detach(&self, target: &MountTarget, _pid: u32) -> SupervisorResult<()> {
        let mut args: Vec<&OsStr> = self.args.iter().map(OsStr::new).collect();
        args.push(target.mountpoint.as_os_str());

        let outcome = run(&self.program, &args, &RunOptions::default()).await?;
        if !outcome.success() {
            return Err(SupervisorError::CommandFailed {
                command: format!("{} {}", self.describe(), target.mountpoint.display()),
                exit_code: outcome.exit_code,
                signal: outcome.signal,
            });
        }

        info!(mountpoint = %target.mountpoint.display(), "Detached mountpoint");
        Ok(())
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Deliver a signal to the supervised process.
///
/// For daemons that are not real mounts, or when the mount is managed
/// elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct SignalDetach {
    signal: Signal,
}

impl SignalDetach {
    pub fn new(signal: Signal) -> Self {
        Self { signal }
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }
}

impl Default for SignalDetach {
    fn default() -> Self {
        Self::new(Signal::SIGTERM)
    }
}

#[async_trait]
impl DetachRequest for SignalDetach {
    async fn detach(&self, _target: &MountTarget, pid: u32) -> SupervisorResult<()> {
        debug!(pid, signal = %self.signal, "Detaching by signal");
        send_signal(pid, self.signal)
    }

    fn describe(&self) -> String {
        self.signal.as_str().to_string()
    }
}
