//! # Fusevisor Supervisor
//!
//! Drives one long-running filesystem daemon from a test harness:
//!
//! - `mount()` launches the daemon (optionally under a leak-check wrapper)
//!   and returns once it announces readiness on stdout
//! - `unmount()` asks the environment to detach the filesystem, waits for
//!   the daemon to exit within a bound, kills it otherwise, and verifies the
//!   wrapper's log
//! - `verify()` checks the reaped outcome
//!
//! ```rust,no_run
//! use fusevisor_supervisor::{ProcessSupervisor, SupervisorConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> fusevisor_common::SupervisorResult<()> {
//! let config = SupervisorConfig::fusemount("../bcachefs", "/tmp/dev-1g", "/tmp/mnt");
//! let mut supervisor = ProcessSupervisor::new(config)?;
//!
//! supervisor.mount().await?;
//! // ... exercise the mounted filesystem ...
//! supervisor.unmount(Some(Duration::from_secs(10))).await?;
//! supervisor.verify().expect("daemon exited cleanly");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod detach;
pub mod supervisor;

pub use config::{DetachConfig, FusevisorConfig, RunConfig, SupervisorConfig};
pub use detach::{DetachRequest, FusermountDetach, SignalDetach};
pub use supervisor::{ProcessSupervisor, StatusHandle, UnmountReport, FORCE_KILL_TIMEOUT};
