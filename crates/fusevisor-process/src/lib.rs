//! # Fusevisor Process
//!
//! Low-level process operations used by the supervisor and by test
//! fixtures.
//!
//! This crate provides primitives for:
//! - Running a command to completion, optionally under a diagnostic wrapper
//! - Signal delivery and forced termination (single PID or process group)
//! - Process existence checks
//! - Executable and identifier validation
//!
//! Only Unix-like systems are supported.

pub mod check;
pub mod execute;
pub mod terminate;
pub mod validation;

// Re-export main types
pub use check::*;
pub use execute::*;
pub use terminate::*;
pub use validation::*;
