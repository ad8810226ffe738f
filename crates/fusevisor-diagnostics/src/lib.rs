//! # Fusevisor Diagnostics
//!
//! Memory-diagnostic wrapping for supervised processes.
//!
//! This crate provides:
//! - `DiagnosticTool`: the wrapper command (valgrind memcheck by default)
//! - `DiagnosticSession`: one wrapped run with its own log file
//! - `DiagnosticLogVerifier`: pass/fail classification of the log's
//!   `ERROR SUMMARY` line

pub mod tool;
pub mod verifier;

// Re-export main types
pub use tool::{DiagnosticSession, DiagnosticTool};
pub use verifier::{verify_log, verify_log_file, DiagnosticLogVerifier, DiagnosticReport};
