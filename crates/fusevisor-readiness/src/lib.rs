//! # Fusevisor Readiness
//!
//! Turns "the child prints a line when it is ready" into an awaitable
//! event.
//!
//! This crate provides:
//! - `ReadinessPattern`: a regex anchored at the start of a line
//! - `ReadinessScanner`: a two-phase reader that scans a stream until the
//!   pattern matches, then drains the rest into the same accumulator

pub mod pattern;
pub mod scanner;

// Re-export main types
pub use pattern::{ReadinessPattern, FUSE_READY_LINE};
pub use scanner::{scan, ReadinessScanner};
