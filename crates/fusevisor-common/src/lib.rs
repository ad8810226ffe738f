//! # Fusevisor Common
//!
//! Types shared by every fusevisor crate: the error taxonomy raised by the
//! supervisor, the scanner and the diagnostic verifier, plus the plain data
//! records (`ProcessOutcome`, `MountTarget`) that flow between them.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{OutcomeAssertion, SupervisorError, SupervisorResult};
pub use types::{MountTarget, ProcessOutcome};
