//! Error types for fusevisor.
//!
//! Every public operation returns `SupervisorResult<T>`. The variants map
//! one-to-one onto the failure classes a test harness needs to tell apart:
//!
//! - the supervised child never announced readiness (`ReadinessTimeout`)
//! - the leak-check tool itself misbehaved (`InternalTool`)
//! - the leak-check tool found errors (`DiagnosticFailure`, carries the log)
//! - the child had to be killed (`ForcedTermination`) or survived the kill
//!   (`Unkillable`)
//!
//! Helper constructors keep call sites short:
//!
//! ```rust
//! use fusevisor_common::{SupervisorError, SupervisorResult};
//!
//! fn mount() -> SupervisorResult<()> {
//!     Err(SupervisorError::readiness_timeout("^Fuse mount initialized.$", "starting...\n"))
//! }
//!
//! assert!(matches!(mount(), Err(SupervisorError::ReadinessTimeout { .. })));
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for supervisor operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// Main error type for supervisor, scanner and verifier operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The output stream ended before a line matched the readiness pattern.
    ///
    /// `captured` holds everything that was read before the stream closed.
    #[error("Readiness timeout: stdout closed without a line matching \"{pattern}\"")]
    ReadinessTimeout { pattern: String, captured: String },

    /// The diagnostic log had no parseable summary line.
    ///
    /// This means the diagnostic tool crashed, was misconfigured or changed
    /// its output format. It is never a "zero errors" result.
    #[error("Internal tool error: {reason}")]
    InternalTool { reason: String },

    /// The diagnostic tool reported one or more errors.
    #[error("Diagnostic failure: {errors} errors from {contexts} contexts")]
    DiagnosticFailure {
        errors: u64,
        contexts: u64,
        log: String,
    },

    /// The child did not exit within the shutdown timeout and was killed.
    #[error("Forced termination: {id} did not exit within {timeout:?}")]
    ForcedTermination { id: String, timeout: Duration },

    /// The child did not exit even after SIGKILL.
    #[error("Process {id} (PID: {pid}) still running {timeout:?} after SIGKILL")]
    Unkillable {
        id: String,
        pid: u32,
        timeout: Duration,
    },

    /// An operation was invoked in a state that does not allow it.
    #[error("Operation '{operation}' not allowed for {id} in state {state}")]
    InvalidState {
        id: String,
        operation: String,
        state: String,
    },

    /// A readiness pattern failed to compile.
    #[error("Invalid readiness pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The child process could not be launched.
    #[error("Process spawn failed: {program} - {reason}")]
    SpawnFailed { program: String, reason: String },

    /// A checked command exited unsuccessfully.
    #[error("Command '{command}' failed: exit code {exit_code:?}, signal {signal:?}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        signal: Option<i32>,
    },

    /// Signal delivery failed.
    #[error("Failed to send {signal} to PID {pid}: {reason}")]
    Signal {
        pid: u32,
        signal: String,
        reason: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// The background unit panicked.
    #[error("Background task panicked for '{id}': {message}")]
    TaskPanic { id: String, message: String },

    /// The background unit went away without publishing a result.
    #[error("Readiness channel closed unexpectedly for '{id}'")]
    ChannelClosed { id: String },

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn readiness_timeout(pattern: impl Into<String>, captured: impl Into<String>) -> Self {
        Self::ReadinessTimeout {
            pattern: pattern.into(),
            captured: captured.into(),
        }
    }

    pub fn internal_tool(reason: impl Into<String>) -> Self {
        Self::InternalTool {
            reason: reason.into(),
        }
    }

    pub fn diagnostic_failure(errors: u64, contexts: u64, log: impl Into<String>) -> Self {
        Self::DiagnosticFailure {
            errors,
            contexts,
            log: log.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        operation: impl Into<String>,
        state: impl ToString,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn signal(pid: u32, signal: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Signal {
            pid,
            signal: signal.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn task_panic(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskPanic {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn channel_closed(id: impl Into<String>) -> Self {
        Self::ChannelClosed { id: id.into() }
    }

    /// The full diagnostic log attached to a `DiagnosticFailure`.
    pub fn diagnostic_log(&self) -> Option<&str> {
        match self {
            Self::DiagnosticFailure { log, .. } => Some(log),
            _ => None,
        }
    }

    /// Output captured before a `ReadinessTimeout`.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            Self::ReadinessTimeout { captured, .. } => Some(captured),
            _ => None,
        }
    }
}

/// Assertion failures raised by `ProcessSupervisor::verify()`.
///
/// These are test results, not system faults: each variant names the
/// property of the reaped outcome that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutcomeAssertion {
    #[error("exit code mismatch: expected {expected}, got {actual:?}")]
    ExitCode { expected: i32, actual: Option<i32> },

    #[error("stdout is empty")]
    EmptyStdout,

    #[error("stderr is not empty: {stderr:?}")]
    StderrNotEmpty { stderr: String },

    #[error("process has not been reaped (state: {state})")]
    NotReaped { state: String },
}
