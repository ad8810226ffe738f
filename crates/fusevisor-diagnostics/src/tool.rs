//! Diagnostic wrapper invocation

use crate::verifier::{DiagnosticLogVerifier, DiagnosticReport};
use fusevisor_common::SupervisorResult;
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// A memory-diagnostic wrapper command.
///
/// The wrapper is invoked as
/// `<program> <args...> --log-file=<log> <wrapped program> <wrapped args...>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticTool {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for DiagnosticTool {
    fn default() -> Self {
        Self::memcheck()
    }
}

impl DiagnosticTool {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `valgrind --leak-check=full`
    pub fn memcheck() -> Self {
        Self::new(default_program(), default_args())
    }

    /// Start one wrapped run with a fresh log file.
    pub fn prepare(&self) -> SupervisorResult<DiagnosticSession> {
        let log = tempfile::Builder::new()
            .prefix("fusevisor-diag-")
            .suffix(".log")
            .tempfile()?;
        debug!(tool = %self.program, log = %log.path().display(), "Prepared diagnostic log");

        Ok(DiagnosticSession {
            tool: self.clone(),
            log,
        })
    }
}

fn default_program() -> String {
    "valgrind".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--leak-check=full".to_string()]
}

/// One wrapped run and the log file it writes.
///
/// The log file is removed when the session is dropped.
#[derive(Debug)]
pub struct DiagnosticSession {
    tool: DiagnosticTool,
    log: NamedTempFile,
}

impl DiagnosticSession {
    pub fn tool(&self) -> &DiagnosticTool {
        &self.tool
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// Build the wrapped command line for `program args...`.
    pub fn wrap<S: AsRef<OsStr>>(&self, program: &OsStr, args: &[S]) -> (OsString, Vec<OsString>) {
        let mut log_flag = OsString::from("--log-file=");
        log_flag.push(self.log.path());

        let mut wrapped: Vec<OsString> = self.tool.args.iter().map(OsString::from).collect();
        wrapped.push(log_flag);
        wrapped.push(program.to_os_string());
        wrapped.extend(args.iter().map(|a| a.as_ref().to_os_string()));

        (OsString::from(&self.tool.program), wrapped)
    }

    /// Verify the log. Only meaningful after the wrapper has exited.
    pub fn verify(&self) -> SupervisorResult<DiagnosticReport> {
        DiagnosticLogVerifier::new().verify_file(self.log.path())
    }
}
