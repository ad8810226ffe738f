//! ERROR SUMMARY verification

use fusevisor_common::{SupervisorError, SupervisorResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, error, info};

static SUMMARY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ERROR SUMMARY: (\d+) errors from (\d+) contexts")
        .expect("summary pattern is a valid regex")
});

/// Parsed leak-check report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub error_count: u64,
    pub context_count: u64,
    #[serde(skip)]
    log: String,
}

impl DiagnosticReport {
    /// The raw log text the report was parsed from.
    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }
}

/// Classifies leak-check logs as pass or fail.
///
/// Only the summary line is interpreted; the rest of the log is kept
/// verbatim for humans.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticLogVerifier;

impl DiagnosticLogVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Extract the summary counts without judging them.
    ///
    /// The first summary line anywhere in the text wins. No summary line is
    /// an `InternalTool` error.
    pub fn parse(&self, log: impl Into<String>) -> SupervisorResult<DiagnosticReport> {
        let log = log.into();

        let (error_count, context_count) = {
            let caps = SUMMARY_PATTERN.captures(&log).ok_or_else(|| {
                SupervisorError::internal_tool("diagnostic log did not contain an ERROR SUMMARY line")
            })?;
            (parse_count(&caps[1])?, parse_count(&caps[2])?)
        };

        Ok(DiagnosticReport {
            error_count,
            context_count,
            log,
        })
    }

    /// Parse and classify: zero errors passes, anything else is a
    /// `DiagnosticFailure` carrying the whole log.
    pub fn verify(&self, log: impl Into<String>) -> SupervisorResult<DiagnosticReport> {
        let report = self.parse(log).map_err(|e| {
            error!(error = %e, "Diagnostic log is unusable");
            e
        })?;

        if report.error_count > 0 {
            error!(
                errors = report.error_count,
                contexts = report.context_count,
                "Diagnostic tool reported errors"
            );
            return Err(SupervisorError::diagnostic_failure(
                report.error_count,
                report.context_count,
                report.log,
            ));
        }

        info!(contexts = report.context_count, "Diagnostic log is clean");
        Ok(report)
    }

    /// Read a log file to its end and verify it.
    ///
    /// The writer must have exited before this is called; diagnostic tools
    /// flush their logs at exit.
    pub fn verify_file(&self, path: &Path) -> SupervisorResult<DiagnosticReport> {
        let bytes = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Read diagnostic log");
        self.verify(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn parse_count(digits: &str) -> SupervisorResult<u64> {
    digits.parse().map_err(|e| {
        SupervisorError::internal_tool(format!("ERROR SUMMARY count '{digits}' is not a number: {e}"))
    })
}

/// Verify log text with the default verifier.
pub fn verify_log(log: impl Into<String>) -> SupervisorResult<DiagnosticReport> {
    DiagnosticLogVerifier::new().verify(log)
}

/// Verify a log file with the default verifier.
pub fn verify_log_file(path: &Path) -> SupervisorResult<DiagnosticReport> {
    DiagnosticLogVerifier::new().verify_file(path)
}
