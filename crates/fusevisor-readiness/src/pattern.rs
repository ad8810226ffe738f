//! Readiness patterns

use fusevisor_common::{SupervisorError, SupervisorResult};
use regex::Regex;
use std::fmt;

/// Line printed by `bcachefs fusemount -f` once the mount is usable.
pub const FUSE_READY_LINE: &str = "Fuse mount initialized.";

/// A pattern a readiness line must match, anchored at the line start.
///
/// Lines are tested with their terminator (`\n` or `\r\n`) stripped, so a
/// trailing `$` in the pattern means "end of line".
#[derive(Debug, Clone)]
pub struct ReadinessPattern {
    source: String,
    regex: Regex,
}

impl ReadinessPattern {
    /// Compile a regular expression. A line that merely contains a match
    /// somewhere after its first character does not count.
    pub fn new(pattern: &str) -> SupervisorResult<Self> {
        if pattern.is_empty() {
            return Err(SupervisorError::invalid_pattern(
                pattern,
                "readiness pattern cannot be empty",
            ));
        }

        let regex = Regex::new(&format!("^(?:{pattern})"))
            .map_err(|e| SupervisorError::invalid_pattern(pattern, e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Match one exact line of text.
    pub fn literal(line: &str) -> SupervisorResult<Self> {
        Self::new(&format!("{}$", regex::escape(line)))
    }

    /// The announcement printed by the bcachefs FUSE daemon.
    pub fn fuse_mount() -> SupervisorResult<Self> {
        Self::literal(FUSE_READY_LINE)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Test one line (with or without its terminator).
    pub fn is_match(&self, line: &str) -> bool {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        self.regex.is_match(line)
    }
}

impl fmt::Display for ReadinessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
