//! Two-phase readiness scanner
//!
//! Phase 1 (`scan`) reads line by line until a line matches the readiness
//! pattern. Phase 2 (`drain`) reads everything that is left. Both phases
//! append to the same accumulator, and the reader moves from one phase to
//! the next inside the scanner instead of being shared.

use crate::pattern::ReadinessPattern;
use fusevisor_common::{SupervisorError, SupervisorResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::{debug, trace};

/// Scans a line-oriented stream for a readiness announcement.
#[derive(Debug)]
pub struct ReadinessScanner<R> {
    reader: R,
    captured: String,
    lines_consumed: usize,
}

impl<R> ReadinessScanner<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            captured: String::new(),
            lines_consumed: 0,
        }
    }

    /// Consume lines until one matches `pattern`.
    ///
    /// Returns every line read so far (terminators included, the matching
    /// line last). Nothing past the matching line is consumed. If the stream
    /// ends first, fails with `ReadinessTimeout` carrying what was read.
    pub async fn scan(&mut self, pattern: &ReadinessPattern) -> SupervisorResult<String> {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = self.reader.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                debug!(
                    pattern = %pattern,
                    lines = self.lines_consumed,
                    "Stream ended before readiness"
                );
                return Err(SupervisorError::readiness_timeout(
                    pattern.as_str(),
                    self.captured.clone(),
                ));
            }

            let line = String::from_utf8_lossy(&buf);
            self.lines_consumed += 1;
            trace!(line = %line.trim_end(), "Expect line");
            self.captured.push_str(&line);

            if pattern.is_match(&line) {
                debug!(
                    pattern = %pattern,
                    lines = self.lines_consumed,
                    "Readiness line matched"
                );
                return Ok(self.captured.clone());
            }
        }
    }

    /// Read the stream to its end and return the full accumulated text.
    pub async fn drain(mut self) -> SupervisorResult<String> {
        let mut rest = Vec::new();
        self.reader.read_to_end(&mut rest).await?;
        debug!(bytes = rest.len(), "Drained remaining output");
        self.captured.push_str(&String::from_utf8_lossy(&rest));
        Ok(self.captured)
    }

    pub fn lines_consumed(&self) -> usize {
        self.lines_consumed
    }

    /// Hand back the reader (positioned after the last consumed line) and
    /// the accumulated text.
    pub fn into_parts(self) -> (R, String) {
        (self.reader, self.captured)
    }
}

/// One-shot scan: returns the matched prefix and leaves the rest of the
/// stream in `reader`.
pub async fn scan<R>(reader: &mut R, pattern: &ReadinessPattern) -> SupervisorResult<String>
where
    R: AsyncBufRead + Unpin,
{
    ReadinessScanner::new(reader).scan(pattern).await
}
