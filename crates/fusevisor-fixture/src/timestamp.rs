//! Timestamp ranges for checking times recorded by the filesystem.
//!
//! The filesystem may use a coarse clock, so the range is padded by a short
//! sleep at each end before and after the measured operation.

use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};

pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// An open range; call [`Timestamp::finish`] after the operation.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    start: DateTime<Utc>,
}

impl Timestamp {
    /// Record the start and wait out the clock granularity.
    pub async fn start() -> Self {
        let start = Utc::now();
        tokio::time::sleep(SETTLE_DELAY).await;
        Self { start }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.start
    }

    pub async fn finish(self) -> TimestampRange {
        tokio::time::sleep(SETTLE_DELAY).await;
        TimestampRange {
            start: self.start,
            end: Utc::now(),
        }
    }
}

/// Closed range of wall-clock times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimestampRange {
    /// True iff `t` lies within the range, both ends included.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// Same as [`contains`](Self::contains) for a file timestamp.
    pub fn contains_system_time(&self, t: SystemTime) -> bool {
        self.contains(DateTime::<Utc>::from(t))
    }
}
