use std::time::Duration;
use chrono::{DateTime, Utc};

/// Milliseconds since the unix epoch.
pub type Timestamp = i64;

/// A single observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl Sample {
    pub const fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// The window a query is evaluated over. `step` stays zero until the interval
/// has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeRange {
            start,
            end,
            step: Duration::ZERO,
        }
    }

    pub fn from_millis(start: Timestamp, end: Timestamp) -> Self {
        let start = DateTime::<Utc>::from_timestamp_millis(start).unwrap_or_default();
        let end = DateTime::<Utc>::from_timestamp_millis(end).unwrap_or_default();
        Self::new(start, end)
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// `end - start`, clamped to zero for inverted ranges.
    pub fn span(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn start_millis(&self) -> Timestamp {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> Timestamp {
        self.end.timestamp_millis()
    }
}
