//! Time ranges and timestamp parsing

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::PlanError;

/// Closed UTC time range, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, PlanError> {
        if start > end {
            return Err(PlanError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Range end (inclusive)
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Copy of this range with a different end.
    pub fn with_end(&self, end: DateTime<Utc>) -> Result<Self, PlanError> {
        Self::new(self.start, end)
    }

    /// Hourly timestamps covered by the range.
    ///
    /// Both ends are truncated to the hour, so the sequence always contains
    /// `end`'s hour.
    pub fn hourly(&self) -> impl Iterator<Item = DateTime<Utc>> {
        let end = floor_hour(self.end);
        std::iter::successors(Some(floor_hour(self.start)), |ts| {
            Some(*ts + TimeDelta::hours(1))
        })
        .take_while(move |ts| *ts <= end)
    }

    /// Number of hourly slots in [`TimeRange::hourly`].
    pub fn hour_count(&self) -> usize {
        let span = floor_hour(self.end) - floor_hour(self.start);
        span.num_hours() as usize + 1
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

fn floor_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Which end of a range a date-only input describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBoundary {
    /// Date-only input maps to 00:00 UTC
    Start,
    /// Date-only input maps to 23:00 UTC, the last hourly sample of the day
    End,
}

/// Parse a timestamp from RFC3339, `YYYY-MM-DDTHH:MM:SS` (UTC assumed),
/// `YYYY-MM-DD` or `YYYYMMDD`.
pub fn parse_timestamp(input: &str, boundary: RangeBoundary) -> Result<DateTime<Utc>, PlanError> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(input, "%Y%m%d"))
        .map_err(|e| PlanError::InvalidTimestamp {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

    let hour = match boundary {
        RangeBoundary::Start => 0,
        RangeBoundary::End => 23,
    };
    date.and_hms_opt(hour, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| PlanError::InvalidTimestamp {
            input: input.to_string(),
            reason: "time of day out of range".to_string(),
        })
}
