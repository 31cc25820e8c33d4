//! Data-availability embargo

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::{PlanError, TimeRange};

/// ERA5-Land final data lags real time by roughly five days.
pub const DEFAULT_EMBARGO_DAYS: i64 = 5;

/// Trailing window for which the provider has not published data yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbargoPolicy {
    window: TimeDelta,
}

impl EmbargoPolicy {
    /// Embargo of `days` whole days
    pub fn days(days: i64) -> Self {
        Self {
            window: TimeDelta::days(days.max(0)),
        }
    }

    /// No embargo; only future timestamps are clamped to "now".
    pub fn none() -> Self {
        Self {
            window: TimeDelta::zero(),
        }
    }

    /// Length of the embargo window
    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Clamp `range` so it ends no later than `now - window`.
    ///
    /// Returns the effective range and, when it was shortened, the adjustment
    /// the caller must surface.
    pub fn apply(
        &self,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<(TimeRange, Option<EmbargoAdjustment>), PlanError> {
        if now - range.end() >= self.window {
            return Ok((range, None));
        }

        let effective_end = now - self.window;
        let effective = range.with_end(effective_end)?;
        Ok((
            effective,
            Some(EmbargoAdjustment {
                requested_end: range.end(),
                effective_end,
                window_days: self.window.num_days(),
            }),
        ))
    }
}

impl Default for EmbargoPolicy {
    fn default() -> Self {
        Self::days(DEFAULT_EMBARGO_DAYS)
    }
}

/// Record of an end-of-range clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmbargoAdjustment {
    /// End requested by the caller
    pub requested_end: DateTime<Utc>,
    /// End actually planned
    pub effective_end: DateTime<Utc>,
    /// Embargo length in days
    pub window_days: i64,
}

impl std::fmt::Display for EmbargoAdjustment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "end of range moved from {} to {} ({}-day embargo on unpublished data)",
            self.requested_end.format("%Y-%m-%dT%H:%M:%SZ"),
            self.effective_end.format("%Y-%m-%dT%H:%M:%SZ"),
            self.window_days
        )
    }
}
