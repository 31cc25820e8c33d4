//! ERA5 request planning
//!
//! Turns a long time range into retrieval units small enough for the provider
//! to serve in a single call.
//!
//! # Overview
//!
//! 1. **Embargo**: [`embargo::EmbargoPolicy`] clamps the end of the range back
//!    from "now" while the provider has not published final data yet.
//! 2. **Partial day**: the last covered calendar day always gets its own unit
//!    holding only the hours present in the range.
//! 3. **Months**: every remaining hour is grouped by `(year, month)` into one
//!    [`unit::RetrievalUnit`] per month slice.
//!
//! Destination paths depend only on the period of a unit, so planning the same
//! range twice yields the same files and the fetch engine can skip the ones
//! already on disk.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use geodata_fetch::planner::{EmbargoPolicy, RequestPlanner, TimeRange};
//!
//! let range = TimeRange::new(
//!     Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2023, 1, 3, 5, 0, 0).unwrap(),
//! )?;
//! let plan = RequestPlanner::new("./era5")
//!     .with_embargo(EmbargoPolicy::none())
//!     .plan(range, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())?;
//! assert_eq!(plan.units.len(), 2);
//! # Ok::<(), geodata_fetch::planner::PlanError>(())
//! ```

use chrono::{DateTime, Utc};

pub mod embargo;
pub mod plan;
pub mod range;
pub mod unit;

pub use embargo::{EmbargoAdjustment, EmbargoPolicy, DEFAULT_EMBARGO_DAYS};
pub use plan::{Plan, RequestPlanner};
pub use range::{parse_timestamp, RangeBoundary, TimeRange};
pub use unit::{Era5Request, RetrievalUnit, UnitKind};

/// Planning errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Range start lies after its end (possibly after embargo clamping)
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        /// Range start
        start: DateTime<Utc>,
        /// Range end
        end: DateTime<Utc>,
    },

    /// Unparseable timestamp input
    #[error("invalid timestamp '{input}': {reason}")]
    InvalidTimestamp {
        /// Raw input
        input: String,
        /// Parser message
        reason: String,
    },
}
