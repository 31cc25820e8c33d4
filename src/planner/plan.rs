//! Range decomposition into retrieval units

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::embargo::{EmbargoAdjustment, EmbargoPolicy};
use super::unit::{Era5Request, RetrievalUnit, UnitKind};
use super::{PlanError, TimeRange};
use crate::downloader::FetchTask;
use crate::output::path::{month_file_name, month_slice_file_name, partial_day_file_name, slice_tag};

/// Splits time ranges into provider-sized retrieval units.
#[derive(Debug, Clone)]
pub struct RequestPlanner {
    output_dir: PathBuf,
    embargo: EmbargoPolicy,
}

impl RequestPlanner {
    /// Planner writing into `output_dir` with the default embargo.
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
            embargo: EmbargoPolicy::default(),
        }
    }

    /// Override the embargo policy.
    pub fn with_embargo(mut self, embargo: EmbargoPolicy) -> Self {
        self.embargo = embargo;
        self
    }

    /// Output directory of planned units
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Plan `range` against the current wall clock.
    pub fn plan_now(&self, range: TimeRange) -> Result<Plan, PlanError> {
        self.plan(range, Utc::now())
    }

    /// Plan `range` as seen at `now`.
    ///
    /// The partial-day unit for the last covered day comes first, followed by
    /// month units in ascending order.
    pub fn plan(&self, range: TimeRange, now: DateTime<Utc>) -> Result<Plan, PlanError> {
        let (effective, adjustment) = self.embargo.apply(range, now)?;
        if let Some(adjustment) = &adjustment {
            warn!(
                requested_end = %adjustment.requested_end,
                effective_end = %adjustment.effective_end,
                "Range shortened by embargo"
            );
        }

        let last_day = effective.end().date_naive();
        let mut last_day_hours = BTreeSet::new();
        let mut months: BTreeMap<(i32, u32), (BTreeSet<u32>, BTreeSet<u32>)> = BTreeMap::new();

        for ts in effective.hourly() {
            if ts.date_naive() == last_day {
                last_day_hours.insert(ts.hour());
            } else {
                let (days, hours) = months.entry((ts.year(), ts.month())).or_default();
                days.insert(ts.day());
                hours.insert(ts.hour());
            }
        }

        let mut units = Vec::with_capacity(months.len() + 1);
        units.push(self.partial_day_unit(last_day, last_day_hours));
        units.extend(
            months
                .into_iter()
                .map(|((year, month), (days, hours))| self.month_unit(year, month, days, hours)),
        );

        for unit in &units {
            debug!(
                period = %unit.period_key,
                days = unit.days.len(),
                hours = unit.hours.len(),
                destination = %unit.destination_path.display(),
                "Planned retrieval unit"
            );
        }
        info!(
            range = %effective,
            units = units.len(),
            hours = effective.hour_count(),
            "Planned ERA5 retrieval"
        );

        Ok(Plan {
            requested: range,
            effective,
            adjustment,
            units,
        })
    }

    fn partial_day_unit(&self, day: NaiveDate, hours: BTreeSet<u32>) -> RetrievalUnit {
        let last_hour = hours.iter().next_back().copied().unwrap_or(0);
        RetrievalUnit {
            period_key: day.format("%Y-%m-%d").to_string(),
            kind: UnitKind::PartialDay,
            year: day.year(),
            month: day.month(),
            days: BTreeSet::from([day.day()]),
            hours,
            destination_path: self.output_dir.join(partial_day_file_name(day, last_hour)),
        }
    }

    fn month_unit(
        &self,
        year: i32,
        month: u32,
        days: BTreeSet<u32>,
        hours: BTreeSet<u32>,
    ) -> RetrievalUnit {
        let first_day = days.first().copied().unwrap_or(1);
        let last_day = days.last().copied().unwrap_or(first_day);
        let first_hour = hours.first().copied().unwrap_or(0);
        let last_hour = hours.last().copied().unwrap_or(23);
        let whole_month = first_day == 1
            && last_day == days_in_month(year, month)
            && days.len() as u32 == last_day
            && hours.len() == 24;

        let (period_key, file_name) = if whole_month {
            (format!("{year:04}-{month:02}"), month_file_name(year, month))
        } else {
            let day_span = first_day..=last_day;
            let hour_span = first_hour..=last_hour;
            (
                format!(
                    "{year:04}-{month:02}-{}",
                    slice_tag(day_span.clone(), hour_span.clone())
                ),
                month_slice_file_name(year, month, day_span, hour_span),
            )
        };

        RetrievalUnit {
            period_key,
            kind: UnitKind::Month,
            year,
            month,
            days,
            hours,
            destination_path: self.output_dir.join(file_name),
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

/// Ordered retrieval units for one range.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    /// Range asked for
    pub requested: TimeRange,
    /// Range after embargo clamping
    pub effective: TimeRange,
    /// Present when the end was clamped
    pub adjustment: Option<EmbargoAdjustment>,
    /// Units, partial day first
    pub units: Vec<RetrievalUnit>,
}

impl Plan {
    /// Hourly slots in the effective range
    pub fn hour_count(&self) -> usize {
        self.effective.hour_count()
    }

    /// Hourly slots requested across all units
    pub fn slot_count(&self) -> usize {
        self.units.iter().map(RetrievalUnit::slot_count).sum()
    }

    /// Destination paths of every unit
    pub fn destinations(&self) -> BTreeSet<PathBuf> {
        self.units
            .iter()
            .map(|unit| unit.destination_path.clone())
            .collect()
    }

    /// One fetch task per unit, in planning order.
    pub fn to_fetch_tasks(&self, request: &Era5Request) -> Vec<FetchTask> {
        self.units
            .iter()
            .map(|unit| unit.to_fetch_task(request))
            .collect()
    }
}
