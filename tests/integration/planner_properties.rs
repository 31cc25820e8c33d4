//! Planner partition and idempotence over many ranges

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use geodata_fetch::planner::{EmbargoPolicy, PlanError, RequestPlanner, TimeRange, UnitKind};

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn ranges() -> Vec<TimeRange> {
    [
        (utc(2023, 1, 1, 0), utc(2023, 1, 3, 5)),
        (utc(2023, 1, 31, 22), utc(2023, 2, 1, 1)),
        (utc(2020, 2, 27, 0), utc(2020, 3, 2, 0)),
        (utc(2022, 12, 30, 0), utc(2023, 1, 1, 23)),
        (utc(2023, 6, 15, 8), utc(2023, 6, 15, 8)),
        (utc(2021, 1, 1, 0), utc(2021, 12, 31, 23)),
    ]
    .into_iter()
    .map(|(start, end)| TimeRange::new(start, end).unwrap())
    .collect()
}

fn planner(dir: &str) -> RequestPlanner {
    RequestPlanner::new(dir).with_embargo(EmbargoPolicy::none())
}

#[test]
fn test_units_partition_the_hourly_range() {
    for range in ranges() {
        let plan = planner("/era5").plan(range, utc(2030, 1, 1, 0)).unwrap();

        let mut covered = BTreeSet::new();
        for unit in &plan.units {
            for ts in unit.timestamps() {
                assert!(covered.insert(ts), "{ts} requested twice for {range}");
            }
        }
        let expected: BTreeSet<_> = range.hourly().collect();
        assert_eq!(covered, expected, "coverage mismatch for {range}");
        assert_eq!(plan.slot_count(), plan.hour_count());

        assert_eq!(plan.units[0].kind, UnitKind::PartialDay);
        assert!(plan.units[1..].iter().all(|u| u.kind == UnitKind::Month));
        let months: Vec<_> = plan.units[1..].iter().map(|u| (u.year, u.month)).collect();
        let mut sorted = months.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(months, sorted);
    }
}

#[test]
fn test_replanning_targets_the_same_files() {
    for range in ranges() {
        let now = utc(2030, 1, 1, 0);
        let first = planner("/era5").plan(range, now).unwrap();
        let second = planner("/era5").plan(range, now).unwrap();
        assert_eq!(first.destinations(), second.destinations());
        assert_eq!(first.destinations().len(), first.units.len());
    }
}

#[test]
fn test_full_year_has_thirteen_units() {
    let range = TimeRange::new(utc(2021, 1, 1, 0), utc(2021, 12, 31, 23)).unwrap();
    let plan = planner("/era5").plan(range, utc(2030, 1, 1, 0)).unwrap();
    assert_eq!(plan.units.len(), 13);
    assert_eq!(plan.hour_count(), 365 * 24);
    assert_eq!(plan.units[12].days.len(), 30);
}

#[test]
fn test_embargo_clamps_relative_to_now() {
    let now = utc(2024, 6, 5, 0);
    let range = TimeRange::new(utc(2024, 5, 20, 0), utc(2024, 6, 4, 0)).unwrap();
    let plan = RequestPlanner::new("/era5")
        .with_embargo(EmbargoPolicy::days(5))
        .plan(range, now)
        .unwrap();

    let adjustment = plan.adjustment.unwrap();
    assert_eq!(adjustment.requested_end, utc(2024, 6, 4, 0));
    assert_eq!(adjustment.effective_end, now - TimeDelta::days(5));
    assert!(plan
        .units
        .iter()
        .flat_map(|u| u.timestamps())
        .all(|ts| ts <= utc(2024, 5, 31, 0)));
}

#[test]
fn test_embargo_swallowing_the_whole_range_is_an_error() {
    let now = utc(2024, 6, 5, 0);
    let range = TimeRange::new(utc(2024, 6, 3, 0), utc(2024, 6, 4, 0)).unwrap();
    let err = RequestPlanner::new("/era5")
        .with_embargo(EmbargoPolicy::days(5))
        .plan(range, now)
        .unwrap_err();
    assert!(matches!(err, PlanError::InvalidRange { .. }));
}
