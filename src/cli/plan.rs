//! Human rendering of an ERA5 retrieval plan

use std::fmt::Write as _;

use crate::planner::{Plan, UnitKind};

/// One header line, one line per unit, then the embargo note if any.
pub fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Plan: {} ({} hours, {} units)",
        plan.effective,
        plan.hour_count(),
        plan.units.len()
    );
    for unit in &plan.units {
        let kind = match unit.kind {
            UnitKind::PartialDay => "partial-day",
            UnitKind::Month => "month",
        };
        let _ = writeln!(
            out,
            "  {kind:<11} {:<14} days {:>2} hours {:>2} -> {}",
            unit.period_key,
            unit.days.len(),
            unit.hours.len(),
            unit.destination_path.display()
        );
    }
    if let Some(adjustment) = &plan.adjustment {
        let _ = writeln!(out, "Note: {adjustment}");
    }
    out
}
