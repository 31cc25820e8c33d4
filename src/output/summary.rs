//! End-of-run summaries for the terminal

use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

use crate::downloader::{BatchReport, TaskOutcome};
use crate::planner::EmbargoAdjustment;

/// Everything printed after a batch finishes.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    /// Subcommand that ran (`search`, `era5`)
    pub command: &'a str,
    /// Directory the batch wrote into
    pub output_dir: &'a Path,
    /// Embargo clamp applied while planning, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<EmbargoAdjustment>,
    /// Batch result
    pub report: &'a BatchReport,
}

/// Multi-line human summary.
pub fn render_human(run: &RunSummary<'_>) -> String {
    let summary = &run.report.summary;
    let mut out = String::new();

    let status = if run.report.is_success() {
        "completed"
    } else {
        "finished with failures"
    };
    let _ = writeln!(
        out,
        "{} {status}: {} succeeded, {} skipped, {} failed ({:.1}s)",
        capitalize(run.command),
        summary.succeeded,
        summary.skipped,
        summary.failed_total(),
        run.report.elapsed.as_secs_f64()
    );
    let _ = writeln!(out, "Output: {}", run.output_dir.display());
    if let Some(adjustment) = &run.adjustment {
        let _ = writeln!(out, "Note: {adjustment}");
    }

    if !summary.failed.is_empty() {
        let _ = writeln!(out, "Failed by kind:");
        for (kind, count) in &summary.failed {
            let _ = writeln!(out, "  {kind}: {count}");
        }
        let _ = writeln!(out, "Failures:");
        for report in run.report.failures() {
            if let TaskOutcome::Failed { reason, message } = &report.outcome {
                let _ = writeln!(
                    out,
                    "  [{reason}] {} after {} attempts: {message}",
                    report.destination_path.display(),
                    report.attempts
                );
            }
        }
    }

    out
}

/// Single-line JSON document.
pub fn render_json(run: &RunSummary<'_>) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(run)?;
    value["success"] = serde_json::Value::Bool(run.report.is_success());
    serde_json::to_string(&value)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
