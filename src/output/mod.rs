//! Output naming and run summaries

use std::str::FromStr;

pub mod path;
pub mod summary;

pub use summary::{render_human, render_json, RunSummary};

/// How results are printed on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Single JSON document
    Json,
    /// Human-readable lines
    #[default]
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}. Valid options: human, json")),
        }
    }
}
