//! Fetch tasks and their outcomes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// What to request for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FetchSource {
    /// Plain GET of a resource URL
    Url {
        /// Resource URL
        url: String,
    },
    /// POST of a JSON query descriptor; the response body is the file
    Query {
        /// Retrieval endpoint
        url: String,
        /// Query descriptor
        body: serde_json::Value,
    },
}

impl FetchSource {
    /// Target URL
    pub fn url(&self) -> &str {
        match self {
            Self::Url { url } | Self::Query { url, .. } => url,
        }
    }
}

/// One unit of download work: a source and where its bytes end up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchTask {
    /// Request to issue
    pub source: FetchSource,
    /// Final location of the downloaded file
    pub destination_path: PathBuf,
    /// Attempts consumed so far
    #[serde(default)]
    pub attempts: u32,
}

impl FetchTask {
    /// GET `url` into `destination_path`.
    pub fn get(url: impl Into<String>, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            source: FetchSource::Url { url: url.into() },
            destination_path: destination_path.into(),
            attempts: 0,
        }
    }

    /// POST `body` to `url`, storing the response in `destination_path`.
    pub fn query(
        url: impl Into<String>,
        body: serde_json::Value,
        destination_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: FetchSource::Query {
                url: url.into(),
                body,
            },
            destination_path: destination_path.into(),
            attempts: 0,
        }
    }

    /// Short label for logs and progress bars
    pub fn label(&self) -> String {
        self.destination_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.destination_path.display().to_string())
    }
}

/// Why a task did not produce its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFailure {
    /// Server answered 404
    NotFound,
    /// Too many 429 responses
    RateLimitExceeded,
    /// Too many network errors, timeouts or unexpected statuses
    TransientFailureExceeded,
    /// Token rejected after a refresh, or refresh impossible
    AuthenticationFailed,
    /// Shutdown requested before the task finished
    Cancelled,
    /// Local filesystem error
    Io,
}

impl TaskFailure {
    /// Stable snake_case name used in logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::TransientFailureExceeded => "transient_failure_exceeded",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// File written to its destination
    Downloaded {
        /// Bytes written
        bytes: u64,
    },
    /// Destination already existed; no request issued
    Skipped,
    /// Task gave up
    Failed {
        /// Failure category
        reason: TaskFailure,
        /// Last error seen
        message: String,
    },
}

impl TaskOutcome {
    /// Whether the destination exists after this outcome
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Failure category, if any
    pub fn failure(&self) -> Option<TaskFailure> {
        match self {
            Self::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Per-task result line.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// Position of the task in the submitted batch
    pub index: usize,
    /// Destination of the task
    pub destination_path: PathBuf,
    /// Requests issued for this task
    pub attempts: u32,
    /// Terminal state
    pub outcome: TaskOutcome,
}

/// Counts of outcomes across a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Files downloaded
    pub succeeded: usize,
    /// Files already present
    pub skipped: usize,
    /// Failed tasks per reason
    pub failed: BTreeMap<TaskFailure, usize>,
}

impl BatchSummary {
    /// Total failed tasks
    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }

    /// Total tasks accounted for
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed_total()
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Downloaded { .. } => self.succeeded += 1,
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Failed { reason, .. } => *self.failed.entry(*reason).or_default() += 1,
        }
    }
}

/// Result of running a batch: every task accounted for exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Reports in submission order
    pub tasks: Vec<TaskReport>,
    /// Aggregate counts
    pub summary: BatchSummary,
    /// Wall-clock time of the batch
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl BatchReport {
    /// Build from per-task reports, sorting them back into submission order.
    pub fn from_reports(mut tasks: Vec<TaskReport>, elapsed: Duration) -> Self {
        tasks.sort_by_key(|r| r.index);
        let mut summary = BatchSummary::default();
        for report in &tasks {
            summary.record(&report.outcome);
        }
        Self {
            tasks,
            summary,
            elapsed,
        }
    }

    /// True when no task failed
    pub fn is_success(&self) -> bool {
        self.summary.failed_total() == 0
    }

    /// Reports of failed tasks
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|r| !r.outcome.is_success())
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
