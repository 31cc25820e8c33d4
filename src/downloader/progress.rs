//! Progress reporting for long-running transfers.
//!
//! Workers publish [`ProgressEvent`]s on an unbounded channel so a slow
//! consumer (a terminal progress bar) never blocks a download. Each worker
//! also keeps a [`TransferProgress`] per task to emit periodic log lines with
//! percentage, rate and remaining-time estimates.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::task::TaskOutcome;

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const MIN_TRANSFER_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Progress notification from a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Response headers received; body about to stream
    Started {
        /// Task index in the batch
        index: usize,
        /// Destination file
        destination: PathBuf,
        /// `Content-Length`, when known
        total_bytes: Option<u64>,
    },
    /// Bytes appended to the part file
    Advanced {
        /// Task index in the batch
        index: usize,
        /// Bytes written so far for the current attempt
        bytes_downloaded: u64,
    },
    /// Task reached its terminal state
    Finished {
        /// Task index in the batch
        index: usize,
        /// Outcome
        outcome: TaskOutcome,
    },
}

/// Optional sending half of the progress channel.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender(Option<UnboundedSender<ProgressEvent>>);

impl ProgressSender {
    /// Sender that drops every event
    pub fn disabled() -> Self {
        Self(None)
    }

    /// Connected sender and its receiver
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(Some(tx)), rx)
    }

    /// Publish an event; a closed receiver is ignored.
    pub fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}

/// Byte-level progress of one transfer attempt.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Bytes written so far
    pub bytes_downloaded: u64,
    /// Expected size from `Content-Length`
    pub total_bytes: Option<u64>,
    /// When the transfer started
    pub start_time: Instant,
    /// Last time progress was logged
    pub last_update: Instant,
    /// Minimum interval between time-based updates
    pub update_interval: Duration,
    /// Current rate in bytes per second
    pub current_rate: f64,
    /// Percentage at the last emitted update
    pub last_reported_percentage: f64,
    /// Percentage delta that triggers an update
    pub min_percentage_step: f64,
}

impl TransferProgress {
    /// Start tracking a transfer of `total_bytes`.
    pub fn new(total_bytes: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            bytes_downloaded: 0,
            total_bytes,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            current_rate: 0.0,
            last_reported_percentage: 0.0,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
        }
    }

    /// Record `new_bytes` written.
    pub fn update(&mut self, new_bytes: u64) {
        self.bytes_downloaded = self.bytes_downloaded.saturating_add(new_bytes);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current_rate = self.bytes_downloaded as f64 / elapsed;
        }
    }

    /// Whether a log line is due, by percentage step or by time.
    pub fn should_emit_update(&self) -> bool {
        if self.bytes_downloaded == 0 {
            return false;
        }

        let percentage_jump = self
            .percentage()
            .map(|pct| pct - self.last_reported_percentage >= self.min_percentage_step)
            .unwrap_or(false);
        if percentage_jump {
            return true;
        }

        self.start_time.elapsed() >= MIN_TRANSFER_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Reset timers after a log line.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        if let Some(pct) = self.percentage() {
            self.last_reported_percentage = pct;
        }
    }

    /// Completion percentage (0-100), when the size is known.
    pub fn percentage(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.bytes_downloaded as f64 * 100.0 / total as f64).min(100.0)
            }
        })
    }

    /// Remaining time at the current rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.current_rate <= 0.0 {
            return None;
        }
        let remaining = self.total_bytes?.saturating_sub(self.bytes_downloaded);
        (remaining > 0).then(|| Duration::from_secs_f64(remaining as f64 / self.current_rate))
    }

    /// Human-readable progress line.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] Downloaded {}",
            format_bytes(self.bytes_downloaded)
        )];

        if let Some(total) = self.total_bytes {
            parts.push(format!("of {}", format_bytes(total)));
        }
        if let Some(pct) = self.percentage() {
            parts.push(format!("- {pct:.1}% complete"));
        }
        if self.current_rate > 0.0 {
            parts.push(format!("at {}/s", format_bytes(self.current_rate as u64)));
        }
        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

/// `1.5 MiB`-style size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
