//! Resilient fetch engine
//!
//! Executes a batch of independent [`FetchTask`]s with bounded parallelism.
//!
//! # Overview
//!
//! 1. **Skip**: a task whose destination already exists is reported as
//!    [`TaskOutcome::Skipped`] without any request.
//! 2. **Fetch**: the body is streamed into a hidden part file next to the
//!    destination ([`writer::PartFile`]), synced, and renamed into place.
//! 3. **Classify**: 401 refreshes the shared [`crate::auth::AuthSession`] and
//!    retries once, 429 waits a fixed interval, other failures back off
//!    exponentially ([`retry`]).
//! 4. **Report**: the batch always runs to completion and returns a
//!    [`BatchReport`] with exactly one entry per task.
//!
//! # Quick Start
//!
//! ```no_run
//! use geodata_fetch::downloader::{http, FetchEngine, FetchTask};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = FetchEngine::new(http::build_client()?).with_workers(4);
//! let report = engine
//!     .run(vec![FetchTask::get("https://example.test/a.nc", "./data/a.nc")])
//!     .await;
//! assert_eq!(report.summary.total(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod http;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod task;
pub mod writer;

use std::time::Duration;

pub use config::RetryPolicy;
pub use executor::FetchEngine;
pub use progress::{ProgressEvent, ProgressSender, TransferProgress};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use task::{
    BatchReport, BatchSummary, FetchSource, FetchTask, TaskFailure, TaskOutcome, TaskReport,
};

use crate::auth::AuthError;

/// Error of a single fetch attempt
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure
    #[error("network error: {message}")]
    Network {
        /// Underlying error text
        message: String,
        /// Failure happened while connecting
        connect: bool,
    },

    /// Send or chunk read took longer than the request timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown requested
    #[error("cancelled")]
    Cancelled,

    /// Body ended before the advertised length
    #[error("incomplete body: expected {expected} bytes, received {written}")]
    PartialWrite {
        /// `Content-Length`
        expected: u64,
        /// Bytes received
        written: u64,
    },

    /// Token unavailable
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            connect: err.is_connect(),
            message: err.to_string(),
        }
    }
}
