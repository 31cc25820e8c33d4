//! Fetch engine configuration constants

use std::time::Duration;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound on concurrent workers.
/// The Copernicus data space caps concurrent downloads per account.
pub const MAX_WORKERS: usize = 32;

/// Attempts allowed for transient failures (network errors, timeouts, 5xx)
/// before a task is given up.
pub const MAX_TRANSIENT_ATTEMPTS: u32 = 5;

/// Attempts allowed for 429 responses before a task is given up.
pub const MAX_RATE_LIMIT_ATTEMPTS: u32 = 10;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Fixed wait after a 429 response.
pub const RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Per-step timeout for sending a request or reading one body chunk.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// TCP connect timeout for the shared client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry limits and delays applied to every task.
///
/// Fields are public so tests can shrink the delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed for transient failures
    pub max_transient_attempts: u32,
    /// Attempts allowed for 429 responses
    pub max_rate_limit_attempts: u32,
    /// First transient backoff
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
    /// Wait after each 429
    pub rate_limit_wait: Duration,
    /// Timeout for each send and each chunk read
    pub request_timeout: Duration,
}

impl RetryPolicy {
    /// Delay before the retry following failure number `retry_count` (0-based).
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transient_attempts: MAX_TRANSIENT_ATTEMPTS,
            max_rate_limit_attempts: MAX_RATE_LIMIT_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            rate_limit_wait: RATE_LIMIT_WAIT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}
