//! Prometheus metrics for fetch batches
//!
//! Counters for requests, 401/429 responses, retries, token refreshes and
//! task outcomes. Recording is always cheap: without an installed recorder
//! the `metrics` macros are no-ops, so the exporter is only set up when the
//! CLI is given `--metrics-addr`.

use metrics::{counter, describe_counter, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::downloader::TaskFailure;

/// Address the exporter was installed on
static METRICS_ADDR: OnceCell<SocketAddr> = OnceCell::new();

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (port in use, recorder already set)
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter on `addr`.
///
/// Idempotent: later calls return `Ok` without reinstalling. Must be called
/// from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_ADDR.get() {
        debug!(addr = %existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    let _ = METRICS_ADDR.set(addr);

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "HTTP requests issued by fetch workers"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Rate limit responses received"
    );
    describe_counter!(
        "http_401_errors_total",
        Unit::Count,
        "Unauthorized responses received"
    );
    describe_counter!("http_retries_total", Unit::Count, "Retry attempts");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Time to response headers"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Wait before a retry"
    );
    describe_counter!(
        "token_refreshes_total",
        Unit::Count,
        "Refresh grants by result"
    );
    describe_counter!(
        "fetch_tasks_total",
        Unit::Count,
        "Finished tasks by outcome"
    );
    describe_counter!(
        "fetch_bytes_total",
        Unit::Bytes,
        "Bytes persisted to destination files"
    );
    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a pacing slot"
    );

    info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let n = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{n:08x}")
}

/// Timing and labels for one HTTP request
pub struct HttpRequestMetrics {
    method: &'static str,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a request
    pub fn start(method: &'static str, attempt: u32) -> Self {
        Self {
            method,
            start_time: Instant::now(),
            correlation_id: generate_correlation_id(),
            attempt,
        }
    }

    /// Record response headers received with `status_code`
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "method" => self.method,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "method" => self.method)
            .record(duration.as_secs_f64());

        match status_code {
            429 => counter!("http_429_errors_total").increment(1),
            401 => counter!("http_401_errors_total").increment(1),
            _ => {}
        }

        debug!(
            correlation_id = %self.correlation_id,
            status = status_code,
            attempt = self.attempt,
            duration_ms = duration.as_millis() as u64,
            "HTTP response received"
        );
    }

    /// Record a request that produced no status (connect error, timeout)
    pub fn record_network_error(&self) {
        counter!(
            "http_requests_total",
            "method" => self.method,
            "status" => "network_error",
        )
        .increment(1);

        warn!(
            correlation_id = %self.correlation_id,
            attempt = self.attempt,
            duration_ms = self.start_time.elapsed().as_millis() as u64,
            "Network error recorded"
        );
    }

    /// Correlation ID of this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a retry wait
pub fn record_retry_backoff(duration: Duration, attempt: u32, reason: &'static str) {
    counter!("http_retries_total", "reason" => reason).increment(1);
    histogram!("retry_backoff_duration_seconds", "reason" => reason)
        .record(duration.as_secs_f64());

    debug!(
        attempt,
        reason,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Record a refresh grant result
pub fn record_token_refresh(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("token_refreshes_total", "result" => result).increment(1);
}

/// Record time spent waiting on the pacing limiter
pub fn record_rate_limit_wait(wait: Duration, available: usize) {
    histogram!("rate_limit_queue_wait_seconds").record(wait.as_secs_f64());
    gauge!("rate_limit_permits_available").set(available as f64);
}

/// Outcome counters for a single task
pub struct TaskMetrics {
    start_time: Instant,
}

impl TaskMetrics {
    /// Start timing a task
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// File persisted
    pub fn record_success(&self, bytes: u64) {
        counter!("fetch_tasks_total", "outcome" => "downloaded").increment(1);
        counter!("fetch_bytes_total").increment(bytes);
        debug!(
            bytes,
            duration_secs = self.start_time.elapsed().as_secs_f64(),
            "Task metrics recorded"
        );
    }

    /// Destination already present
    pub fn record_skipped(&self) {
        counter!("fetch_tasks_total", "outcome" => "skipped").increment(1);
    }

    /// Task gave up
    pub fn record_failure(&self, reason: TaskFailure) {
        counter!("fetch_tasks_total", "outcome" => reason.as_str()).increment(1);
    }
}
