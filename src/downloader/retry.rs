//! Response classification and retry log formatting.
//!
//! Every failed attempt maps to one [`RetryErrorType`], which decides whether the
//! engine retries, and with which budget:
//!
//! | kind | budget | wait |
//! |------|--------|------|
//! | `NotFound` | none | - |
//! | `Unauthorized` | one retry after a token refresh | - |
//! | `RateLimited` | `max_rate_limit_attempts` | fixed `rate_limit_wait` |
//! | `Transient` | `max_transient_attempts` | exponential backoff |
//! | `Io` | none | - |

use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;

use super::task::TaskFailure;
use super::FetchError;

/// How the engine reacts to an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx: stream the body
    Success,
    /// 404: permanent
    NotFound,
    /// 401: refresh and retry once
    Unauthorized,
    /// 429: fixed wait
    RateLimited,
    /// Anything else: backoff
    Transient,
}

/// Classify a response status.
pub fn classify_status(status: StatusCode) -> ResponseClass {
    match status {
        s if s.is_success() => ResponseClass::Success,
        StatusCode::NOT_FOUND => ResponseClass::NotFound,
        StatusCode::UNAUTHORIZED => ResponseClass::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => ResponseClass::RateLimited,
        _ => ResponseClass::Transient,
    }
}

/// Classification of a failed attempt for retry decisions and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Send or chunk read exceeded the request timeout
    NetworkTimeout,
    /// Connection refused, DNS failure or similar
    NetworkOffline,
    /// Connection dropped mid-body or other transport failure
    NetworkGeneric,
    /// HTTP 429
    RateLimit,
    /// HTTP 401
    Unauthorized,
    /// HTTP 404
    NotFound,
    /// HTTP 5xx
    ServerError(u16),
    /// Other unexpected status
    UnexpectedStatus(u16),
    /// Local filesystem failure
    Io,
}

impl RetryErrorType {
    /// Classify an attempt error.
    pub fn from_fetch_error(err: &FetchError) -> Self {
        match err {
            FetchError::Timeout(_) => Self::NetworkTimeout,
            FetchError::Network { connect: true, .. } => Self::NetworkOffline,
            FetchError::Network { .. } | FetchError::PartialWrite { .. } => Self::NetworkGeneric,
            FetchError::Status(code) => match *code {
                429 => Self::RateLimit,
                401 => Self::Unauthorized,
                404 => Self::NotFound,
                code if (500..600).contains(&code) => Self::ServerError(code),
                code => Self::UnexpectedStatus(code),
            },
            FetchError::Io(_) => Self::Io,
            FetchError::Auth(_) => Self::Unauthorized,
            FetchError::Cancelled => Self::NetworkGeneric,
        }
    }

    /// User-facing description used in retry log lines.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::NetworkGeneric => "network error",
            Self::RateLimit => "rate limit exceeded",
            Self::Unauthorized => "access token rejected",
            Self::NotFound => "resource not found",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::UnexpectedStatus(_) => "unexpected status",
            Self::Io => "local I/O error",
        }
    }

    /// Remediation hint printed with a final failure.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::NetworkGeneric => "Check network connectivity and try again",
            Self::RateLimit => "Lower --workers or wait before re-running",
            Self::Unauthorized => "Verify the credentials in your config file",
            Self::NotFound => "The product may have been removed from the catalog",
            Self::ServerError(_) => "The service may be experiencing issues, try again later",
            Self::UnexpectedStatus(_) => "Re-run later; existing files are skipped",
            Self::Io => "Check free disk space and permissions of the output directory",
        }
    }

    /// Terminal failure this kind maps to once its budget is spent.
    pub fn terminal_failure(&self) -> TaskFailure {
        match self {
            Self::RateLimit => TaskFailure::RateLimitExceeded,
            Self::Unauthorized => TaskFailure::AuthenticationFailed,
            Self::NotFound => TaskFailure::NotFound,
            Self::Io => TaskFailure::Io,
            Self::NetworkTimeout
            | Self::NetworkOffline
            | Self::NetworkGeneric
            | Self::ServerError(_)
            | Self::UnexpectedStatus(_) => TaskFailure::TransientFailureExceeded,
        }
    }

    /// Metrics label for retries of this kind
    pub fn metric_reason(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limited",
            Self::Unauthorized => "unauthorized",
            _ => "transient",
        }
    }
}

/// Context for one retry or final failure log line.
#[derive(Debug, Clone)]
pub struct RetryContext<'a> {
    /// Attempt number within the current budget (1-based)
    pub attempt: u32,
    /// Budget for this error kind
    pub max_attempts: u32,
    /// What went wrong
    pub error_type: RetryErrorType,
    /// Wait before the next attempt
    pub backoff_duration: Duration,
    /// Task destination
    pub destination: &'a Path,
    /// Underlying error text
    pub error_message: String,
    /// Request URL
    pub endpoint: &'a str,
}

impl RetryContext<'_> {
    /// `Retrying (attempt 2/5) after gateway timeout - waiting 2.0 seconds... (file.zip)`
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            file_label(self.destination)
        )
    }

    /// Multi-line summary for a task that gave up.
    pub fn format_failure(&self) -> String {
        [
            format!(
                "[FAILED] {} after {} attempts",
                file_label(self.destination),
                self.attempt
            ),
            format!("  Last error: {}", self.error_message),
            format!("  Endpoint: {}", self.endpoint),
            format!("  Suggestion: {}", self.error_type.suggestion()),
        ]
        .join("\n")
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
