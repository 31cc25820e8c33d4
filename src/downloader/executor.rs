//! Fetch engine: worker pool, per-task retry loop and streaming writes

use futures_util::StreamExt;
use reqwest::Client;
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config::{RetryPolicy, DEFAULT_WORKERS, MAX_WORKERS};
use super::http;
use super::progress::{ProgressEvent, ProgressSender, TransferProgress};
use super::rate_limit::RateLimiter;
use super::retry::{classify_status, ResponseClass, RetryContext, RetryErrorType};
use super::task::{BatchReport, FetchTask, TaskFailure, TaskOutcome, TaskReport};
use super::writer::PartFile;
use super::FetchError;
use crate::auth::{AuthSession, BearerToken};
use crate::metrics::{self, HttpRequestMetrics, TaskMetrics};
use crate::shutdown::SharedShutdown;

type TaskQueue = Arc<Mutex<VecDeque<(usize, FetchTask)>>>;

/// Terminal failure of a task: category and last error message
type Failure = (TaskFailure, String);

/// Executes batches of fetch tasks with a bounded worker pool.
///
/// Cloning is cheap; clones share the HTTP client, auth session, limiter and
/// shutdown handle.
#[derive(Clone)]
pub struct FetchEngine {
    client: Client,
    auth: Option<Arc<AuthSession>>,
    workers: usize,
    retry: RetryPolicy,
    rate_limiter: Option<RateLimiter>,
    shutdown: Option<SharedShutdown>,
    progress: ProgressSender,
}

impl FetchEngine {
    /// Engine with default workers and retry policy, sending no credentials.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            auth: None,
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            rate_limiter: None,
            shutdown: None,
            progress: ProgressSender::disabled(),
        }
    }

    /// Send the session's bearer token and refresh it on 401.
    pub fn with_auth(mut self, auth: Arc<AuthSession>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Number of concurrent workers, clamped to `1..=MAX_WORKERS`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    /// Override retry limits and delays.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pace request starts across all workers.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Publish progress events to `progress`.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// Configured worker count
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every task to a terminal state.
    ///
    /// Never fails as a whole: each task is reported exactly once, in
    /// submission order.
    pub async fn run(&self, tasks: Vec<FetchTask>) -> BatchReport {
        let started = Instant::now();
        let total = tasks.len();
        let span = info_span!("fetch_batch", tasks = total, workers = self.workers);

        async move {
            let destinations: Vec<PathBuf> =
                tasks.iter().map(|t| t.destination_path.clone()).collect();
            let queue: TaskQueue = Arc::new(Mutex::new(tasks.into_iter().enumerate().collect()));

            info!("Starting fetch batch");

            let mut set = JoinSet::new();
            for worker_id in 0..self.workers.min(total) {
                let engine = self.clone();
                let queue = queue.clone();
                set.spawn(
                    async move { engine.worker_loop(queue).await }
                        .instrument(info_span!("worker", id = worker_id)),
                );
            }

            let mut reports = Vec::with_capacity(total);
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(mut worker_reports) => reports.append(&mut worker_reports),
                    Err(e) => error!(error = %e, "Fetch worker terminated abnormally"),
                }
            }

            // A panicked worker loses its in-flight task; account for it.
            let reported: BTreeSet<usize> = reports.iter().map(|r| r.index).collect();
            for (index, destination_path) in destinations.into_iter().enumerate() {
                if !reported.contains(&index) {
                    reports.push(TaskReport {
                        index,
                        destination_path,
                        attempts: 0,
                        outcome: TaskOutcome::Failed {
                            reason: TaskFailure::Cancelled,
                            message: "worker aborted before finishing the task".to_string(),
                        },
                    });
                }
            }

            let report = BatchReport::from_reports(reports, started.elapsed());
            info!(
                succeeded = report.summary.succeeded,
                skipped = report.summary.skipped,
                failed = report.summary.failed_total(),
                elapsed_secs = report.elapsed.as_secs_f64(),
                "Fetch batch finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn worker_loop(&self, queue: TaskQueue) -> Vec<TaskReport> {
        let mut reports = Vec::new();
        loop {
            let next = queue.lock().await.pop_front();
            let Some((index, task)) = next else {
                break;
            };

            let report = if self.shutdown_requested() {
                TaskReport {
                    index,
                    destination_path: task.destination_path,
                    attempts: task.attempts,
                    outcome: TaskOutcome::Failed {
                        reason: TaskFailure::Cancelled,
                        message: "shutdown requested before start".to_string(),
                    },
                }
            } else {
                self.execute(index, task).await
            };

            self.progress.send(ProgressEvent::Finished {
                index,
                outcome: report.outcome.clone(),
            });
            reports.push(report);
        }
        reports
    }

    async fn execute(&self, index: usize, mut task: FetchTask) -> TaskReport {
        let span = info_span!("fetch_task", index, file = %task.label());
        async move {
            let task_metrics = TaskMetrics::start();

            if tokio::fs::try_exists(&task.destination_path)
                .await
                .unwrap_or(false)
            {
                debug!("Destination exists, skipping");
                task_metrics.record_skipped();
                return TaskReport {
                    index,
                    destination_path: task.destination_path,
                    attempts: task.attempts,
                    outcome: TaskOutcome::Skipped,
                };
            }

            let outcome = match self.fetch_with_retry(index, &mut task).await {
                Ok(bytes) => {
                    info!(bytes, attempts = task.attempts, "Downloaded");
                    task_metrics.record_success(bytes);
                    TaskOutcome::Downloaded { bytes }
                }
                Err((reason, message)) => {
                    warn!(%reason, error = %message, attempts = task.attempts, "Task failed");
                    task_metrics.record_failure(reason);
                    TaskOutcome::Failed { reason, message }
                }
            };

            TaskReport {
                index,
                destination_path: task.destination_path,
                attempts: task.attempts,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    /// Retry loop for one task. Returns bytes persisted.
    async fn fetch_with_retry(&self, index: usize, task: &mut FetchTask) -> Result<u64, Failure> {
        let mut transient_failures = 0u32;
        let mut rate_limited = 0u32;
        let mut refreshed = false;

        loop {
            if self.shutdown_requested() {
                return Err(cancelled());
            }

            let bearer = match &self.auth {
                Some(auth) => Some(
                    auth.bearer()
                        .await
                        .map_err(|e| (TaskFailure::AuthenticationFailed, e.to_string()))?,
                ),
                None => None,
            };

            self.pace().await;

            task.attempts += 1;
            let err = match self.attempt(index, task, bearer.as_ref()).await {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::Cancelled) => return Err(cancelled()),
                Err(err) => err,
            };

            let kind = RetryErrorType::from_fetch_error(&err);
            let (attempt, max_attempts, wait) = match kind {
                RetryErrorType::NotFound | RetryErrorType::Io => {
                    return Err((kind.terminal_failure(), err.to_string()));
                }
                RetryErrorType::Unauthorized => {
                    let Some(auth) = &self.auth else {
                        return Err((
                            TaskFailure::AuthenticationFailed,
                            "server requires authentication".to_string(),
                        ));
                    };
                    if refreshed {
                        error!("Request rejected again after token refresh");
                        return Err((TaskFailure::AuthenticationFailed, err.to_string()));
                    }
                    let generation = bearer.map(|b| b.generation).unwrap_or_default();
                    debug!(generation, "Access token rejected, refreshing");
                    auth.refresh_after(generation)
                        .await
                        .map_err(|e| (TaskFailure::AuthenticationFailed, e.to_string()))?;
                    refreshed = true;
                    continue;
                }
                RetryErrorType::RateLimit => {
                    rate_limited += 1;
                    (
                        rate_limited,
                        self.retry.max_rate_limit_attempts,
                        self.retry.rate_limit_wait,
                    )
                }
                _ => {
                    transient_failures += 1;
                    (
                        transient_failures,
                        self.retry.max_transient_attempts,
                        self.retry.backoff(transient_failures - 1),
                    )
                }
            };

            let context = RetryContext {
                attempt,
                max_attempts,
                error_type: kind,
                backoff_duration: wait,
                destination: &task.destination_path,
                error_message: err.to_string(),
                endpoint: task.source.url(),
            };

            if attempt >= max_attempts {
                error!("{}", context.format_failure());
                return Err((kind.terminal_failure(), err.to_string()));
            }

            warn!("{}", context.format_retry());
            metrics::record_retry_backoff(wait, attempt, kind.metric_reason());
            if !self.sleep_unless_shutdown(wait).await {
                return Err(cancelled());
            }
        }
    }

    /// One request: send, classify, stream into a part file, persist.
    async fn attempt(
        &self,
        index: usize,
        task: &FetchTask,
        bearer: Option<&BearerToken>,
    ) -> Result<u64, FetchError> {
        let timeout = self.retry.request_timeout;
        let request_metrics =
            HttpRequestMetrics::start(http::method_name(&task.source), task.attempts);

        let sent = self
            .unless_shutdown(http::send(
                &self.client,
                &task.source,
                bearer.map(|b| b.value.as_str()),
                timeout,
            ))
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(err) => {
                request_metrics.record_network_error();
                return Err(err);
            }
        };

        let status = response.status();
        request_metrics.record_complete(status.as_u16());
        if classify_status(status) != ResponseClass::Success {
            return Err(FetchError::Status(status.as_u16()));
        }

        let total_bytes = response.content_length();
        self.progress.send(ProgressEvent::Started {
            index,
            destination: task.destination_path.clone(),
            total_bytes,
        });

        let mut part = PartFile::create(&task.destination_path).await?;
        let mut progress = TransferProgress::new(total_bytes);
        let mut body = response.bytes_stream();

        loop {
            let next = self
                .unless_shutdown(async {
                    tokio::time::timeout(timeout, body.next())
                        .await
                        .map_err(|_| FetchError::Timeout(timeout))
                })
                .await?;

            match next {
                Some(Ok(chunk)) => {
                    part.write_chunk(&chunk).await?;
                    progress.update(chunk.len() as u64);
                    self.progress.send(ProgressEvent::Advanced {
                        index,
                        bytes_downloaded: part.written(),
                    });
                    if progress.should_emit_update() {
                        info!("{}", progress.format_progress());
                        progress.mark_emitted();
                    }
                }
                Some(Err(e)) => return Err(FetchError::from(e)),
                None => break,
            }
        }

        if let Some(expected) = total_bytes {
            if part.written() < expected {
                return Err(FetchError::PartialWrite {
                    expected,
                    written: part.written(),
                });
            }
        }

        Ok(part.commit().await?)
    }

    async fn pace(&self) {
        let Some(limiter) = &self.rate_limiter else {
            return;
        };
        let waited = Instant::now();
        if let Err(e) = limiter.acquire().await {
            warn!(error = %e, "Request pacing unavailable, continuing without it");
            return;
        }
        metrics::record_rate_limit_wait(waited.elapsed(), limiter.available());
    }

    /// Race `fut` against shutdown.
    async fn unless_shutdown<T, F>(&self, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        match &self.shutdown {
            Some(shutdown) => tokio::select! {
                biased;
                _ = shutdown.wait_for_shutdown() => Err(FetchError::Cancelled),
                result = fut => result,
            },
            None => fut.await,
        }
    }

    /// Sleep for `wait`; false if shutdown interrupted it.
    async fn sleep_unless_shutdown(&self, wait: Duration) -> bool {
        self.unless_shutdown(async {
            tokio::time::sleep(wait).await;
            Ok(())
        })
        .await
        .is_ok()
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }
}

fn cancelled() -> Failure {
    (TaskFailure::Cancelled, "shutdown requested".to_string())
}
