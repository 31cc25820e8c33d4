//! Fetch engine against an in-process HTTP server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use geodata_fetch::downloader::{
    FetchTask, ProgressEvent, ProgressSender, RetryPolicy, TaskFailure, TaskOutcome,
};
use geodata_fetch::planner::{EmbargoPolicy, Era5Request, RequestPlanner, TimeRange};

use crate::common::{bind, dir_entries, engine, fast_policy, payload, serve};

const BODY_LEN: usize = 64 * 1024;

#[derive(Clone, Default)]
struct Hits {
    count: Arc<AtomicUsize>,
}

async fn ok_body(State(hits): State<Hits>) -> impl IntoResponse {
    hits.count.fetch_add(1, Ordering::SeqCst);
    payload(BODY_LEN)
}

#[tokio::test]
async fn test_downloads_missing_files_and_skips_existing_ones() {
    let hits = Hits::default();
    let app = Router::new()
        .route("/file", get(ok_body))
        .with_state(hits.clone());
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let existing = dir.path().join("existing.zip");
    std::fs::write(&existing, b"already here").unwrap();
    let fresh = dir.path().join("fresh.zip");
    let url = format!("http://{addr}/file");

    let report = engine(2)
        .run(vec![
            FetchTask::get(&url, &existing),
            FetchTask::get(&url, &fresh),
        ])
        .await;

    assert_eq!(report.tasks[0].outcome, TaskOutcome::Skipped);
    assert_eq!(
        report.tasks[1].outcome,
        TaskOutcome::Downloaded {
            bytes: BODY_LEN as u64
        }
    );
    assert_eq!(hits.count.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(&existing).unwrap(), b"already here");
    assert_eq!(std::fs::read(&fresh).unwrap(), payload(BODY_LEN));
    assert_eq!(dir_entries(dir.path()), vec!["existing.zip", "fresh.zip"]);
}

#[tokio::test]
async fn test_second_run_issues_no_requests() {
    let hits = Hits::default();
    let app = Router::new()
        .route("/file", get(ok_body))
        .with_state(hits.clone());
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let tasks = || {
        (0..4)
            .map(|i| FetchTask::get(format!("http://{addr}/file"), dir.path().join(format!("{i}.zip"))))
            .collect::<Vec<_>>()
    };

    let first = engine(4).run(tasks()).await;
    assert_eq!(first.summary.succeeded, 4);
    assert_eq!(hits.count.load(Ordering::SeqCst), 4);

    let second = engine(4).run(tasks()).await;
    assert_eq!(second.summary.skipped, 4);
    assert_eq!(hits.count.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_not_found_fails_once_and_leaves_nothing_behind() {
    let hits = Hits::default();
    let app = Router::new()
        .route(
            "/gone",
            get(|State(hits): State<Hits>| async move {
                hits.count.fetch_add(1, Ordering::SeqCst);
                StatusCode::NOT_FOUND
            }),
        )
        .with_state(hits.clone());
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let report = engine(1)
        .run(vec![FetchTask::get(
            format!("http://{addr}/gone"),
            dir.path().join("gone.zip"),
        )])
        .await;

    assert_eq!(report.tasks[0].outcome.failure(), Some(TaskFailure::NotFound));
    assert_eq!(report.tasks[0].attempts, 1);
    assert_eq!(hits.count.load(Ordering::SeqCst), 1);
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_transient_failures_exhaust_the_budget() {
    let hits = Hits::default();
    let app = Router::new()
        .route(
            "/down",
            get(|State(hits): State<Hits>| async move {
                hits.count.fetch_add(1, Ordering::SeqCst);
                StatusCode::SERVICE_UNAVAILABLE
            }),
        )
        .with_state(hits.clone());
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let report = engine(1)
        .run(vec![FetchTask::get(
            format!("http://{addr}/down"),
            dir.path().join("down.zip"),
        )])
        .await;

    assert_eq!(
        report.tasks[0].outcome.failure(),
        Some(TaskFailure::TransientFailureExceeded)
    );
    assert_eq!(report.tasks[0].attempts, 3);
    assert_eq!(hits.count.load(Ordering::SeqCst), 3);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let hits = Hits::default();
    let app = Router::new()
        .route(
            "/flaky",
            get(|State(hits): State<Hits>| async move {
                if hits.count.fetch_add(1, Ordering::SeqCst) < 2 {
                    StatusCode::BAD_GATEWAY.into_response()
                } else {
                    payload(1024).into_response()
                }
            }),
        )
        .with_state(hits.clone());
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let report = engine(1)
        .run(vec![FetchTask::get(
            format!("http://{addr}/flaky"),
            dir.path().join("flaky.zip"),
        )])
        .await;

    assert_eq!(report.tasks[0].outcome, TaskOutcome::Downloaded { bytes: 1024 });
    assert_eq!(report.tasks[0].attempts, 3);
}

#[tokio::test]
async fn test_hung_response_times_out_and_is_retried() {
    let hits = Hits::default();
    let app = Router::new()
        .route(
            "/slow",
            get(|State(hits): State<Hits>| async move {
                if hits.count.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                "late"
            }),
        )
        .with_state(hits.clone());
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let started = Instant::now();
    let report = engine(1)
        .with_retry_policy(RetryPolicy {
            request_timeout: Duration::from_millis(200),
            ..fast_policy()
        })
        .run(vec![FetchTask::get(
            format!("http://{addr}/slow"),
            dir.path().join("slow.zip"),
        )])
        .await;

    assert_eq!(report.tasks[0].outcome, TaskOutcome::Downloaded { bytes: 4 });
    assert_eq!(report.tasks[0].attempts, 2);
    assert_eq!(hits.count.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(std::fs::read(dir.path().join("slow.zip")).unwrap(), b"late");
}

/// Raw HTTP server announcing 100 bytes but closing after 5.
async fn serve_truncated(hits: Hits) -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            hits.count.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\nconnection: close\r\n\r\nshort")
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_short_body_is_retried_and_never_persisted() {
    let hits = Hits::default();
    let addr = serve_truncated(hits.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let report = engine(1)
        .run(vec![FetchTask::get(
            format!("http://{addr}/truncated"),
            dir.path().join("truncated.zip"),
        )])
        .await;

    assert_eq!(
        report.tasks[0].outcome.failure(),
        Some(TaskFailure::TransientFailureExceeded)
    );
    assert_eq!(report.tasks[0].attempts, 3);
    assert_eq!(hits.count.load(Ordering::SeqCst), 3);
    assert!(!dir.path().join("truncated.zip").exists());
    assert!(dir_entries(dir.path()).is_empty());
}

#[derive(Clone)]
struct RateLimitState {
    hits: Arc<AtomicUsize>,
    destination: PathBuf,
    file_seen_early: Arc<AtomicBool>,
}

#[tokio::test]
async fn test_rate_limit_waits_and_never_exposes_a_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("limited.zip");
    let state = RateLimitState {
        hits: Arc::new(AtomicUsize::new(0)),
        destination: destination.clone(),
        file_seen_early: Arc::new(AtomicBool::new(false)),
    };
    let app = Router::new()
        .route(
            "/limited",
            get(|State(state): State<RateLimitState>| async move {
                if state.destination.exists() {
                    state.file_seen_early.store(true, Ordering::SeqCst);
                }
                if state.hits.fetch_add(1, Ordering::SeqCst) < 2 {
                    StatusCode::TOO_MANY_REQUESTS.into_response()
                } else {
                    payload(BODY_LEN).into_response()
                }
            }),
        )
        .with_state(state.clone());
    let (addr, _server) = serve(app).await;

    let started = Instant::now();
    let report = engine(1)
        .run(vec![FetchTask::get(format!("http://{addr}/limited"), &destination)])
        .await;

    assert!(report.tasks[0].outcome.is_success());
    assert_eq!(report.tasks[0].attempts, 3);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(!state.file_seen_early.load(Ordering::SeqCst));
    assert_eq!(std::fs::read(&destination).unwrap(), payload(BODY_LEN));
}

#[tokio::test]
async fn test_rate_limit_budget_exhaustion() {
    let app = Router::new().route("/busy", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let report = engine(1)
        .run(vec![FetchTask::get(
            format!("http://{addr}/busy"),
            dir.path().join("busy.zip"),
        )])
        .await;

    assert_eq!(
        report.tasks[0].outcome.failure(),
        Some(TaskFailure::RateLimitExceeded)
    );
    assert_eq!(report.tasks[0].attempts, 3);
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_unauthorized_without_a_session_fails_authentication() {
    let app = Router::new().route("/private", get(|| async { StatusCode::UNAUTHORIZED }));
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let report = engine(1)
        .run(vec![FetchTask::get(
            format!("http://{addr}/private"),
            dir.path().join("private.zip"),
        )])
        .await;

    assert_eq!(
        report.tasks[0].outcome.failure(),
        Some(TaskFailure::AuthenticationFailed)
    );
    assert_eq!(report.tasks[0].attempts, 1);
}

#[derive(Clone, Default)]
struct Concurrency {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[tokio::test]
async fn test_worker_count_bounds_parallel_requests() {
    let state = Concurrency::default();
    let app = Router::new()
        .route(
            "/slow",
            get(|State(state): State<Concurrency>| async move {
                let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                state.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(40)).await;
                state.in_flight.fetch_sub(1, Ordering::SeqCst);
                payload(128)
            }),
        )
        .with_state(state.clone());
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let tasks = (0..8)
        .map(|i| FetchTask::get(format!("http://{addr}/slow"), dir.path().join(format!("{i}.bin"))))
        .collect();
    let report = engine(2).run(tasks).await;

    assert_eq!(report.summary.succeeded, 8);
    assert!(state.peak.load(Ordering::SeqCst) <= 2);
    assert!(state.peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_progress_events_cover_every_task() {
    let app = Router::new().route("/file", get(|| async { payload(BODY_LEN) }));
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("0.zip"), b"done").unwrap();

    let (sender, mut receiver) = ProgressSender::channel();
    let tasks = (0..3)
        .map(|i| FetchTask::get(format!("http://{addr}/file"), dir.path().join(format!("{i}.zip"))))
        .collect();
    let report = engine(3).with_progress(sender).run(tasks).await;
    assert!(report.is_success());

    let mut started = 0;
    let mut finished = 0;
    let mut last_advance = 0;
    while let Ok(event) = receiver.try_recv() {
        match event {
            ProgressEvent::Started { total_bytes, .. } => {
                started += 1;
                assert_eq!(total_bytes, Some(BODY_LEN as u64));
            }
            ProgressEvent::Advanced {
                bytes_downloaded, ..
            } => last_advance = last_advance.max(bytes_downloaded),
            ProgressEvent::Finished { .. } => finished += 1,
        }
    }
    assert_eq!(started, 2);
    assert_eq!(finished, 3);
    assert_eq!(last_advance, BODY_LEN as u64);
}

#[tokio::test]
async fn test_planned_era5_units_are_posted_and_stored() {
    async fn retrieve(Json(query): Json<serde_json::Value>) -> impl IntoResponse {
        if query["format"] != "netcdf" || query["variable"].as_array().map_or(true, |v| v.is_empty()) {
            return StatusCode::BAD_REQUEST.into_response();
        }
        let days = query["day"].as_array().map_or(0, |d| d.len());
        let hours = query["time"].as_array().map_or(0, |t| t.len());
        format!("{}-{} {days}x{hours}", query["year"], query["month"]).into_response()
    }

    let app = Router::new().route("/retrieve", post(retrieve));
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let range = TimeRange::new(
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2023, 1, 3, 5, 0, 0).unwrap(),
    )
    .unwrap();
    let plan = RequestPlanner::new(dir.path())
        .with_embargo(EmbargoPolicy::none())
        .plan(range, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        .unwrap();
    let request = Era5Request::new(format!("http://{addr}/retrieve"), vec![]);

    let report = engine(2).run(plan.to_fetch_tasks(&request)).await;
    assert_eq!(report.summary.succeeded, 2);

    assert_eq!(
        std::fs::read_to_string(dir.path().join("last_day_20230103T05.nc")).unwrap(),
        "\"2023\"-\"01\" 1x6"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("01_2023_d01-02_ssm.nc")).unwrap(),
        "\"2023\"-\"01\" 2x24"
    );
}
