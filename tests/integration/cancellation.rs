//! Shutdown while a transfer is streaming

use std::convert::Infallible;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, StreamExt};

use geodata_fetch::downloader::{FetchTask, ProgressEvent, ProgressSender, TaskFailure};
use geodata_fetch::shutdown::ShutdownCoordinator;

use crate::common::{dir_entries, engine, serve};

/// One chunk, then a body that never ends.
async fn stalled_body() -> Body {
    let first = stream::once(async { Ok::<_, Infallible>(Bytes::from(vec![7u8; 4096])) });
    Body::from_stream(first.chain(stream::pending()))
}

#[tokio::test]
async fn test_shutdown_aborts_in_flight_transfer_and_cancels_queue() {
    let app = Router::new().route("/stream", get(stalled_body));
    let (addr, _server) = serve(app).await;
    let dir = tempfile::tempdir().unwrap();

    let shutdown = ShutdownCoordinator::shared();
    let (sender, mut receiver) = ProgressSender::channel();
    let engine = engine(1)
        .with_shutdown(shutdown.clone())
        .with_progress(sender);

    let tasks = (0..3)
        .map(|i| FetchTask::get(format!("http://{addr}/stream"), dir.path().join(format!("{i}.zip"))))
        .collect();
    let run = tokio::spawn(async move { engine.run(tasks).await });

    // Wait until the first chunk has reached the part file.
    let advanced = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = receiver.recv().await {
            if matches!(event, ProgressEvent::Advanced { .. }) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(advanced);
    assert_eq!(dir_entries(dir.path()).len(), 1);

    shutdown.request_shutdown();
    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.tasks.len(), 3);
    assert_eq!(report.summary.failed.get(&TaskFailure::Cancelled), Some(&3));
    assert_eq!(report.tasks[0].attempts, 1);
    assert_eq!(report.tasks[1].attempts, 0);
    assert_eq!(report.tasks[2].attempts, 0);
    assert!(dir_entries(dir.path()).is_empty());
}
