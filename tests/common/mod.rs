//! Shared helpers: in-process HTTP servers and fast retry settings

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use geodata_fetch::downloader::{http, FetchEngine, RetryPolicy};

/// Bind an ephemeral port; the address is known before the router is built.
pub async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Serve `app` on `listener` in the background.
pub fn spawn(listener: TcpListener, app: Router) -> JoinHandle<()> {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    })
}

/// Serve `app` on an ephemeral port.
pub async fn serve(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let (listener, addr) = bind().await;
    (addr, spawn(listener, app))
}

/// Millisecond-scale delays so retry tests finish quickly.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_transient_attempts: 3,
        max_rate_limit_attempts: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        rate_limit_wait: Duration::from_millis(50),
        request_timeout: Duration::from_secs(5),
    }
}

/// Engine with the fast policy and `workers` workers.
pub fn engine(workers: usize) -> FetchEngine {
    FetchEngine::new(http::build_client().unwrap())
        .with_workers(workers)
        .with_retry_policy(fast_policy())
}

/// Deterministic body of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// File names in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
