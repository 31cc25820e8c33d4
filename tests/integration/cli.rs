//! Binary entry points

use std::collections::HashMap;
use std::process::Output;

use assert_cmd::Command;
use axum::extract::Query;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::common::{dir_entries, serve};

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("geodata-fetch").unwrap();
    cmd.env("RUST_LOG", "off");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_plan_prints_units_without_network() {
    let output = cli()
        .args([
            "plan",
            "--start",
            "2023-01-01T00:00:00Z",
            "--end",
            "2023-01-03T05:00:00Z",
            "--embargo-days",
            "0",
            "--now",
            "2024-01-01",
            "--out-dir",
            "/era5",
        ])
        .assert()
        .success()
        .get_output()
        .clone();

    let text = stdout(&output);
    assert!(text.contains("(54 hours, 2 units)"), "{text}");
    assert!(text.contains("/era5/last_day_20230103T05.nc"));
    assert!(text.contains("/era5/01_2023_d01-02_ssm.nc"));
}

#[test]
fn test_plan_json_reports_embargo_adjustment() {
    let output = cli()
        .args([
            "--output-format",
            "json",
            "plan",
            "--start",
            "2024-05-01",
            "--end",
            "2024-06-04T00:00:00Z",
            "--now",
            "2024-06-05",
        ])
        .assert()
        .success()
        .get_output()
        .clone();

    let plan: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(plan["adjustment"]["effective_end"], "2024-05-31T00:00:00Z");
    assert_eq!(plan["adjustment"]["window_days"], 5);
    assert_eq!(plan["units"][0]["period_key"], "2024-05-31");
}

#[test]
fn test_reversed_range_exits_with_failure() {
    cli()
        .args([
            "plan",
            "--start",
            "2023-02-01",
            "--end",
            "2023-01-01",
            "--embargo-days",
            "0",
        ])
        .assert()
        .code(1);
}

#[test]
fn test_out_of_range_worker_count_is_rejected() {
    cli()
        .args(["--workers", "0", "plan", "--start", "2023-01-01", "--end", "2023-01-02"])
        .assert()
        .failure();
}

#[test]
fn test_era5_requires_an_endpoint_in_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[credentials]\nusername = \"u\"\npassword = \"p\"\n").unwrap();

    cli()
        .arg("--config")
        .arg(&config)
        .args(["era5", "--start", "2023-01-01", "--end", "2023-01-02"])
        .arg("--out-dir")
        .arg(dir.path())
        .assert()
        .code(1);
}

async fn token() -> impl IntoResponse {
    Json(serde_json::json!({"access_token": "a", "refresh_token": "r"}))
}

async fn products(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    if !params.contains_key("$filter") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(serde_json::json!({
        "value": [
            {"Id": "p1", "Name": "S1A_IW_SLC__1SDV_ONE.SAFE"},
            {"Id": "missing", "Name": "S1A_IW_SLC__1SDV_TWO.SAFE"}
        ]
    }))
    .into_response()
}

async fn download(uri: Uri) -> impl IntoResponse {
    if uri.path() == "/dl/Products(p1)/$value" {
        "archive".into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_search_downloads_products_and_reports_failures() {
    let app = Router::new()
        .route("/token", post(token))
        .route("/Products", get(products))
        .fallback(download);
    let (addr, _server) = serve(app).await;

    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("slc");
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        format!(
            "[credentials]\nusername = \"u\"\npassword = \"p\"\n\n[service]\n\
             token_url = \"http://{addr}/token\"\n\
             catalog_url = \"http://{addr}/Products\"\n\
             download_url = \"http://{addr}/dl\"\n"
        ),
    )
    .unwrap();

    let mut cmd = cli();
    cmd.arg("--config")
        .arg(&config)
        .args(["--output-format", "json", "search"])
        .args(["--start", "2023-01-01", "--end", "2023-02-01"])
        .args(["--bbox", "40", "41.5", "-3", "-1"])
        .arg("--out-dir")
        .arg(&out_dir);
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let summary: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(summary["success"], false);
    assert_eq!(summary["report"]["summary"]["succeeded"], 1);
    assert_eq!(summary["report"]["summary"]["failed"]["not_found"], 1);
    assert_eq!(dir_entries(&out_dir), vec!["S1A_IW_SLC__1SDV_ONE.zip"]);
}
