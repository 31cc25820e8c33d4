//! OData catalogue paging and product download

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};

use geodata_fetch::area::BoundingBox;
use geodata_fetch::catalog::{
    collect_records, records_to_tasks, CatalogError, CatalogQuery, ODataCatalog,
};
use geodata_fetch::downloader::{http, TaskOutcome};

use crate::common::{bind, dir_entries, engine, spawn};

fn query() -> CatalogQuery {
    CatalogQuery::sentinel1_slc(
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap(),
        BoundingBox::new(40.0, 41.5, -3.0, -1.0).unwrap(),
    )
}

async fn products(
    State(addr): State<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if params.get("page").map(String::as_str) == Some("2") {
        return Json(serde_json::json!({
            "value": [{"Id": "id-3", "Name": "S1A_IW_SLC__1SDV_C.SAFE"}]
        }))
        .into_response();
    }

    let filter = params.get("$filter").cloned().unwrap_or_default();
    if !filter.contains("Collection/Name eq 'SENTINEL-1'")
        || !filter.contains("POLYGON((-3 41.5,-1 41.5,-1 40,-3 40,-3 41.5))")
        || params.get("$orderby").map(String::as_str) != Some("ContentDate/Start")
    {
        return (StatusCode::BAD_REQUEST, "unexpected query").into_response();
    }

    Json(serde_json::json!({
        "value": [
            {"Id": "id-1", "Name": "S1A_IW_SLC__1SDV_A.SAFE"},
            {"Id": "id-2", "Name": "S1B_IW_SLC__1SDV_B.SAFE"}
        ],
        "@odata.nextLink": format!("http://{addr}/odata/v1/Products?page=2")
    }))
    .into_response()
}

/// `/download/Products(<id>)/$value` returns the id as the archive body.
async fn download(uri: Uri) -> impl IntoResponse {
    let path = uri.path();
    match path
        .strip_prefix("/download/Products(")
        .and_then(|rest| rest.strip_suffix(")/$value"))
    {
        Some(id) => id.to_string().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start() -> SocketAddr {
    let (listener, addr) = bind().await;
    let app = Router::new()
        .route("/odata/v1/Products", get(products))
        .fallback(download)
        .with_state(addr);
    spawn(listener, app);
    addr
}

#[tokio::test]
async fn test_collects_every_page_in_order() {
    let addr = start().await;
    let catalog = ODataCatalog::new(
        http::build_client().unwrap(),
        format!("http://{addr}/odata/v1/Products"),
        query(),
    );

    let records = collect_records(&catalog).await.unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["id-1", "id-2", "id-3"]);
}

#[tokio::test]
async fn test_search_results_download_as_named_archives() {
    let addr = start().await;
    let dir = tempfile::tempdir().unwrap();
    let catalog = ODataCatalog::new(
        http::build_client().unwrap(),
        format!("http://{addr}/odata/v1/Products"),
        query(),
    );

    let records = collect_records(&catalog).await.unwrap();
    let tasks = records_to_tasks(&records, &format!("http://{addr}/download"), dir.path());
    let report = engine(2).run(tasks).await;

    assert_eq!(report.summary.succeeded, 3);
    assert!(report
        .tasks
        .iter()
        .all(|t| matches!(t.outcome, TaskOutcome::Downloaded { .. })));
    assert_eq!(
        dir_entries(dir.path()),
        vec![
            "S1A_IW_SLC__1SDV_A.zip",
            "S1A_IW_SLC__1SDV_C.zip",
            "S1B_IW_SLC__1SDV_B.zip"
        ]
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("S1B_IW_SLC__1SDV_B.zip")).unwrap(),
        "id-2"
    );
}

#[tokio::test]
async fn test_catalog_errors_surface_status() {
    let app = Router::new().route(
        "/Products",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
    );
    let (listener, addr) = bind().await;
    spawn(listener, app);

    let catalog = ODataCatalog::new(
        http::build_client().unwrap(),
        format!("http://{addr}/Products"),
        query(),
    );
    match collect_records(&catalog).await {
        Err(CatalogError::Status { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}
