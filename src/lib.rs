//! # geodata-fetch
//!
//! Bulk retrieval of Earth-observation data for soil-moisture research.
//!
//! ## Features
//!
//! - **Request planning**: long ERA5 time ranges are split into a partial-day
//!   unit plus one unit per month, with a trailing embargo on unpublished data
//! - **Catalog search**: Sentinel-1 SLC products from the Copernicus OData
//!   catalogue, following continuation links to the last page
//! - **Resilient downloads**: bounded worker pool, shared OAuth2 session with
//!   single-flight token refresh, 429 and transient-error budgets
//! - **Crash safety**: bodies stream into hidden part files that are synced and
//!   renamed into place, so an existing destination is always complete
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::{TimeZone, Utc};
//! use geodata_fetch::downloader::{http, FetchEngine};
//! use geodata_fetch::planner::{Era5Request, RequestPlanner, TimeRange};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let range = TimeRange::new(
//!     Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2023, 3, 31, 23, 0, 0).unwrap(),
//! )?;
//! let plan = RequestPlanner::new("./era5").plan_now(range)?;
//! let request = Era5Request::new("https://cds.example/api/retrieve", vec![]);
//!
//! let report = FetchEngine::new(http::build_client()?)
//!     .with_workers(4)
//!     .run(plan.to_fetch_tasks(&request))
//!     .await;
//! println!("{} downloaded", report.summary.succeeded);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`planner`] - ERA5 range decomposition and embargo handling
//! - [`catalog`] - paged product search and task generation
//! - [`soilgrids`] - SoilGrids topsoil coverages for an area
//! - [`auth`] - OAuth2 grants and the shared token session
//! - [`downloader`] - the fetch engine: workers, retries, atomic writes
//! - [`output`] - destination naming and run summaries
//! - [`config`] - credentials and endpoints from `~/.copernicus.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Bounding boxes and provider areas
pub mod area;

/// OAuth2 authentication
pub mod auth;

/// Catalog search
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Configuration file
pub mod config;

/// Fetch engine
pub mod downloader;

/// Prometheus metrics
pub mod metrics;

/// Output naming and summaries
pub mod output;

/// ERA5 request planning
pub mod planner;

/// Graceful shutdown coordination
pub mod shutdown;

/// SoilGrids coverage requests
pub mod soilgrids;

pub use area::{BoundingBox, CdsArea};
pub use auth::{AuthError, AuthSession};
pub use catalog::{CatalogRecord, CatalogSearch};
pub use config::Config;
pub use downloader::{BatchReport, FetchEngine, FetchTask, TaskFailure, TaskOutcome};
pub use planner::{Plan, RequestPlanner, RetrievalUnit, TimeRange};
