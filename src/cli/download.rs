//! Command-line arguments and the `search` / `era5` / `soilgrids` commands

use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::progress::spawn_progress_display;
use super::CliError;
use crate::area::{BoundingBox, CdsArea};
use crate::auth::{AuthSession, OAuthClient, TokenPair, TokenProvider};
use crate::catalog::{collect_records, records_to_tasks, CatalogQuery, ODataCatalog};
use crate::config::Config;
use crate::downloader::config::{DEFAULT_WORKERS, MAX_WORKERS};
use crate::downloader::{http, BatchReport, FetchEngine, FetchTask, ProgressSender, RateLimiter};
use crate::output::{render_human, render_json, OutputFormat, RunSummary};
use crate::planner::{
    parse_timestamp, EmbargoPolicy, Era5Request, Plan, RangeBoundary, RequestPlanner, TimeRange,
    DEFAULT_EMBARGO_DAYS,
};
use crate::shutdown::SharedShutdown;
use crate::soilgrids::{SoilGridsRequest, SoilProperty, DEFAULT_RESOLUTION};

/// Parse and validate the worker count
fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!("workers {value} exceeds maximum of {MAX_WORKERS}"));
    }
    Ok(value)
}

/// Bulk Earth-observation data retrieval
#[derive(Parser, Debug)]
#[command(name = "geodata-fetch")]
#[command(
    about = "Download Sentinel-1 products and ERA5 reanalysis data",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.copernicus.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of concurrent downloads (default: 4, max: 32)
    #[arg(long, global = true, default_value_t = DEFAULT_WORKERS, value_parser = parse_workers)]
    pub workers: usize,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Cap request starts per minute across all workers
    #[arg(long, global = true)]
    pub requests_per_minute: Option<usize>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the catalogue for Sentinel-1 SLC products and download them
    Search(SearchArgs),

    /// Plan and download ERA5 hourly data
    Era5(Era5Args),

    /// Print the ERA5 retrieval plan without downloading
    Plan(Era5Args),

    /// Download SoilGrids topsoil sand and clay layers
    Soilgrids(SoilGridsArgs),
}

/// Arguments of `search`
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Acquisitions starting after this time (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub start: String,

    /// Acquisitions starting before this time; a date means its midnight
    #[arg(long)]
    pub end: String,

    /// Area of interest in degrees
    #[arg(
        long,
        num_args = 4,
        value_names = ["SOUTH", "NORTH", "WEST", "EAST"],
        allow_negative_numbers = true,
        required = true
    )]
    pub bbox: Vec<f64>,

    /// Directory receiving the product archives
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

/// Arguments of `era5` and `plan`
#[derive(Args, Debug)]
pub struct Era5Args {
    /// First hour to retrieve (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    pub start: String,

    /// Last hour to retrieve; a date means 23:00 of that day
    #[arg(long)]
    pub end: String,

    /// Area of interest in degrees; whole globe when omitted
    #[arg(
        long,
        num_args = 4,
        value_names = ["SOUTH", "NORTH", "WEST", "EAST"],
        allow_negative_numbers = true
    )]
    pub bbox: Option<Vec<f64>>,

    /// Variable to retrieve, repeatable (default: precipitation, skin
    /// temperature and top-layer soil water)
    #[arg(long = "variable")]
    pub variables: Vec<String>,

    /// Directory receiving the NetCDF files
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Days of unpublished data before now
    #[arg(long, default_value_t = DEFAULT_EMBARGO_DAYS)]
    pub embargo_days: i64,

    /// Plan as if the current time were this (YYYY-MM-DD or RFC3339)
    #[arg(long, hide = true)]
    pub now: Option<String>,
}

/// Arguments of `soilgrids`
#[derive(Args, Debug)]
pub struct SoilGridsArgs {
    /// Area of interest in degrees
    #[arg(
        long,
        num_args = 4,
        value_names = ["SOUTH", "NORTH", "WEST", "EAST"],
        allow_negative_numbers = true,
        required = true
    )]
    pub bbox: Vec<f64>,

    /// Output resolution passed to the coverage service
    #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
    pub res: u32,

    /// Property to retrieve, repeatable (default: sand and clay)
    #[arg(long = "property")]
    pub properties: Vec<SoilProperty>,

    /// Directory receiving the GeoTIFF layers
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

impl SearchArgs {
    /// Search the catalogue, then download every product found.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let start = parse_timestamp(&self.start, RangeBoundary::Start)?;
        let end = parse_timestamp(&self.end, RangeBoundary::Start)?;
        if start >= end {
            return Err(CliError::InvalidArgument(format!(
                "--start {} must be before --end {}",
                self.start, self.end
            )));
        }
        let area = BoundingBox::from_slice(&self.bbox)?;

        let config = Config::load(cli.config.as_deref())?;
        let credentials = config.require_credentials()?;
        let client = http::build_client()?;

        let provider: Arc<dyn TokenProvider> = Arc::new(OAuthClient::new(
            client.clone(),
            config.service.token_url.as_str(),
            config.service.client_id.as_str(),
        ));
        let session = Arc::new(AuthSession::establish(provider, credentials).await?);

        let catalog = ODataCatalog::new(
            client.clone(),
            config.service.catalog_url.as_str(),
            CatalogQuery::sentinel1_slc(start, end, area),
        );
        let records = collect_records(&catalog).await?;
        info!(products = records.len(), area = %area, "Catalog search finished");

        let tasks = records_to_tasks(&records, &config.service.download_url, &self.out_dir);
        let engine = build_engine(cli, client, shutdown).with_auth(session);
        let report = run_batch(engine, tasks, cli.output_format).await;

        finish(cli, "search", &self.out_dir, None, &report)
    }
}

impl Era5Args {
    fn plan(&self) -> Result<Plan, CliError> {
        let range = TimeRange::new(
            parse_timestamp(&self.start, RangeBoundary::Start)?,
            parse_timestamp(&self.end, RangeBoundary::End)?,
        )?;
        let planner = RequestPlanner::new(&self.out_dir)
            .with_embargo(EmbargoPolicy::days(self.embargo_days));
        let plan = match &self.now {
            Some(now) => planner.plan(range, parse_timestamp(now, RangeBoundary::Start)?)?,
            None => planner.plan_now(range)?,
        };
        Ok(plan)
    }

    fn area(&self) -> Result<Option<CdsArea>, CliError> {
        self.bbox
            .as_deref()
            .map(|values| {
                BoundingBox::from_slice(values)
                    .map(|bbox| CdsArea::from_bbox(&bbox))
                    .map_err(CliError::from)
            })
            .transpose()
    }

    /// Plan the range and download every unit not yet on disk.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = Config::load(cli.config.as_deref())?;
        let endpoint = config.require_era5_url()?;

        let plan = self.plan()?;
        let mut request = Era5Request::new(endpoint, self.variables.clone());
        if let Some(area) = self.area()? {
            request = request.with_area(area);
        }
        let tasks = plan.to_fetch_tasks(&request);

        let client = http::build_client()?;
        let mut engine = build_engine(cli, client.clone(), shutdown);
        if let Some(key) = config.service.era5_api_key.as_deref() {
            let provider: Arc<dyn TokenProvider> = Arc::new(OAuthClient::new(
                client,
                config.service.token_url.as_str(),
                config.service.client_id.as_str(),
            ));
            engine = engine.with_auth(Arc::new(AuthSession::from_tokens(
                provider,
                TokenPair::access_only(key),
            )));
        }

        let report = run_batch(engine, tasks, cli.output_format).await;
        finish(cli, "era5", &self.out_dir, plan.adjustment, &report)
    }

    /// Print the plan without touching the network.
    pub fn execute_plan(&self, cli: &Cli) -> Result<(), CliError> {
        let plan = self.plan()?;
        match cli.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&plan)?),
            OutputFormat::Human => print!("{}", super::plan::render_plan(&plan)),
        }
        Ok(())
    }
}

impl SoilGridsArgs {
    /// Download one coverage per property; no credentials needed.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let area = BoundingBox::from_slice(&self.bbox)?;
        if self.res == 0 {
            return Err(CliError::InvalidArgument("--res must be positive".to_string()));
        }
        let config = Config::load_or_default(cli.config.as_deref())?;

        let tasks = SoilGridsRequest::new(config.service.soilgrids_url.as_str(), area)
            .with_resolution(self.res)
            .with_properties(self.properties.clone())
            .to_fetch_tasks(&self.out_dir)?;
        info!(layers = tasks.len(), area = %area, res = self.res, "SoilGrids layers planned");

        let engine = build_engine(cli, http::build_client()?, shutdown);
        let report = run_batch(engine, tasks, cli.output_format).await;
        finish(cli, "soilgrids", &self.out_dir, None, &report)
    }
}

fn build_engine(cli: &Cli, client: Client, shutdown: SharedShutdown) -> FetchEngine {
    let engine = FetchEngine::new(client)
        .with_workers(cli.workers)
        .with_shutdown(shutdown);
    match cli.requests_per_minute {
        Some(limit) => engine.with_rate_limiter(RateLimiter::per_minute(limit)),
        None => engine,
    }
}

/// Run `tasks` with progress bars; bars are hidden for JSON output.
async fn run_batch(engine: FetchEngine, tasks: Vec<FetchTask>, format: OutputFormat) -> BatchReport {
    let (sender, receiver) = ProgressSender::channel();
    let display = spawn_progress_display(receiver, tasks.len(), format == OutputFormat::Human);

    // The display stops once the engine and its workers drop their senders.
    let report = engine.with_progress(sender).run(tasks).await;

    if let Err(e) = display.await {
        warn!(error = %e, "Progress display task failed");
    }
    report
}

fn finish(
    cli: &Cli,
    command: &str,
    output_dir: &Path,
    adjustment: Option<crate::planner::EmbargoAdjustment>,
    report: &BatchReport,
) -> Result<(), CliError> {
    let run = RunSummary {
        command,
        output_dir,
        adjustment,
        report,
    };
    match cli.output_format {
        OutputFormat::Json => println!("{}", render_json(&run)?),
        OutputFormat::Human => {
            print!("{}", render_human(&run));
            for failure in report.failures() {
                error!(
                    destination = %failure.destination_path.display(),
                    attempts = failure.attempts,
                    outcome = ?failure.outcome,
                    "Task failed"
                );
            }
        }
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::TasksFailed {
            failed: report.summary.failed_total(),
            total: report.summary.total(),
        })
    }
}
