//! CLI error types and conversions

use crate::area::AreaError;
use crate::auth::AuthError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::metrics::MetricsError;
use crate::planner::PlanError;
use crate::soilgrids::SoilGridsError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Planning error
    #[error("planning error: {0}")]
    Plan(#[from] PlanError),

    /// Bounding box error
    #[error("invalid area: {0}")]
    Area(#[from] AreaError),

    /// Initial authentication failed
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Catalog search failed
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// SoilGrids request could not be built
    #[error("soilgrids error: {0}")]
    SoilGrids(#[from] SoilGridsError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Metrics exporter could not be installed
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Output serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Batch finished but some tasks did not produce their file
    #[error("{failed} of {total} tasks failed")]
    TasksFailed {
        /// Failed tasks
        failed: usize,
        /// Tasks in the batch
        total: usize,
    },
}
