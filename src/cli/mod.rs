//! CLI command implementations

pub mod download;
pub mod error;
pub mod plan;
pub mod progress;

pub use download::{Cli, Commands, Era5Args, SearchArgs, SoilGridsArgs};
pub use error::CliError;
