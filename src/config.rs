//! Credentials and service endpoints
//!
//! Read from a TOML file, by default `~/.copernicus.toml`:
//!
//! ```toml
//! [credentials]
//! username = "user@example.com"
//! password = "..."
//!
//! [service]            # optional, defaults to the public data space
//! token_url = "https://identity.dataspace.copernicus.eu/..."
//! client_id = "cdse-public"
//! catalog_url = "https://catalogue.dataspace.copernicus.eu/odata/v1/Products"
//! download_url = "https://download.dataspace.copernicus.eu/odata/v1"
//! era5_url = "https://cds.example/api/retrieve"
//! era5_api_key = "..."
//! soilgrids_url = "https://maps.isric.org/mapserv"
//! ```

use directories::BaseDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auth::{DEFAULT_CLIENT_ID, DEFAULT_TOKEN_URL};
use crate::catalog::odata::{DEFAULT_CATALOG_URL, DEFAULT_DOWNLOAD_URL};
use crate::soilgrids::DEFAULT_SOILGRIDS_URL;

/// File name looked up in the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".copernicus.toml";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Home directory could not be resolved
    #[error("unable to resolve home directory")]
    NoHomeDir,

    /// File missing or unreadable
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// A required value is absent or empty
    #[error("missing config value: {0}")]
    Missing(&'static str),
}

/// Account credentials for the password grant.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Account user name (e-mail)
    pub username: String,
    password: String,
}

impl Credentials {
    /// Credentials from explicit values.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Account password
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Service endpoints; every field falls back to the public data space.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// OAuth2 token endpoint
    pub token_url: String,
    /// OAuth2 client id
    pub client_id: String,
    /// OData products collection
    pub catalog_url: String,
    /// Base of `Products(<id>)/$value` download URLs
    pub download_url: String,
    /// ERA5 retrieval endpoint
    pub era5_url: Option<String>,
    /// Static key for the ERA5 endpoint, sent as a bearer token
    pub era5_api_key: Option<String>,
    /// SoilGrids WCS MapServer endpoint
    pub soilgrids_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            era5_url: None,
            era5_api_key: None,
            soilgrids_url: DEFAULT_SOILGRIDS_URL.to_string(),
        }
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("catalog_url", &self.catalog_url)
            .field("download_url", &self.download_url)
            .field("era5_url", &self.era5_url)
            .field("era5_api_key", &self.era5_api_key.as_ref().map(|_| "<redacted>"))
            .field("soilgrids_url", &self.soilgrids_url)
            .finish()
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Account credentials
    pub credentials: Option<Credentials>,
    /// Endpoints
    #[serde(default)]
    pub service: ServiceConfig,
}

impl Config {
    /// `~/.copernicus.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(DEFAULT_CONFIG_FILE))
            .ok_or(ConfigError::NoHomeDir)
    }

    /// Load from `path`, or from [`Config::default_path`] when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Like [`Config::load`], but a missing default file yields defaults.
    ///
    /// For commands needing no credentials. An explicit `path` must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if path.is_none() && !Self::default_path()?.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parse TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Credentials, required for catalog downloads.
    pub fn require_credentials(&self) -> Result<&Credentials, ConfigError> {
        match &self.credentials {
            Some(c) if !c.username.is_empty() && !c.password.is_empty() => Ok(c),
            Some(c) if c.username.is_empty() => Err(ConfigError::Missing("credentials.username")),
            Some(_) => Err(ConfigError::Missing("credentials.password")),
            None => Err(ConfigError::Missing("credentials")),
        }
    }

    /// ERA5 endpoint, required for ERA5 retrieval.
    pub fn require_era5_url(&self) -> Result<&str, ConfigError> {
        self.service
            .era5_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("service.era5_url"))
    }
}
