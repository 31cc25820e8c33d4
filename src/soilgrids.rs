//! ISRIC SoilGrids topsoil layers over WCS
//!
//! Each property is one `GetCoverage` request for the `0-5cm_mean` coverage
//! clipped to the area of interest, stored as
//! `<property>_0-5cm_mean_<res>.tif`. The requests are plain GET tasks for the
//! fetch engine, so existing layers are skipped on re-runs.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::area::BoundingBox;
use crate::downloader::FetchTask;
use crate::output::path::soil_layer_file_name;

/// ISRIC MapServer endpoint
pub const DEFAULT_SOILGRIDS_URL: &str = "https://maps.isric.org/mapserv";

/// Default output resolution passed as `RESX`/`RESY`
pub const DEFAULT_RESOLUTION: u32 = 250;

/// Depth interval and statistic of every layer
pub const LAYER_SUFFIX: &str = "0-5cm_mean";

const CRS_4326: &str = "http://www.opengis.net/def/crs/EPSG/0/4326";
const COVERAGE_FORMAT: &str = "GEOTIFF_INT16";

/// SoilGrids request errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SoilGridsError {
    /// Endpoint is not a valid URL
    #[error("invalid SoilGrids endpoint {url}: {reason}")]
    InvalidUrl {
        /// Configured endpoint
        url: String,
        /// Parser message
        reason: String,
    },
}

/// Soil properties with a published topsoil layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoilProperty {
    /// Sand fraction
    Sand,
    /// Clay fraction
    Clay,
}

impl SoilProperty {
    /// Both properties, in download order
    pub const ALL: [SoilProperty; 2] = [SoilProperty::Sand, SoilProperty::Clay];

    /// Map and coverage prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sand => "sand",
            Self::Clay => "clay",
        }
    }

    /// `<property>_0-5cm_mean`
    pub fn coverage_id(&self) -> String {
        format!("{}_{LAYER_SUFFIX}", self.as_str())
    }
}

impl fmt::Display for SoilProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoilProperty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sand" => Ok(Self::Sand),
            "clay" => Ok(Self::Clay),
            other => Err(format!("unknown soil property '{other}' (expected sand or clay)")),
        }
    }
}

/// Layers to fetch for one area.
#[derive(Debug, Clone, PartialEq)]
pub struct SoilGridsRequest {
    base_url: String,
    area: BoundingBox,
    resolution: u32,
    properties: Vec<SoilProperty>,
}

impl SoilGridsRequest {
    /// Sand and clay at the default resolution.
    pub fn new(base_url: impl Into<String>, area: BoundingBox) -> Self {
        Self {
            base_url: base_url.into(),
            area,
            resolution: DEFAULT_RESOLUTION,
            properties: SoilProperty::ALL.to_vec(),
        }
    }

    /// Override the output resolution.
    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    /// Restrict the properties; an empty list keeps both.
    pub fn with_properties(mut self, properties: Vec<SoilProperty>) -> Self {
        if !properties.is_empty() {
            let mut unique = Vec::with_capacity(properties.len());
            for property in properties {
                if !unique.contains(&property) {
                    unique.push(property);
                }
            }
            self.properties = unique;
        }
        self
    }

    /// `GetCoverage` URL for one property.
    pub fn coverage_url(&self, property: SoilProperty) -> Result<Url, SoilGridsError> {
        let map = format!("/map/{}.map", property.as_str());
        let coverage_id = property.coverage_id();
        let lat = format!("lat({},{})", self.area.south, self.area.north);
        let long = format!("long({},{})", self.area.west, self.area.east);
        let res = self.resolution.to_string();

        Url::parse_with_params(
            &self.base_url,
            &[
                ("map", map.as_str()),
                ("SERVICE", "WCS"),
                ("VERSION", "2.0.1"),
                ("REQUEST", "GetCoverage"),
                ("COVERAGEID", coverage_id.as_str()),
                ("FORMAT", COVERAGE_FORMAT),
                ("SUBSET", lat.as_str()),
                ("SUBSET", long.as_str()),
                ("SUBSETTINGCRS", CRS_4326),
                ("OUTPUTCRS", CRS_4326),
                ("RESX", res.as_str()),
                ("RESY", res.as_str()),
            ],
        )
        .map_err(|e| SoilGridsError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })
    }

    /// One GET task per property, written into `out_dir`.
    pub fn to_fetch_tasks(&self, out_dir: &Path) -> Result<Vec<FetchTask>, SoilGridsError> {
        self.properties
            .iter()
            .map(|&property| {
                Ok(FetchTask::get(
                    self.coverage_url(property)?.to_string(),
                    out_dir.join(soil_layer_file_name(property.as_str(), self.resolution)),
                ))
            })
            .collect()
    }
}
