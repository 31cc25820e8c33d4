//! Areas of interest
//!
//! A [`BoundingBox`] is parsed from the CLI in `South North West East` order.
//! The catalog filter wants a closed WKT polygon, while ERA5 retrievals want a
//! [`CdsArea`] snapped outward to the 0.1 degree grid.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// ERA5-Land grid spacing in degrees
const GRID_RESOLUTION: f64 = 0.1;

/// Area validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AreaError {
    /// Wrong number of coordinates
    #[error("expected 4 coordinates (south north west east), got {0}")]
    WrongArity(usize),

    /// Coordinate is not a number
    #[error("invalid coordinate '{0}'")]
    NotANumber(String),

    /// Latitude outside [-90, 90]
    #[error("latitude {0} out of range")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180]
    #[error("longitude {0} out of range")]
    LongitudeOutOfRange(f64),

    /// South above north or west beyond east
    #[error("degenerate bounding box: {0}")]
    Inverted(String),
}

/// Geographic bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum latitude
    pub south: f64,
    /// Maximum latitude
    pub north: f64,
    /// Minimum longitude
    pub west: f64,
    /// Maximum longitude
    pub east: f64,
}

impl BoundingBox {
    /// Build and validate a bounding box.
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Result<Self, AreaError> {
        for lat in [south, north] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(AreaError::LatitudeOutOfRange(lat));
            }
        }
        for lon in [west, east] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(AreaError::LongitudeOutOfRange(lon));
            }
        }
        if south > north {
            return Err(AreaError::Inverted(format!("south {south} > north {north}")));
        }
        if west > east {
            return Err(AreaError::Inverted(format!("west {west} > east {east}")));
        }
        Ok(Self {
            south,
            north,
            west,
            east,
        })
    }

    /// Build from `[south, north, west, east]`.
    pub fn from_slice(values: &[f64]) -> Result<Self, AreaError> {
        match values {
            [south, north, west, east] => Self::new(*south, *north, *west, *east),
            other => Err(AreaError::WrongArity(other.len())),
        }
    }

    /// Closed polygon ring as WKT, starting at the north-west corner.
    pub fn to_wkt_polygon(&self) -> String {
        let Self {
            south,
            north,
            west,
            east,
        } = self;
        format!(
            "POLYGON(({west} {north},{east} {north},{east} {south},{west} {south},{west} {north}))"
        )
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {}", self.south, self.north, self.west, self.east)
    }
}

impl FromStr for BoundingBox {
    type Err = AreaError;

    /// Parse `"S N W E"`, separated by whitespace or commas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>()
                    .map_err(|_| AreaError::NotANumber(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_slice(&values)
    }
}

/// Provider area `[north, west, south, east]`, padded to the ERA5 grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CdsArea {
    /// Northern edge
    pub north: f64,
    /// Western edge
    pub west: f64,
    /// Southern edge
    pub south: f64,
    /// Eastern edge
    pub east: f64,
}

impl CdsArea {
    /// Snap `bbox` outward to the grid and add half a cell on every side so
    /// boundary pixels are fully included.
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        let half = GRID_RESOLUTION;
        Self {
            north: round3((bbox.north * 10.0).ceil() / 10.0 + half),
            west: round3((bbox.west * 10.0).floor() / 10.0 - half),
            south: round3((bbox.south * 10.0).floor() / 10.0 - half),
            east: round3((bbox.east * 10.0).ceil() / 10.0 + half),
        }
    }

    /// Provider ordering
    pub fn as_array(&self) -> [f64; 4] {
        [self.north, self.west, self.south, self.east]
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
