//! Retrieval units and their provider query descriptors

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::area::CdsArea;
use crate::downloader::FetchTask;

/// Variables requested by the soil-moisture workflow when none are given.
pub const DEFAULT_ERA5_VARIABLES: [&str; 3] = [
    "total_precipitation",
    "skin_temperature",
    "volumetric_soil_water_layer_1",
];

/// Shape of a retrieval unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Last covered calendar day, possibly incomplete
    PartialDay,
    /// Slice of one calendar month
    Month,
}

/// One bounded sub-request produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalUnit {
    /// `YYYY-MM-DD` for the partial day, `YYYY-MM` for months
    pub period_key: String,
    /// Unit shape
    pub kind: UnitKind,
    /// Calendar year
    pub year: i32,
    /// Calendar month (1-12)
    pub month: u32,
    /// Days of month requested
    pub days: BTreeSet<u32>,
    /// Hours of day requested
    pub hours: BTreeSet<u32>,
    /// Where the retrieved file is stored
    pub destination_path: PathBuf,
}

impl RetrievalUnit {
    /// Number of hourly slots the provider returns for this unit
    /// (every requested day at every requested hour).
    pub fn slot_count(&self) -> usize {
        self.days.len() * self.hours.len()
    }

    /// Timestamps served for this unit, in chronological order.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.days
            .iter()
            .flat_map(|&day| {
                self.hours.iter().filter_map(move |&hour| {
                    Utc.with_ymd_and_hms(self.year, self.month, day, hour, 0, 0)
                        .single()
                })
            })
            .collect()
    }

    /// Provider query descriptor for this unit.
    pub fn query_body(&self, request: &Era5Request) -> serde_json::Value {
        let mut body = json!({
            "product_type": request.product_type,
            "variable": request.variables,
            "year": format!("{:04}", self.year),
            "month": format!("{:02}", self.month),
            "day": self.days.iter().map(|d| format!("{d:02}")).collect::<Vec<_>>(),
            "time": self.hours.iter().map(|h| format!("{h:02}:00")).collect::<Vec<_>>(),
            "format": request.format,
        });
        if let Some(area) = &request.area {
            body["area"] = json!(area.as_array());
        }
        body
    }

    /// Fetch task posting this unit's query to the retrieval endpoint.
    pub fn to_fetch_task(&self, request: &Era5Request) -> FetchTask {
        FetchTask::query(
            request.endpoint.clone(),
            self.query_body(request),
            self.destination_path.clone(),
        )
    }
}

/// Fields of interest shared by every unit of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Era5Request {
    /// Retrieval endpoint accepting the JSON query descriptor
    pub endpoint: String,
    /// Provider product type
    pub product_type: String,
    /// Variables to retrieve
    pub variables: Vec<String>,
    /// Padded area of interest; whole globe when absent
    pub area: Option<CdsArea>,
    /// Output file format
    pub format: String,
}

impl Era5Request {
    /// Hourly reanalysis request in NetCDF.
    pub fn new(endpoint: impl Into<String>, variables: Vec<String>) -> Self {
        let variables = if variables.is_empty() {
            DEFAULT_ERA5_VARIABLES.iter().map(|v| v.to_string()).collect()
        } else {
            variables
        };
        Self {
            endpoint: endpoint.into(),
            product_type: "reanalysis".to_string(),
            variables,
            area: None,
            format: "netcdf".to_string(),
        }
    }

    /// Restrict the request to an area.
    pub fn with_area(mut self, area: CdsArea) -> Self {
        self.area = Some(area);
        self
    }
}
