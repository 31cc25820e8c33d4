//! OData product search against the Copernicus data space catalogue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::{CatalogError, CatalogPage, CatalogRecord, CatalogSearch};
use crate::area::BoundingBox;

/// Products collection of the public catalogue
pub const DEFAULT_CATALOG_URL: &str = "https://catalogue.dataspace.copernicus.eu/odata/v1/Products";

/// Base of `Products(<id>)/$value` download URLs
pub const DEFAULT_DOWNLOAD_URL: &str = "https://download.dataspace.copernicus.eu/odata/v1";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const ORDER_BY: &str = "ContentDate/Start";

/// Sentinel-1 SLC products acquired in `(start, end)` over `area`.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    /// Exclusive lower bound on acquisition start
    pub start: DateTime<Utc>,
    /// Exclusive upper bound on acquisition start
    pub end: DateTime<Utc>,
    /// Footprint that products must intersect
    pub area: BoundingBox,
    /// Collection name
    pub collection: String,
    /// Substring the product name must contain
    pub product_type: String,
}

impl CatalogQuery {
    /// SENTINEL-1 / SLC query.
    pub fn sentinel1_slc(start: DateTime<Utc>, end: DateTime<Utc>, area: BoundingBox) -> Self {
        Self {
            start,
            end,
            area,
            collection: "SENTINEL-1".to_string(),
            product_type: "SLC".to_string(),
        }
    }

    /// `$filter` expression
    pub fn filter(&self) -> String {
        format!(
            "ContentDate/Start gt {start} and ContentDate/Start lt {end} \
             and Collection/Name eq '{collection}' and contains(Name,'{product_type}') \
             and OData.CSC.Intersects(area=geography'SRID=4326;{polygon}')",
            start = self.start.format(TIMESTAMP_FORMAT),
            end = self.end.format(TIMESTAMP_FORMAT),
            collection = self.collection,
            product_type = self.product_type,
            polygon = self.area.to_wkt_polygon(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ODataResponse {
    #[serde(default)]
    value: Vec<ODataProduct>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ODataProduct {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

impl From<ODataResponse> for CatalogPage {
    fn from(response: ODataResponse) -> Self {
        Self {
            records: response
                .value
                .into_iter()
                .map(|p| CatalogRecord { id: p.id, name: p.name })
                .collect(),
            continuation_token: response.next_link.filter(|link| !link.is_empty()),
        }
    }
}

/// Catalogue client; the continuation token is the `@odata.nextLink` URL.
#[derive(Debug, Clone)]
pub struct ODataCatalog {
    client: Client,
    products_url: String,
    query: CatalogQuery,
}

impl ODataCatalog {
    /// Client searching `products_url`.
    pub fn new(client: Client, products_url: impl Into<String>, query: CatalogQuery) -> Self {
        Self {
            client,
            products_url: products_url.into(),
            query,
        }
    }

    /// First page URL with `$filter` and `$orderby`.
    pub fn first_page_url(&self) -> Result<Url, CatalogError> {
        Url::parse_with_params(
            &self.products_url,
            &[("$filter", self.query.filter().as_str()), ("$orderby", ORDER_BY)],
        )
        .map_err(|e| CatalogError::InvalidUrl(format!("{}: {e}", self.products_url)))
    }
}

#[async_trait]
impl CatalogSearch for ODataCatalog {
    async fn fetch_page(&self, token: Option<&str>) -> Result<CatalogPage, CatalogError> {
        let url = match token {
            Some(next) => {
                Url::parse(next).map_err(|e| CatalogError::InvalidUrl(format!("{next}: {e}")))?
            }
            None => self.first_page_url()?,
        };
        debug!(url = %url, "Querying catalog");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let page: ODataResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;
        Ok(page.into())
    }
}
