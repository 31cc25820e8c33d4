//! Catalog search and record collection
//!
//! The search service is a collaborator behind [`CatalogSearch`]: it returns
//! pages of opaque `{id, name}` records plus an optional continuation token.
//! [`collect_records`] follows tokens until the last page so the complete
//! product list is known before any download starts, and
//! [`records_to_tasks`] turns that list into fetch tasks.

pub mod odata;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::downloader::FetchTask;
use crate::output::path::{disambiguated_product_file_name, product_path};

pub use odata::{CatalogQuery, ODataCatalog};

/// Upper bound on pages followed for one search
const MAX_PAGES: usize = 10_000;

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status from the catalog
    #[error("catalog returned {status}: {message}")]
    Status {
        /// HTTP status
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Response body is not a catalog page
    #[error("invalid catalog response: {0}")]
    Parse(String),

    /// Query could not be turned into a URL
    #[error("invalid catalog URL: {0}")]
    InvalidUrl(String),

    /// The service returned a token already followed
    #[error("continuation token repeated: {0}")]
    RepeatedToken(String),

    /// Page limit hit
    #[error("more than {0} catalog pages, aborting search")]
    TooManyPages(usize),
}

/// One product returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Opaque product id
    pub id: String,
    /// Product name, e.g. `S1A_IW_SLC__1SDV_....SAFE`
    pub name: String,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogPage {
    /// Records in provider order
    pub records: Vec<CatalogRecord>,
    /// Token for the next page; `None` on the last page
    pub continuation_token: Option<String>,
}

/// Paged product search.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Fetch the first page (`None`) or the page behind `token`.
    async fn fetch_page(&self, token: Option<&str>) -> Result<CatalogPage, CatalogError>;
}

/// Follow continuation tokens and concatenate every page in order.
pub async fn collect_records(search: &dyn CatalogSearch) -> Result<Vec<CatalogRecord>, CatalogError> {
    let mut records = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut token: Option<String> = None;

    for page_number in 1..=MAX_PAGES {
        let page = search.fetch_page(token.as_deref()).await?;
        debug!(
            page = page_number,
            records = page.records.len(),
            has_next = page.continuation_token.is_some(),
            "Received catalog page"
        );
        records.extend(page.records);

        match page.continuation_token {
            Some(next) => {
                if !seen_tokens.insert(next.clone()) {
                    return Err(CatalogError::RepeatedToken(next));
                }
                token = Some(next);
            }
            None => {
                info!(pages = page_number, records = records.len(), "Catalog search complete");
                return Ok(records);
            }
        }
    }

    Err(CatalogError::TooManyPages(MAX_PAGES))
}

/// `<download_base>/Products(<id>)/$value`
pub fn download_url(download_base: &str, id: &str) -> String {
    format!("{}/Products({id})/$value", download_base.trim_end_matches('/'))
}

/// One GET task per record, stored as `<name without .SAFE>.zip` in `out_dir`.
///
/// Records repeating an id are dropped. When two ids sanitize to the same
/// file name, the later one is stored as `<name>_<id>.zip` so skip-if-exists
/// never mistakes one product for another.
pub fn records_to_tasks(
    records: &[CatalogRecord],
    download_base: &str,
    out_dir: &Path,
) -> Vec<FetchTask> {
    let mut taken = HashSet::new();
    let mut seen_ids = HashSet::new();
    let mut tasks = Vec::with_capacity(records.len());

    for record in records {
        if !seen_ids.insert(record.id.as_str()) {
            debug!(id = %record.id, "Duplicate catalog record dropped");
            continue;
        }
        let mut destination = product_path(out_dir, &record.name);
        if taken.contains(&destination) {
            destination = out_dir.join(disambiguated_product_file_name(&record.name, &record.id));
            warn!(
                id = %record.id,
                name = %record.name,
                destination = %destination.display(),
                "Product file name already taken, appending id"
            );
        }
        taken.insert(destination.clone());
        tasks.push(FetchTask::get(download_url(download_base, &record.id), destination));
    }
    tasks
}
