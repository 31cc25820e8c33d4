//! Destination file naming
//!
//! Every destination is a pure function of the thing it stores: a catalog
//! product name or an ERA5 period. Re-running a batch therefore targets the
//! same paths, which is what skip-if-exists relies on.
//!
//! ```rust
//! use chrono::NaiveDate;
//! use geodata_fetch::output::path::{
//!     month_file_name, month_slice_file_name, partial_day_file_name, product_file_name,
//! };
//!
//! assert_eq!(
//!     product_file_name("S1A_IW_SLC__1SDV_20230101T000000_0001.SAFE"),
//!     "S1A_IW_SLC__1SDV_20230101T000000_0001.zip"
//! );
//! let day = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
//! assert_eq!(partial_day_file_name(day, 5), "last_day_20230103T05.nc");
//! assert_eq!(month_file_name(2023, 1), "01_2023_ssm.nc");
//! assert_eq!(month_slice_file_name(2023, 1, 1..=19, 0..=23), "01_2023_d01-19_ssm.nc");
//! ```

use chrono::NaiveDate;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Archive extension of catalog products
pub const PRODUCT_EXTENSION: &str = "zip";

/// Suffix of Sentinel product directory names
const SAFE_SUFFIX: &str = ".SAFE";

/// File name for a catalog product: `.SAFE` stripped, `.zip` appended.
pub fn product_file_name(product_name: &str) -> String {
    let stem = product_name
        .strip_suffix(SAFE_SUFFIX)
        .unwrap_or(product_name);
    format!("{}.{PRODUCT_EXTENSION}", sanitize_component(stem))
}

/// File name for a product whose plain name is already taken by another id.
pub fn disambiguated_product_file_name(product_name: &str, id: &str) -> String {
    let stem = product_name
        .strip_suffix(SAFE_SUFFIX)
        .unwrap_or(product_name);
    format!(
        "{}_{}.{PRODUCT_EXTENSION}",
        sanitize_component(stem),
        sanitize_component(id)
    )
}

/// Destination path of a catalog product under `out_dir`.
pub fn product_path(out_dir: &Path, product_name: &str) -> PathBuf {
    out_dir.join(product_file_name(product_name))
}

/// File name of the partial last-day unit: `last_day_YYYYMMDDTHH.nc`.
pub fn partial_day_file_name(day: NaiveDate, last_hour: u32) -> String {
    format!("last_day_{}T{last_hour:02}.nc", day.format("%Y%m%d"))
}

/// File name of a month unit covering the whole calendar month: `MM_YYYY_ssm.nc`.
pub fn month_file_name(year: i32, month: u32) -> String {
    format!("{month:02}_{year:04}_ssm.nc")
}

/// File name of a month unit covering only part of the month.
///
/// The covered days, and the hours when they are not `0..=23`, are part of
/// the name: a later run covering more of the month must not find a
/// narrower file at its destination and skip it.
pub fn month_slice_file_name(
    year: i32,
    month: u32,
    days: RangeInclusive<u32>,
    hours: RangeInclusive<u32>,
) -> String {
    format!("{month:02}_{year:04}_{}_ssm.nc", slice_tag(days, hours))
}

/// `dDD-DD`, with `_hHH-HH` appended for a partial set of hours.
pub fn slice_tag(days: RangeInclusive<u32>, hours: RangeInclusive<u32>) -> String {
    let mut tag = format!("d{:02}-{:02}", days.start(), days.end());
    if hours != (0..=23) {
        tag.push_str(&format!("_h{:02}-{:02}", hours.start(), hours.end()));
    }
    tag
}

/// File name of a SoilGrids layer: `<property>_0-5cm_mean_<res>.tif`.
pub fn soil_layer_file_name(property: &str, resolution: u32) -> String {
    format!("{}_0-5cm_mean_{resolution}.tif", sanitize_component(property))
}

/// Make a remote name safe to use as a single path component.
///
/// Path separators and `:` become `_`, and `..` becomes `__` so a hostile
/// name cannot escape the output directory.
pub fn sanitize_component(name: &str) -> String {
    name.replace("..", "__").replace(['/', '\\', ':'], "_")
}

/// Sibling temporary path used while `destination` is being written.
pub fn part_file_prefix(destination: &Path) -> String {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    format!(".{name}.")
}
