use serde::Serialize;

use crate::resource::{Destination, Source};
use crate::url_rewrite::staging::STAGING_TABLE;
use crate::AppResult;

pub const REWRITE_TABLE: &str = "url_rewrite";
pub const PRODUCT_CATEGORY_TABLE: &str = "catalog_url_rewrite_product_category";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeReport {
    pub staging_rows: u64,
    pub destination_rows: u64,
}

impl VolumeReport {
    pub fn passed(&self) -> bool {
        self.staging_rows == self.destination_rows
    }
}

pub fn check_volume(source: &Source, destination: &Destination) -> AppResult<VolumeReport> {
    Ok(VolumeReport {
        staging_rows: source.get_records_count(STAGING_TABLE)?,
        destination_rows: destination.get_records_count(REWRITE_TABLE)?,
    })
}
