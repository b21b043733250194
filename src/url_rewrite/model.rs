use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::resource::Record;
use crate::{AppError, AppResult};

pub const PRIORITY_REDIRECT: i64 = 2;
pub const PRIORITY_CATEGORY: i64 = 3;
pub const PRIORITY_PRODUCT: i64 = 4;
pub const PRIORITY_CMS_PAGE: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    Product,
    Category,
    CmsPage,
    Custom,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Category => "category",
            EntityType::CmsPage => "cms-page",
            EntityType::Custom => "custom",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "product" => Ok(EntityType::Product),
            "category" => Ok(EntityType::Category),
            "cms-page" => Ok(EntityType::CmsPage),
            "custom" => Ok(EntityType::Custom),
            other => Err(AppError::new(
                "URL_REWRITE/UNKNOWN_ENTITY_TYPE",
                format!("Unknown entity type: {other}"),
            )),
        }
    }
}

/// Unified row produced by the staging passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRow {
    pub id: Option<i64>,
    pub request_path: String,
    pub target_path: String,
    pub is_system: bool,
    pub store_id: i64,
    pub entity_type: EntityType,
    pub redirect_type: i64,
    pub product_id: Option<i64>,
    pub category_id: Option<i64>,
    pub cms_page_id: Option<i64>,
    pub description: Option<String>,
    pub priority: i64,
}

/// Zero ids are treated like NULL, matching how the legacy tables mark "unset".
fn positive(record: &Record, column: &str) -> Option<i64> {
    record.int(column).filter(|value| *value > 0)
}

impl StagingRow {
    pub fn from_record(record: &Record) -> AppResult<Self> {
        let entity_type = record
            .text("entity_type")
            .ok_or_else(|| AppError::new("URL_REWRITE/MISSING_FIELD", "staging row has no entity_type"))?
            .parse::<EntityType>()?;
        Ok(Self {
            id: record.int("id"),
            request_path: record.text("request_path").unwrap_or_default(),
            target_path: record.text("target_path").unwrap_or_default(),
            is_system: record.int("is_system").unwrap_or(0) != 0,
            store_id: record.int("store_id").unwrap_or(0),
            entity_type,
            redirect_type: record.int("redirect_type").unwrap_or(0),
            product_id: positive(record, "product_id"),
            category_id: positive(record, "category_id"),
            cms_page_id: positive(record, "cms_page_id"),
            description: record.text("description"),
            priority: record.int("priority").unwrap_or(0),
        })
    }
}

/// Row written to the destination `url_rewrite` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRow {
    pub url_rewrite_id: Option<i64>,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub request_path: String,
    pub target_path: String,
    pub redirect_type: i64,
    pub store_id: i64,
    pub description: Option<String>,
    pub is_autogenerated: bool,
    pub metadata: String,
}

impl RewriteRow {
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("url_rewrite_id", self.url_rewrite_id)
            .with("entity_type", self.entity_type.as_str().to_string())
            .with("entity_id", self.entity_id)
            .with("request_path", self.request_path.clone())
            .with("target_path", self.target_path.clone())
            .with("redirect_type", self.redirect_type)
            .with("store_id", self.store_id)
            .with("description", self.description.clone())
            .with("is_autogenerated", i64::from(self.is_autogenerated))
            .with("metadata", self.metadata.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductCategoryRow {
    pub url_rewrite_id: Option<i64>,
    pub category_id: i64,
    pub product_id: i64,
}

impl ProductCategoryRow {
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("url_rewrite_id", self.url_rewrite_id)
            .with("category_id", self.category_id)
            .with("product_id", self.product_id)
    }
}

/// Key of the resolution record. Ordering groups every store of one entity
/// together, which the url-key propagation relies on for range lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolutionKey {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub store_id: i64,
}

impl ResolutionKey {
    pub fn new(entity_type: EntityType, entity_id: i64, store_id: i64) -> Self {
        Self {
            entity_type,
            entity_id,
            store_id,
        }
    }
}
