//! Path suffixes configured for auto-generated product and category paths.

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::quote_ident;
use crate::url_rewrite::model::EntityType;
use crate::{AppError, AppResult};

pub const DEFAULT_SUFFIX: &str = ".html";
pub const PRODUCT_SUFFIX_PATH: &str = "catalog/seo/product_url_suffix";
pub const CATEGORY_SUFFIX_PATH: &str = "catalog/seo/category_url_suffix";

/// Resolves suffixes from the legacy `core_config_data` table. A store-scoped
/// value wins over the default-scope value, which wins over `.html`.
#[derive(Debug, Clone)]
pub struct Suffix {
    config_table: String,
}

impl Suffix {
    /// `config_table` is the prefixed name of `core_config_data`.
    pub fn new(config_table: impl Into<String>) -> Self {
        Self {
            config_table: config_table.into(),
        }
    }

    pub fn config_path(entity_type: EntityType) -> Option<&'static str> {
        match entity_type {
            EntityType::Product => Some(PRODUCT_SUFFIX_PATH),
            EntityType::Category => Some(CATEGORY_SUFFIX_PATH),
            EntityType::CmsPage | EntityType::Custom => None,
        }
    }

    pub fn lookup(&self, conn: &Connection, entity_type: EntityType, store_id: i64) -> AppResult<String> {
        let Some(path) = Self::config_path(entity_type) else {
            return Ok(String::new());
        };
        let sql = format!(
            "SELECT value FROM {table}
             WHERE path = ?1
               AND ((scope = 'stores' AND scope_id = ?2) OR (scope = 'default' AND scope_id = 0))
             ORDER BY CASE scope WHEN 'stores' THEN 0 ELSE 1 END
             LIMIT 1",
            table = quote_ident(&self.config_table)
        );
        let value: Option<Option<String>> = conn
            .query_row(&sql, params![path, store_id], |row| row.get(0))
            .optional()
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "suffix_lookup")
                    .with_context("path", path)
            })?;
        Ok(match value {
            Some(Some(suffix)) => suffix,
            Some(None) => String::new(),
            None => DEFAULT_SUFFIX.to_string(),
        })
    }

    /// The same lookup as a scalar SQL expression, for use inside the
    /// set-based staging inserts. `store_expr` is the SQL expression holding
    /// the store id of the row being built.
    pub fn sql_expr(&self, entity_type: EntityType, store_expr: &str) -> String {
        let Some(path) = Self::config_path(entity_type) else {
            return "''".to_string();
        };
        let table = quote_ident(&self.config_table);
        format!(
            "COALESCE(\
               (SELECT IFNULL(cfg_s.value, '') FROM {table} cfg_s \
                 WHERE cfg_s.path = '{path}' AND cfg_s.scope = 'stores' AND cfg_s.scope_id = {store_expr}), \
               (SELECT IFNULL(cfg_d.value, '') FROM {table} cfg_d \
                 WHERE cfg_d.path = '{path}' AND cfg_d.scope = 'default' AND cfg_d.scope_id = 0), \
               '{DEFAULT_SUFFIX}')"
        )
    }
}
