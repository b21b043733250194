//! Set-based construction of the staging table.
//!
//! Each pass is a single `INSERT INTO … SELECT …` executed inside the source
//! database. Rows are never pulled into process memory here.

use serde::Serialize;
use tracing::info;

use crate::db::{quote_ident, table_exists};
use crate::resource::Source;
use crate::url_rewrite::model::{
    EntityType, PRIORITY_CATEGORY, PRIORITY_CMS_PAGE, PRIORITY_PRODUCT, PRIORITY_REDIRECT,
};
use crate::url_rewrite::suffix::Suffix;
use crate::AppResult;

pub const STAGING_TABLE: &str = "url_rewrite_staging";

const STAGING_COLUMNS: &str = "request_path, target_path, is_system, store_id, entity_type, \
     redirect_type, product_id, category_id, cms_page_id, description, priority";

/// Legacy tables read by the collection passes, without prefix.
pub const COLLECTED_TABLES: &[&str] = &[
    "enterprise_url_rewrite",
    "enterprise_url_rewrite_redirect",
    "enterprise_url_rewrite_redirect_rewrite",
    "enterprise_catalog_product_rewrite",
    "enterprise_catalog_category_rewrite",
    "catalog_category_entity",
    "catalog_category_entity_url_key",
    "catalog_category_product",
    "cms_page",
    "cms_page_store",
    "core_store",
    "core_config_data",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StagingReport {
    pub redirects: usize,
    pub products: usize,
    pub categories: usize,
    pub cms_pages: usize,
}

impl StagingReport {
    pub fn total(&self) -> usize {
        self.redirects + self.products + self.categories + self.cms_pages
    }
}

pub struct StagingCollector<'a> {
    source: &'a Source,
    suffix: Suffix,
}

impl<'a> StagingCollector<'a> {
    pub fn new(source: &'a Source) -> Self {
        Self {
            suffix: Suffix::new(source.table("core_config_data")),
            source,
        }
    }

    /// Collected tables absent from the source, in `COLLECTED_TABLES` order.
    pub fn missing_tables(&self) -> AppResult<Vec<&'static str>> {
        let mut missing = Vec::new();
        for table in COLLECTED_TABLES {
            if !table_exists(self.source.connection(), &self.source.table(table))? {
                missing.push(*table);
            }
        }
        Ok(missing)
    }

    /// Recreate the staging table and run every pass. Not transactional: a
    /// failing pass leaves the rows of earlier passes behind, and the next
    /// collection starts by dropping the table.
    pub fn collect(&self) -> AppResult<StagingReport> {
        self.create_table()?;
        let report = StagingReport {
            redirects: self.collect_redirects()?,
            products: self.collect_product_rewrites()?,
            categories: self.collect_category_rewrites()?,
            cms_pages: self.collect_cms_page_rewrites()?,
        };
        info!(
            target: "urlmigrate",
            event = "staging_collected",
            redirects = report.redirects,
            products = report.products,
            categories = report.categories,
            cms_pages = report.cms_pages
        );
        Ok(report)
    }

    pub fn create_table(&self) -> AppResult<()> {
        let table = self.source.table(STAGING_TABLE);
        let staging = quote_ident(&table);
        let index = quote_ident(&format!("{table}_request_path_store_idx"));
        self.source.execute_batch(&format!(
            "DROP TABLE IF EXISTS {staging};
             CREATE TABLE {staging} (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               request_path TEXT NOT NULL,
               target_path TEXT NOT NULL,
               is_system INTEGER NOT NULL DEFAULT 0,
               store_id INTEGER NOT NULL DEFAULT 0,
               entity_type TEXT NOT NULL,
               redirect_type INTEGER NOT NULL DEFAULT 0,
               product_id INTEGER,
               category_id INTEGER,
               cms_page_id INTEGER,
               description TEXT,
               priority INTEGER NOT NULL
             );
             CREATE INDEX {index} ON {staging} (request_path, store_id);"
        ))
    }

    fn insert(&self, pass: &str, select: String) -> AppResult<usize> {
        let sql = format!(
            "INSERT INTO {} ({STAGING_COLUMNS}) {select}",
            self.source.ident(STAGING_TABLE)
        );
        let rows = self
            .source
            .execute(&sql)
            .map_err(|err| err.with_context("pass", pass.to_string()))?;
        info!(target: "urlmigrate", event = "staging_pass", pass, rows);
        Ok(rows)
    }

    /// Manual redirects, fanned out to every store view.
    pub fn collect_redirects(&self) -> AppResult<usize> {
        let s = |name: &str| self.source.ident(name);
        self.insert(
            "redirects",
            format!(
                "SELECT r.request_path, r.target_path, r.is_system, s.store_id, '{custom}',
                        CASE eurr.options WHEN 'RP' THEN 301 WHEN 'R' THEN 302 ELSE 0 END,
                        NULL, NULL, NULL, eurr.description, {PRIORITY_REDIRECT}
                 FROM {eur} r
                 JOIN {eurrr} eurrr ON eurrr.url_rewrite_id = r.url_rewrite_id
                 JOIN {eurr} eurr ON eurr.redirect_id = eurrr.redirect_id
                 JOIN {store} s ON s.store_id > 0
                 ORDER BY r.url_rewrite_id, s.store_id",
                custom = EntityType::Custom,
                eur = s("enterprise_url_rewrite"),
                eurrr = s("enterprise_url_rewrite_redirect_rewrite"),
                eurr = s("enterprise_url_rewrite_redirect"),
                store = s("core_store"),
            ),
        )
    }

    /// Product rewrites, both standalone and nested under anchor categories.
    pub fn collect_product_rewrites(&self) -> AppResult<usize> {
        let mut rows = 0;
        rows += self.insert("products_default_scope", self.products_without_categories(true))?;
        rows += self.insert("products_store_scope", self.products_without_categories(false))?;
        rows += self.insert(
            "products_in_categories_default_scope",
            self.products_included_into_categories(true),
        )?;
        rows += self.insert(
            "products_in_categories_store_scope",
            self.products_included_into_categories(false),
        )?;
        Ok(rows)
    }

    fn products_without_categories(&self, default_scope: bool) -> String {
        let s = |name: &str| self.source.ident(name);
        let ecpr = s("enterprise_catalog_product_rewrite");
        let (store_join, store_expr, scope_filter) = if default_scope {
            (
                format!(
                    "JOIN {store} s ON s.store_id > 0
                       AND NOT EXISTS (SELECT 1 FROM {ecpr} own
                                       WHERE own.product_id = ecpr.product_id AND own.store_id = s.store_id)",
                    store = s("core_store"),
                ),
                "s.store_id",
                "ecpr.store_id = 0",
            )
        } else {
            (String::new(), "ecpr.store_id", "ecpr.store_id > 0")
        };
        format!(
            "SELECT r.request_path || {suffix}, 'catalog/product/view/id/' || ecpr.product_id,
                    r.is_system, {store_expr}, '{product}', 0,
                    ecpr.product_id, NULL, NULL, NULL, {PRIORITY_PRODUCT}
             FROM {eur} r
             JOIN {ecpr} ecpr ON ecpr.url_rewrite_id = r.url_rewrite_id AND {scope_filter}
             {store_join}
             ORDER BY r.url_rewrite_id, {store_expr}",
            suffix = self.suffix.sql_expr(EntityType::Product, store_expr),
            product = EntityType::Product,
            eur = s("enterprise_url_rewrite"),
        )
    }

    /// Category path + `/` + product path, for every anchor category the
    /// product is assigned to that has a system category rewrite. The category
    /// rewrite for the target store is preferred over the default-scope one.
    fn products_included_into_categories(&self, default_scope: bool) -> String {
        let s = |name: &str| self.source.ident(name);
        let ecpr = s("enterprise_catalog_product_rewrite");
        let eccr = s("enterprise_catalog_category_rewrite");
        let (store_join, store_expr, scope_filter) = if default_scope {
            (
                format!(
                    "JOIN {store} s ON s.store_id > 0
                       AND NOT EXISTS (SELECT 1 FROM {ecpr} own
                                       WHERE own.product_id = ecpr.product_id AND own.store_id = s.store_id)",
                    store = s("core_store"),
                ),
                "s.store_id",
                "ecpr.store_id = 0",
            )
        } else {
            (String::new(), "ecpr.store_id", "ecpr.store_id > 0")
        };
        format!(
            "SELECT rc.request_path || '/' || rp.request_path || {suffix},
                    'catalog/product/view/id/' || ccp.product_id || '/category/' || ccp.category_id,
                    rp.is_system, {store_expr}, '{product}', 0,
                    ccp.product_id, ccp.category_id, NULL, NULL, {PRIORITY_PRODUCT}
             FROM {ccp} ccp
             JOIN {cce} cce ON cce.entity_id = ccp.category_id AND cce.is_anchor = 1
             JOIN {ecpr} ecpr ON ecpr.product_id = ccp.product_id AND {scope_filter}
             JOIN {eur} rp ON rp.url_rewrite_id = ecpr.url_rewrite_id
             {store_join}
             JOIN {eccr} eccr ON eccr.category_id = ccp.category_id
               AND (eccr.store_id = {store_expr}
                    OR (eccr.store_id = 0
                        AND NOT EXISTS (SELECT 1 FROM {eccr} own_c
                                        WHERE own_c.category_id = ccp.category_id
                                          AND own_c.store_id = {store_expr})))
             JOIN {eur} rc ON rc.url_rewrite_id = eccr.url_rewrite_id AND rc.is_system = 1
             ORDER BY ccp.category_id, ccp.product_id, {store_expr}",
            suffix = self.suffix.sql_expr(EntityType::Product, store_expr),
            product = EntityType::Product,
            ccp = s("catalog_category_product"),
            cce = s("catalog_category_entity"),
            eur = s("enterprise_url_rewrite"),
        )
    }

    /// Category rewrites: default-scope ones fan out to every store view,
    /// store-scoped ones are kept for their own store.
    pub fn collect_category_rewrites(&self) -> AppResult<usize> {
        let s = |name: &str| self.source.ident(name);
        let select = |store_join: String, store_expr: &str, scope_filter: &str| {
            format!(
                "SELECT r.request_path || {suffix}, r.target_path, r.is_system, {store_expr},
                        '{category}', 0, NULL, c.entity_id, NULL, NULL, {PRIORITY_CATEGORY}
                 FROM {eur} r
                 JOIN {url_key} c ON c.value_id = r.value_id
                 JOIN {eccr} eccr ON eccr.url_rewrite_id = r.url_rewrite_id AND {scope_filter}
                 {store_join}
                 ORDER BY r.url_rewrite_id, {store_expr}",
                suffix = self.suffix.sql_expr(EntityType::Category, store_expr),
                category = EntityType::Category,
                eur = s("enterprise_url_rewrite"),
                url_key = s("catalog_category_entity_url_key"),
                eccr = s("enterprise_catalog_category_rewrite"),
            )
        };
        let mut rows = self.insert(
            "categories_default_scope",
            select(
                format!("JOIN {} s ON s.store_id > 0", s("core_store")),
                "s.store_id",
                "eccr.store_id = 0",
            ),
        )?;
        rows += self.insert(
            "categories_store_scope",
            select(String::new(), "eccr.store_id", "eccr.store_id > 0"),
        )?;
        Ok(rows)
    }

    /// One row per page identifier and store. Pages assigned to the admin
    /// store, or to no store at all, land on store 1.
    pub fn collect_cms_page_rewrites(&self) -> AppResult<usize> {
        let s = |name: &str| self.source.ident(name);
        self.insert(
            "cms_pages",
            format!(
                "SELECT cp.identifier, 'cms/page/view/page_id/' || MIN(cp.page_id), 1,
                        CASE WHEN cps.store_id IS NULL OR cps.store_id = 0 THEN 1 ELSE cps.store_id END,
                        '{cms_page}', 0, NULL, NULL, MIN(cp.page_id), NULL, {PRIORITY_CMS_PAGE}
                 FROM {cms_page_table} cp
                 LEFT JOIN {cms_page_store} cps ON cps.page_id = cp.page_id
                 GROUP BY cp.identifier, cps.store_id
                 ORDER BY MIN(cp.page_id), cps.store_id",
                cms_page = EntityType::CmsPage,
                cms_page_table = s("cms_page"),
                cms_page_store = s("cms_page_store"),
            ),
        )
    }
}
