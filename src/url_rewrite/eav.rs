//! Copies legacy url-key attribute rows, keeping them in line with renamed
//! request paths.

use std::collections::BTreeSet;

use rusqlite::types::Value;
use serde::Serialize;
use tracing::debug;

use crate::progress::Progress;
use crate::resource::{Destination, Record, Source};
use crate::url_rewrite::duplicates::ResolutionRecord;
use crate::url_rewrite::model::{EntityType, ResolutionKey};
use crate::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlKeyTables {
    pub source: &'static str,
    pub destination: &'static str,
    pub entity_type: EntityType,
}

pub const CATEGORY_URL_KEYS: UrlKeyTables = UrlKeyTables {
    source: "catalog_category_entity_url_key",
    destination: "catalog_category_entity_varchar",
    entity_type: EntityType::Category,
};

pub const PRODUCT_URL_KEYS: UrlKeyTables = UrlKeyTables {
    source: "catalog_product_entity_url_key",
    destination: "catalog_product_entity_varchar",
    entity_type: EntityType::Product,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_synthesized: usize,
}

fn with_token(value: Option<String>, token: &str) -> Value {
    Value::Text(format!("{}-{token}", value.unwrap_or_default()))
}

/// `(entity_id, attribute_id, store_id)` of store-scoped source rows.
pub type StoreRows = BTreeSet<(i64, i64, i64)>;

/// Rows to emit for one legacy url-key row, plus how many of them were
/// synthesized store overrides. A default-scope row is only fanned out to
/// stores missing from `store_rows`. Output rows are not yet reduced to the
/// destination columns.
pub fn propagate_row(
    mut row: Record,
    entity_type: EntityType,
    resolutions: &ResolutionRecord,
    store_rows: &StoreRows,
) -> (Vec<Record>, usize) {
    row.set("value_id", Value::Null);
    row.remove("entity_type_id");

    let entity_id = row.int("entity_id").unwrap_or(0);
    let attribute_id = row.int("attribute_id").unwrap_or(0);
    let store_id = row.int("store_id").unwrap_or(0);

    if let Some(token) = resolutions.get(&ResolutionKey::new(entity_type, entity_id, store_id)) {
        let value = with_token(row.text("value"), token);
        row.set("value", value);
        return (vec![row], 0);
    }

    let mut out = Vec::new();
    if store_id == 0 {
        for (store, token) in resolutions.stores_for(entity_type, entity_id) {
            if store_rows.contains(&(entity_id, attribute_id, store)) {
                continue;
            }
            let mut store_row = row.clone();
            store_row.set("store_id", store);
            store_row.set("value", with_token(row.text("value"), token));
            out.push(store_row);
        }
    }
    let synthesized = out.len();
    out.push(row);
    (out, synthesized)
}

/// Store-scoped rows of `table` for entities that carry a resolution token.
fn collect_store_rows(
    source: &Source,
    table: &str,
    entity_type: EntityType,
    resolutions: &ResolutionRecord,
) -> AppResult<StoreRows> {
    if resolutions.is_empty() {
        return Ok(StoreRows::new());
    }
    let sql = format!(
        "SELECT entity_id, attribute_id, store_id FROM {} WHERE store_id <> 0",
        source.ident(table)
    );
    let rows = source
        .query_records(&sql)
        .map_err(|err| err.with_context("table", table.to_string()))?;
    Ok(rows
        .iter()
        .filter_map(|row| Some((row.int("entity_id")?, row.int("attribute_id")?, row.int("store_id")?)))
        .filter(|(entity_id, _, _)| resolutions.stores_for(entity_type, *entity_id).next().is_some())
        .collect())
}

/// Stream `tables.source` page by page into `tables.destination`. Writes use
/// append mode so synthesized store rows replace an existing override.
pub fn propagate(
    source: &Source,
    destination: &mut Destination,
    tables: UrlKeyTables,
    resolutions: &ResolutionRecord,
    progress: &mut dyn Progress,
) -> AppResult<PropagationReport> {
    let store_rows = collect_store_rows(source, tables.source, tables.entity_type, resolutions)?;
    let mut report = PropagationReport::default();
    let mut page = 0;
    loop {
        let rows = source.get_records(tables.source, page)?;
        if rows.is_empty() {
            break;
        }
        page += 1;
        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            progress.advance();
            report.rows_read += 1;
            let (emitted, synthesized) =
                propagate_row(row, tables.entity_type, resolutions, &store_rows);
            report.rows_synthesized += synthesized;
            batch.extend(emitted);
        }
        report.rows_written += destination.save_records(tables.destination, batch, true)?;
    }
    debug!(
        target: "urlmigrate",
        event = "url_keys_propagated",
        source_table = tables.source,
        destination_table = tables.destination,
        rows_read = report.rows_read,
        rows_synthesized = report.rows_synthesized
    );
    Ok(report)
}
