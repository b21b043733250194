use std::collections::HashMap;

use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::config::Config;
use crate::db::{self, quote_ident};
use crate::resource::Record;
use crate::{AppError, AppResult};

/// Write side of the migration.
pub struct Destination {
    conn: Connection,
    prefix: String,
    columns: HashMap<String, Vec<String>>,
}

impl Destination {
    pub fn new(conn: Connection, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            columns: HashMap::new(),
        }
    }

    pub fn open(config: &Config) -> AppResult<Self> {
        let conn = db::open_existing(config.destination_db()?)?;
        Ok(Self::new(conn, config.destination.prefix.clone()))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn columns(&mut self, table: &str) -> AppResult<&[String]> {
        if !self.columns.contains_key(table) {
            let columns = db::table_columns(&self.conn, &self.table(table))?.ok_or_else(|| {
                AppError::new("DB/TABLE_NOT_FOUND", "destination table does not exist")
                    .with_context("table", self.table(table))
            })?;
            self.columns.insert(table.to_string(), columns);
        }
        Ok(self
            .columns
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Reduce a record to the columns the destination table actually has.
    pub fn process_fields(&mut self, table: &str, mut record: Record) -> AppResult<Record> {
        let columns = self.columns(table)?;
        record.retain(|name| columns.iter().any(|column| column == name));
        Ok(record)
    }

    /// Insert a batch inside one transaction. With `append` set, rows that hit
    /// an existing unique key replace it instead of failing the batch.
    pub fn save_records(&mut self, table: &str, records: Vec<Record>, append: bool) -> AppResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let processed = records
            .into_iter()
            .map(|record| self.process_fields(table, record))
            .collect::<AppResult<Vec<_>>>()?;

        let verb = if append { "INSERT OR REPLACE" } else { "INSERT" };
        let target = quote_ident(&self.table(table));
        let tx = self.conn.transaction().map_err(|err| {
            AppError::from(err)
                .with_context("operation", "save_records_begin")
                .with_context("table", table.to_string())
        })?;
        let mut written = 0;
        for record in &processed {
            if record.is_empty() {
                continue;
            }
            let names: Vec<String> = record.columns().map(quote_ident).collect();
            let placeholders: Vec<String> = (1..=names.len()).map(|idx| format!("?{idx}")).collect();
            let sql = format!(
                "{verb} INTO {target} ({}) VALUES ({})",
                names.join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare_cached(&sql).map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "save_records_prepare")
                    .with_context("table", table.to_string())
            })?;
            written += stmt
                .execute(params_from_iter(record.iter().map(|(_, value)| value)))
                .map_err(|err| {
                    AppError::from(err)
                        .with_context("operation", "save_records_insert")
                        .with_context("table", table.to_string())
                })?;
        }
        tx.commit().map_err(|err| {
            AppError::from(err)
                .with_context("operation", "save_records_commit")
                .with_context("table", table.to_string())
        })?;
        debug!(target: "urlmigrate", event = "records_saved", table, rows = written, append);
        Ok(written)
    }

    pub fn clear_document(&self, table: &str) -> AppResult<()> {
        let sql = format!("DELETE FROM {}", quote_ident(&self.table(table)));
        self.conn.execute(&sql, []).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "clear_document")
                .with_context("table", table.to_string())
        })?;
        Ok(())
    }

    pub fn get_records_count(&self, table: &str) -> AppResult<u64> {
        db::count_rows(&self.conn, &self.table(table))
    }

    pub fn document_fields(&self, table: &str) -> AppResult<Option<Vec<String>>> {
        db::table_columns(&self.conn, &self.table(table))
    }
}
