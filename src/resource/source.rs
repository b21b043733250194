use std::collections::HashMap;

use rusqlite::{Connection, Params, Statement};

use crate::config::Config;
use crate::db::{self, quote_ident};
use crate::resource::Record;
use crate::{AppError, AppResult};

/// Read side of the migration: the legacy database.
///
/// Every method taking a table name expects the unprefixed name; the
/// configured prefix is applied here.
pub struct Source {
    conn: Connection,
    prefix: String,
    bulk_size: usize,
    cursors: HashMap<String, Record>,
}

impl Source {
    pub fn new(conn: Connection, prefix: impl Into<String>, bulk_size: usize) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            bulk_size: bulk_size.max(1),
            cursors: HashMap::new(),
        }
    }

    pub fn open(config: &Config) -> AppResult<Self> {
        let conn = db::open_existing(config.source_db()?)?;
        Ok(Self::new(conn, config.source.prefix.clone(), config.bulk_size()))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bulk_size(&self) -> usize {
        self.bulk_size
    }

    pub fn table(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Quoted, prefixed table name for use inside hand-written SQL.
    pub fn ident(&self, name: &str) -> String {
        quote_ident(&self.table(name))
    }

    /// One page of rows in rowid order. An empty page means the table is
    /// exhausted.
    pub fn get_records(&self, table: &str, page: usize) -> AppResult<Vec<Record>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY rowid LIMIT ?1 OFFSET ?2",
            self.ident(table)
        );
        let limit = self.bulk_size as i64;
        let offset = (page as i64).saturating_mul(limit);
        let mut stmt = self.conn.prepare_cached(&sql).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "get_records")
                .with_context("table", table.to_string())
        })?;
        read_records(&mut stmt, (limit, offset)).map_err(|err| {
            err.with_context("table", table.to_string())
                .with_context("page", page.to_string())
        })
    }

    pub fn get_records_count(&self, table: &str) -> AppResult<u64> {
        db::count_rows(&self.conn, &self.table(table))
    }

    pub fn set_last_loaded_record(&mut self, table: &str, record: Record) {
        self.cursors.insert(table.to_string(), record);
    }

    pub fn last_loaded_record(&self, table: &str) -> Option<&Record> {
        self.cursors.get(table)
    }

    pub fn execute(&self, sql: &str) -> AppResult<usize> {
        self.conn
            .execute(sql, [])
            .map_err(|err| AppError::from(err).with_context("operation", "execute"))
    }

    pub fn execute_batch(&self, sql: &str) -> AppResult<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|err| AppError::from(err).with_context("operation", "execute_batch"))
    }

    pub fn query_records(&self, sql: &str) -> AppResult<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|err| AppError::from(err).with_context("operation", "query_records"))?;
        read_records(&mut stmt, [])
    }

    pub fn document_fields(&self, table: &str) -> AppResult<Option<Vec<String>>> {
        db::table_columns(&self.conn, &self.table(table))
    }
}

pub(crate) fn read_records<P: Params>(stmt: &mut Statement<'_>, params: P) -> AppResult<Vec<Record>> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let rows = stmt
        .query_map(params, |row| Record::from_row(row, &columns))
        .map_err(|err| AppError::from(err).with_context("operation", "read_records"))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| AppError::from(err).with_context("operation", "read_record_row"))
}
