use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::{AppError, AppResult};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open an existing database. A missing file is an error rather than a new
/// empty database, so a mistyped path fails the integrity phase loudly.
pub fn open_existing(path: &Path) -> AppResult<Connection> {
    if !path.exists() {
        return Err(AppError::new("DB/NOT_FOUND", "database file not found")
            .with_context("path", path.display().to_string()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| {
        AppError::from(err)
            .with_context("operation", "open_database")
            .with_context("path", path.display().to_string())
    })?;
    configure(&conn)?;
    Ok(conn)
}

/// Open or create a database file.
pub fn open_or_create(path: &Path) -> AppResult<Connection> {
    let conn = Connection::open(path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_database")
            .with_context("path", path.display().to_string())
    })?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> AppResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|err| AppError::from(err).with_context("operation", "busy_timeout"))?;
    Ok(())
}

pub fn quote_ident(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

pub fn table_exists(conn: &Connection, table: &str) -> AppResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "table_exists")
                .with_context("table", table.to_string())
        })?;
    Ok(found.is_some())
}

/// Column names in declaration order, or `None` when the table is missing.
pub fn table_columns(conn: &Connection, table: &str) -> AppResult<Option<Vec<String>>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let pragma = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn.prepare(&pragma).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "table_info")
            .with_context("table", table.to_string())
    })?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "table_info_query")
                .with_context("table", table.to_string())
        })?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "table_info_row")
                .with_context("table", table.to_string())
        })?;
    Ok(Some(columns))
}

pub fn count_rows(conn: &Connection, table: &str) -> AppResult<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0)).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "count_rows")
            .with_context("table", table.to_string())
    })?;
    Ok(u64::try_from(count).unwrap_or_default())
}
