//! DDL for both sides of the migration.
//!
//! The legacy schema is only used to build fixtures; the destination schema
//! backs the `init-destination` command.

use rusqlite::Connection;
use tracing::info;

use crate::{AppError, AppResult};

pub const LEGACY_SCHEMA: &str = include_str!("../sql/legacy_schema.sql");
pub const DESTINATION_SCHEMA: &str = include_str!("../sql/destination_schema.sql");

pub fn apply_legacy_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(LEGACY_SCHEMA)
        .map_err(|err| AppError::from(err).with_context("operation", "apply_legacy_schema"))
}

/// Create any destination table that does not exist yet. Existing tables are
/// left untouched.
pub fn apply_destination_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(DESTINATION_SCHEMA)
        .map_err(|err| AppError::from(err).with_context("operation", "apply_destination_schema"))?;
    info!(target: "urlmigrate", event = "destination_schema_applied");
    Ok(())
}
