#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use tempfile::TempDir;

use urlmigrate_lib::config::Config;
use urlmigrate_lib::schema::{apply_destination_schema, apply_legacy_schema};
use urlmigrate_lib::url_rewrite::duplicates::TokenSource;
use urlmigrate_lib::url_rewrite::UrlRewriteStep;

pub const CATEGORY_URL_KEY_ATTRIBUTE: i64 = 43;
pub const PRODUCT_URL_KEY_ATTRIBUTE: i64 = 97;

/// A legacy database with two store views and an empty destination.
pub struct Fixture {
    pub dir: TempDir,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("legacy.sqlite3");
        let destination_path = dir.path().join("destination.sqlite3");

        let source = Connection::open(&source_path).expect("create source");
        apply_legacy_schema(&source).expect("legacy schema");
        source
            .execute_batch(
                "INSERT INTO core_store (store_id, code, website_id, name) VALUES
                   (0, 'admin', 0, 'Admin'),
                   (1, 'default', 1, 'Default Store View'),
                   (2, 'french', 1, 'French Store View');",
            )
            .expect("seed stores");

        let destination = Connection::open(&destination_path).expect("create destination");
        apply_destination_schema(&destination).expect("destination schema");

        Self {
            dir,
            source_path,
            destination_path,
        }
    }

    pub fn source(&self) -> Connection {
        Connection::open(&self.source_path).expect("open source")
    }

    pub fn destination(&self) -> Connection {
        Connection::open(&self.destination_path).expect("open destination")
    }

    pub fn config(&self, auto_resolve: bool, bulk_size: usize) -> Config {
        let mut config = Config::default();
        config.source.path = Some(self.source_path.clone());
        config.destination.path = Some(self.destination_path.clone());
        config.options.bulk_size = bulk_size;
        config.options.auto_resolve_urlrewrite_duplicates = auto_resolve;
        config
    }

    pub fn step(&self, auto_resolve: bool) -> UrlRewriteStep {
        self.step_with_bulk(auto_resolve, 100)
    }

    pub fn step_with_bulk(&self, auto_resolve: bool, bulk_size: usize) -> UrlRewriteStep {
        UrlRewriteStep::from_config(&self.config(auto_resolve, bulk_size))
            .expect("open step")
            .with_tokens(sequence_tokens())
    }
}

/// `tok1`, `tok2`, ...
pub fn sequence_tokens() -> TokenSource {
    let mut next = 0;
    Box::new(move || {
        next += 1;
        format!("tok{next}")
    })
}

fn rewrite(conn: &Connection, request_path: &str, target_path: &str, is_system: bool, value_id: i64) -> i64 {
    conn.execute(
        "INSERT INTO enterprise_url_rewrite (request_path, target_path, is_system, guid, identifier, inc, value_id)
         VALUES (?1, ?2, ?3, lower(hex(randomblob(16))), ?1, 1, ?4)",
        params![request_path, target_path, is_system, value_id],
    )
    .expect("insert rewrite");
    conn.last_insert_rowid()
}

pub fn add_url_key(conn: &Connection, table: &str, attribute_id: i64, entity_id: i64, store_id: i64, value: &str) -> i64 {
    conn.execute(
        &format!(
            "INSERT INTO {table} (attribute_id, store_id, entity_id, value) VALUES (?1, ?2, ?3, ?4)"
        ),
        params![attribute_id, store_id, entity_id, value],
    )
    .expect("insert url key");
    conn.last_insert_rowid()
}

/// A system category rewrite: `url_key` is the path without suffix.
pub fn add_category(conn: &Connection, category_id: i64, url_key: &str, store_id: i64, is_anchor: bool) {
    conn.execute(
        "INSERT OR IGNORE INTO catalog_category_entity (entity_id, parent_id, path, level, is_anchor)
         VALUES (?1, 2, '1/2/' || ?1, 2, ?2)",
        params![category_id, is_anchor],
    )
    .expect("insert category");
    let value_id = add_url_key(
        conn,
        "catalog_category_entity_url_key",
        CATEGORY_URL_KEY_ATTRIBUTE,
        category_id,
        store_id,
        url_key,
    );
    let rewrite_id = rewrite(
        conn,
        url_key,
        &format!("catalog/category/view/id/{category_id}"),
        true,
        value_id,
    );
    conn.execute(
        "INSERT INTO enterprise_catalog_category_rewrite (url_rewrite_id, category_id, store_id) VALUES (?1, ?2, ?3)",
        params![rewrite_id, category_id, store_id],
    )
    .expect("insert category rewrite");
}

pub fn add_product(conn: &Connection, product_id: i64, url_key: &str, store_id: i64) {
    let value_id = add_url_key(
        conn,
        "catalog_product_entity_url_key",
        PRODUCT_URL_KEY_ATTRIBUTE,
        product_id,
        store_id,
        url_key,
    );
    let rewrite_id = rewrite(
        conn,
        url_key,
        &format!("catalog/product/view/id/{product_id}"),
        true,
        value_id,
    );
    conn.execute(
        "INSERT INTO enterprise_catalog_product_rewrite (url_rewrite_id, product_id, store_id) VALUES (?1, ?2, ?3)",
        params![rewrite_id, product_id, store_id],
    )
    .expect("insert product rewrite");
}

pub fn assign_product(conn: &Connection, category_id: i64, product_id: i64) {
    conn.execute(
        "INSERT INTO catalog_category_product (category_id, product_id, position) VALUES (?1, ?2, 0)",
        params![category_id, product_id],
    )
    .expect("assign product");
}

pub fn add_cms_page(conn: &Connection, page_id: i64, identifier: &str, stores: &[i64]) {
    conn.execute(
        "INSERT INTO cms_page (page_id, title, identifier, is_active) VALUES (?1, ?2, ?2, 1)",
        params![page_id, identifier],
    )
    .expect("insert cms page");
    for store in stores {
        conn.execute(
            "INSERT INTO cms_page_store (page_id, store_id) VALUES (?1, ?2)",
            params![page_id, store],
        )
        .expect("insert cms page store");
    }
}

pub fn add_redirect(conn: &Connection, request_path: &str, target_path: &str, options: &str, description: &str) {
    let rewrite_id = rewrite(conn, request_path, target_path, false, 0);
    conn.execute(
        "INSERT INTO enterprise_url_rewrite_redirect (identifier, target_path, options, description)
         VALUES (?1, ?2, ?3, ?4)",
        params![request_path, target_path, options, description],
    )
    .expect("insert redirect");
    let redirect_id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO enterprise_url_rewrite_redirect_rewrite (url_rewrite_id, redirect_id) VALUES (?1, ?2)",
        params![rewrite_id, redirect_id],
    )
    .expect("link redirect");
}

pub fn set_config(conn: &Connection, scope: &str, scope_id: i64, path: &str, value: &str) {
    conn.execute(
        "INSERT INTO core_config_data (scope, scope_id, path, value) VALUES (?1, ?2, ?3, ?4)",
        params![scope, scope_id, path, value],
    )
    .expect("insert config");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOut {
    pub url_rewrite_id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub request_path: String,
    pub target_path: String,
    pub redirect_type: i64,
    pub store_id: i64,
    pub description: Option<String>,
    pub is_autogenerated: bool,
    pub metadata: Option<String>,
}

pub fn rewrites(conn: &Connection) -> Vec<RewriteOut> {
    let mut stmt = conn
        .prepare(
            "SELECT url_rewrite_id, entity_type, entity_id, request_path, target_path, redirect_type,
                    store_id, description, is_autogenerated, metadata
             FROM url_rewrite ORDER BY url_rewrite_id",
        )
        .expect("prepare rewrites");
    stmt.query_map([], |row| {
        Ok(RewriteOut {
            url_rewrite_id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            request_path: row.get(3)?,
            target_path: row.get(4)?,
            redirect_type: row.get(5)?,
            store_id: row.get(6)?,
            description: row.get(7)?,
            is_autogenerated: row.get(8)?,
            metadata: row.get(9)?,
        })
    })
    .expect("query rewrites")
    .collect::<Result<Vec<_>, _>>()
    .expect("read rewrites")
}

pub fn varchar_rows(conn: &Connection, table: &str) -> Vec<(i64, i64, String)> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT entity_id, store_id, value FROM {table} ORDER BY entity_id, store_id"
        ))
        .expect("prepare varchar rows");
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("query varchar rows")
        .collect::<Result<Vec<_>, _>>()
        .expect("read varchar rows")
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("count rows")
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` under a JSON subscriber and return every event it emitted.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<serde_json::Value>) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().expect("log buffer lock").clone();
    let events = String::from_utf8(bytes)
        .expect("utf8 logs")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json log line"))
        .collect();
    (result, events)
}

/// `(level, message)` of events carrying the given `event` field.
pub fn events_named(events: &[serde_json::Value], name: &str) -> Vec<(String, String)> {
    events
        .iter()
        .filter(|event| event["fields"]["event"] == name)
        .map(|event| {
            (
                event["level"].as_str().unwrap_or_default().to_string(),
                event["fields"]["message"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}
