#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use anyhow::Result;
use assert_cmd::Command;
use rusqlite::Connection;
use tempfile::tempdir;

use util::*;

fn urlmigrate(fixture: &Fixture) -> Result<Command> {
    let mut cmd = Command::cargo_bin("urlmigrate")?;
    cmd.arg("--source")
        .arg(&fixture.source_path)
        .arg("--destination")
        .arg(&fixture.destination_path)
        .arg("--quiet");
    Ok(cmd)
}

fn colliding_fixture() -> Fixture {
    let fixture = Fixture::new();
    let conn = fixture.source();
    add_category(&conn, 10, "shoes", 1, false);
    add_cms_page(&conn, 3, "shoes.html", &[1]);
    fixture
}

#[test]
fn init_destination_creates_tables() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("fresh.sqlite3");
    let output = Command::cargo_bin("urlmigrate")?
        .arg("--destination")
        .arg(&db)
        .arg("init-destination")
        .output()?;
    assert!(
        output.status.success(),
        "init-destination failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let conn = Connection::open(&db)?;
    for table in [
        "url_rewrite",
        "catalog_url_rewrite_product_category",
        "catalog_category_entity_varchar",
        "catalog_product_entity_varchar",
    ] {
        assert_eq!(count(&conn, table), 0, "{table} should exist and be empty");
    }
    Ok(())
}

#[test]
fn integrity_exit_code_follows_auto_resolve() -> Result<()> {
    let fixture = colliding_fixture();

    let strict = urlmigrate(&fixture)?.arg("integrity").output()?;
    assert_eq!(strict.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&strict.stdout);
    assert!(stdout.contains("Duplicate URL rewrite. Request path: shoes.html Store ID: 1"));

    let lenient = urlmigrate(&fixture)?
        .args(["--auto-resolve", "integrity"])
        .output()?;
    assert_eq!(lenient.status.code(), Some(0));
    Ok(())
}

#[test]
fn run_migrates_and_reports_json() -> Result<()> {
    let fixture = colliding_fixture();

    let output = urlmigrate(&fixture)?
        .args(["--auto-resolve", "--json", "run"])
        .output()?;
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout)?;
    let reports: Vec<serde_json::Value> = serde_json::Deserializer::from_str(&stdout)
        .into_iter::<serde_json::Value>()
        .collect::<Result<_, _>>()?;
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[1]["duplicates_resolved"], 1);
    assert_eq!(reports[2]["staging_rows"], 2);
    assert_eq!(reports[2]["destination_rows"], 2);

    assert_eq!(count(&fixture.destination(), "url_rewrite"), 2);
    Ok(())
}

#[test]
fn config_file_supplies_paths_and_options() -> Result<()> {
    let fixture = colliding_fixture();
    let config_path = fixture.dir.path().join("urlmigrate.toml");
    std::fs::write(
        &config_path,
        "[source]\npath = \"legacy.sqlite3\"\n\n[destination]\npath = \"destination.sqlite3\"\n\n[options]\nbulk_size = 1\nauto_resolve_urlrewrite_duplicates = true\n",
    )?;

    let output = Command::cargo_bin("urlmigrate")?
        .arg("--config")
        .arg(&config_path)
        .args(["--quiet", "data"])
        .output()?;
    assert!(
        output.status.success(),
        "data failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("Duplicates resolved: 1"));
    Ok(())
}

#[test]
fn rollback_then_volume_reports_mismatch() -> Result<()> {
    let fixture = colliding_fixture();
    urlmigrate(&fixture)?
        .args(["--auto-resolve", "data"])
        .assert()
        .success();
    urlmigrate(&fixture)?.arg("rollback").assert().success();

    let output = urlmigrate(&fixture)?.arg("volume").output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Volume: mismatch"));
    Ok(())
}

#[test]
fn missing_source_is_fatal() -> Result<()> {
    let fixture = Fixture::new();
    let output = Command::cargo_bin("urlmigrate")?
        .arg("--source")
        .arg(fixture.dir.path().join("nope.sqlite3"))
        .arg("--destination")
        .arg(&fixture.destination_path)
        .args(["--quiet", "integrity"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
    Ok(())
}

#[test]
fn invalid_bulk_size_is_fatal() -> Result<()> {
    let fixture = Fixture::new();
    let output = urlmigrate(&fixture)?
        .args(["--bulk-size", "0", "volume"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    Ok(())
}
