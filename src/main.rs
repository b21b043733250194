use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use urlmigrate_lib::config::Config;
use urlmigrate_lib::progress::{BarProgress, Progress, SilentProgress};
use urlmigrate_lib::url_rewrite::integrity::IntegrityReport;
use urlmigrate_lib::url_rewrite::volume::VolumeReport;
use urlmigrate_lib::url_rewrite::{DataReport, UrlRewriteStep};
use urlmigrate_lib::{db, logging, schema, step::Step};

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_PHASE_FAILED: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "urlmigrate",
    about = "Migrate legacy URL rewrites into the unified url_rewrite schema",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Legacy source database (overrides the config file).
    #[arg(long, global = true)]
    source: Option<PathBuf>,
    /// Destination database (overrides the config file).
    #[arg(long, global = true)]
    destination: Option<PathBuf>,
    /// Rows per page when reading the source.
    #[arg(long, global = true)]
    bulk_size: Option<usize>,
    /// Rename colliding request paths instead of failing integrity.
    #[arg(long, global = true)]
    auto_resolve: bool,
    /// Do not draw progress bars.
    #[arg(long, global = true)]
    quiet: bool,
    /// Print phase reports as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check table structure and report duplicate request paths.
    Integrity,
    /// Migrate rewrites and url keys into the destination.
    Data,
    /// Compare staged and migrated row counts.
    Volume,
    /// Clear the destination tables owned by the step.
    Rollback,
    /// Run integrity, data and volume in order, stopping at the first failure.
    Run,
    /// Create missing destination tables.
    InitDestination,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match handle_cli(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(EXIT_FATAL);
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(path) = &cli.source {
        config.source.path = Some(path.clone());
    }
    if let Some(path) = &cli.destination {
        config.destination.path = Some(path.clone());
    }
    if let Some(bulk_size) = cli.bulk_size {
        config.options.bulk_size = bulk_size;
    }
    if cli.auto_resolve {
        config.options.auto_resolve_urlrewrite_duplicates = true;
    }
    config.validate().context("validate config")?;
    Ok(config)
}

fn handle_cli(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;
    if let Command::InitDestination = cli.command {
        let path = config.destination_db().context("destination database")?;
        let conn = db::open_or_create(path)?;
        schema::apply_destination_schema(&conn)?;
        println!("Destination schema ready: {}", path.display());
        return Ok(EXIT_OK);
    }

    let progress: Box<dyn Progress> = if cli.quiet {
        Box::new(SilentProgress::default())
    } else {
        Box::new(BarProgress::new("url_rewrite"))
    };
    let mut step = UrlRewriteStep::from_config(&config)
        .context("open url rewrite step")?
        .with_progress(progress);

    let passed = match cli.command {
        Command::Integrity => run_integrity(&mut step, cli.json)?,
        Command::Data => run_data(&mut step, cli.json)?,
        Command::Volume => run_volume(&mut step, cli.json)?,
        Command::Rollback => {
            step.rollback()?;
            println!("Rolled back: url_rewrite, catalog_url_rewrite_product_category");
            true
        }
        Command::Run => {
            run_integrity(&mut step, cli.json)?
                && run_data(&mut step, cli.json)?
                && run_volume(&mut step, cli.json)?
        }
        Command::InitDestination => true,
    };
    Ok(if passed { EXIT_OK } else { EXIT_PHASE_FAILED })
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    println!("{json}");
    Ok(())
}

fn run_integrity(step: &mut UrlRewriteStep, json: bool) -> Result<bool> {
    let report = step.check_integrity()?;
    if json {
        print_json(&report)?;
    } else {
        print_integrity(&report);
    }
    Ok(report.passed())
}

fn print_integrity(report: &IntegrityReport) {
    for issue in &report.structure {
        println!("{}", issue.message());
    }
    for group in &report.duplicates {
        println!("{}", group.message());
    }
    println!(
        "Integrity: {} ({} structure issue(s), {} duplicate group(s){})",
        if report.passed() { "ok" } else { "failed" },
        report.structure.len(),
        report.duplicates.len(),
        if report.auto_resolve && !report.duplicates.is_empty() {
            ", auto-resolve enabled"
        } else {
            ""
        }
    );
}

fn run_data(step: &mut UrlRewriteStep, json: bool) -> Result<bool> {
    let report = step.migrate()?;
    if json {
        print_json(&report)?;
    } else {
        print_data(&report);
    }
    Ok(true)
}

fn print_data(report: &DataReport) {
    println!("Staged rows: {}", report.staging.total());
    println!("Rewrites written: {}", report.rewrites_written);
    println!(
        "Product/category links written: {}",
        report.product_categories_written
    );
    println!("Duplicates resolved: {}", report.duplicates_resolved);
    println!(
        "Category url keys: {} written, {} synthesized",
        report.category_url_keys.rows_written, report.category_url_keys.rows_synthesized
    );
    println!(
        "Product url keys: {} written, {} synthesized",
        report.product_url_keys.rows_written, report.product_url_keys.rows_synthesized
    );
}

fn run_volume(step: &mut UrlRewriteStep, json: bool) -> Result<bool> {
    let report = step.check_volume()?;
    if json {
        print_json(&report)?;
    } else {
        print_volume(&report);
    }
    Ok(report.passed())
}

fn print_volume(report: &VolumeReport) {
    println!(
        "Volume: {} (staging {}, url_rewrite {})",
        if report.passed() { "ok" } else { "mismatch" },
        report.staging_rows,
        report.destination_rows
    );
}
