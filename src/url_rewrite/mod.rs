//! The url rewrite migration step.
//!
//! `integrity` checks table structure and staging duplicates, `data` pages
//! through the staging table into `url_rewrite` and then copies url keys, and
//! `volume` compares staging and destination counts.

pub mod duplicates;
pub mod eav;
pub mod integrity;
pub mod model;
pub mod staging;
pub mod suffix;
pub mod transform;
pub mod volume;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::progress::{Progress, SilentProgress};
use crate::resource::{Destination, Source};
use crate::step::Step;
use crate::AppResult;

use self::duplicates::{find_duplicates, DuplicateIndex, DuplicateResolver, TokenSource};
use self::eav::{propagate, PropagationReport, CATEGORY_URL_KEYS, PRODUCT_URL_KEYS};
use self::integrity::{check_structure, group_duplicates, IntegrityReport, Side, StructureIssue};
use self::model::StagingRow;
use self::staging::{StagingCollector, StagingReport, STAGING_TABLE};
use self::transform::transform;
use self::volume::{check_volume, VolumeReport, PRODUCT_CATEGORY_TABLE, REWRITE_TABLE};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataReport {
    pub staging: StagingReport,
    pub pages: usize,
    pub rewrites_written: usize,
    pub product_categories_written: usize,
    pub duplicates_resolved: usize,
    pub category_url_keys: PropagationReport,
    pub product_url_keys: PropagationReport,
}

pub struct UrlRewriteStep {
    source: Source,
    destination: Destination,
    auto_resolve: bool,
    progress: Box<dyn Progress>,
    tokens: Option<TokenSource>,
    collected: Option<StagingReport>,
}

impl UrlRewriteStep {
    pub fn new(source: Source, destination: Destination, auto_resolve: bool) -> Self {
        Self {
            source,
            destination,
            auto_resolve,
            progress: Box::new(SilentProgress::default()),
            tokens: None,
            collected: None,
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        config.validate()?;
        Ok(Self::new(
            Source::open(config)?,
            Destination::open(config)?,
            config.auto_resolve_duplicates(),
        ))
    }

    pub fn with_progress(mut self, progress: Box<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the random resolution tokens, e.g. with a deterministic sequence.
    pub fn with_tokens(mut self, tokens: TokenSource) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn is_collected(&self) -> bool {
        self.collected.is_some()
    }

    /// Build the staging table once per step instance.
    pub fn collect(&mut self) -> AppResult<StagingReport> {
        if let Some(report) = self.collected {
            return Ok(report);
        }
        let report = StagingCollector::new(&self.source).collect()?;
        self.collected = Some(report);
        Ok(report)
    }

    pub fn find_duplicates(&mut self) -> AppResult<Vec<StagingRow>> {
        self.collect()?;
        find_duplicates(&self.source)
    }

    pub fn check_integrity(&mut self) -> AppResult<IntegrityReport> {
        let mut structure =
            check_structure(&self.source, &self.destination, self.progress.as_mut())?;
        for table in StagingCollector::new(&self.source).missing_tables()? {
            let issue = StructureIssue::Missing {
                side: Side::Source,
                table: table.to_string(),
            };
            if !structure.contains(&issue) {
                structure.push(issue);
            }
        }
        for issue in &structure {
            error!(target: "urlmigrate", event = "integrity_structure", message = %issue.message());
        }

        // Staging cannot be built from an incomplete source.
        let source_complete = !structure.iter().any(|issue| {
            matches!(
                issue,
                StructureIssue::Missing {
                    side: Side::Source,
                    ..
                }
            )
        });
        let duplicates = if source_complete {
            group_duplicates(&self.find_duplicates()?)
        } else {
            warn!(target: "urlmigrate", event = "integrity_duplicates_skipped", reason = "source_incomplete");
            Vec::new()
        };
        for group in &duplicates {
            if self.auto_resolve {
                info!(target: "urlmigrate", event = "integrity_duplicate", message = %group.message());
            } else {
                error!(target: "urlmigrate", event = "integrity_duplicate", message = %group.message());
            }
        }

        Ok(IntegrityReport {
            structure,
            duplicates,
            auto_resolve: self.auto_resolve,
        })
    }

    pub fn migrate(&mut self) -> AppResult<DataReport> {
        let staging = self.collect()?;
        let total = self.source.get_records_count(STAGING_TABLE)?
            + self.source.get_records_count(CATEGORY_URL_KEYS.source)?
            + self.source.get_records_count(PRODUCT_URL_KEYS.source)?;
        self.progress.start(total);
        self.destination.clear_document(REWRITE_TABLE)?;
        self.destination.clear_document(PRODUCT_CATEGORY_TABLE)?;

        let index = if self.auto_resolve {
            DuplicateIndex::from_rows(&find_duplicates(&self.source)?)
        } else {
            DuplicateIndex::default()
        };
        let mut resolver = match self.tokens.take() {
            Some(tokens) => DuplicateResolver::with_tokens(index, tokens),
            None => DuplicateResolver::new(index),
        };

        let mut report = DataReport {
            staging,
            ..DataReport::default()
        };
        let mut page = 0;
        loop {
            let records = self.source.get_records(STAGING_TABLE, page)?;
            let Some(last) = records.last().cloned() else {
                break;
            };
            page += 1;

            let mut rewrites = Vec::with_capacity(records.len());
            let mut product_categories = Vec::new();
            for record in &records {
                self.progress.advance();
                let row = StagingRow::from_record(record)?;
                let out = transform(&row, &mut resolver);
                rewrites.push(out.rewrite.to_record());
                if let Some(link) = out.product_category {
                    product_categories.push(link.to_record());
                }
            }
            report.rewrites_written += self.destination.save_records(REWRITE_TABLE, rewrites, false)?;
            report.product_categories_written +=
                self.destination
                    .save_records(PRODUCT_CATEGORY_TABLE, product_categories, false)?;
            self.source.set_last_loaded_record(STAGING_TABLE, last);
        }
        report.pages = page;

        let (resolutions, resolved) = resolver.into_parts();
        report.duplicates_resolved = resolved.len();
        report.category_url_keys = propagate(
            &self.source,
            &mut self.destination,
            CATEGORY_URL_KEYS,
            &resolutions,
            self.progress.as_mut(),
        )?;
        report.product_url_keys = propagate(
            &self.source,
            &mut self.destination,
            PRODUCT_URL_KEYS,
            &resolutions,
            self.progress.as_mut(),
        )?;
        self.progress.finish();

        for line in &resolved {
            info!(target: "urlmigrate", event = "duplicate_resolved", message = %line);
        }
        info!(
            target: "urlmigrate",
            event = "url_rewrite_data_complete",
            rewrites = report.rewrites_written,
            product_categories = report.product_categories_written,
            duplicates_resolved = report.duplicates_resolved,
            category_url_keys_synthesized = report.category_url_keys.rows_synthesized,
            product_url_keys_synthesized = report.product_url_keys.rows_synthesized
        );
        Ok(report)
    }

    pub fn check_volume(&mut self) -> AppResult<VolumeReport> {
        self.progress.start(1);
        self.collect()?;
        self.progress.advance();
        let report = check_volume(&self.source, &self.destination)?;
        if !report.passed() {
            error!(
                target: "urlmigrate",
                event = "volume_mismatch",
                message = "Mismatch of entities in the document: url_rewrite",
                staging_rows = report.staging_rows,
                destination_rows = report.destination_rows
            );
        }
        self.progress.finish();
        Ok(report)
    }
}

impl Step for UrlRewriteStep {
    fn name(&self) -> &'static str {
        "url_rewrite"
    }

    fn integrity(&mut self) -> AppResult<bool> {
        Ok(self.check_integrity()?.passed())
    }

    fn data(&mut self) -> AppResult<bool> {
        self.migrate()?;
        Ok(true)
    }

    fn volume(&mut self) -> AppResult<bool> {
        Ok(self.check_volume()?.passed())
    }

    fn rollback(&mut self) -> AppResult<()> {
        self.destination.clear_document(REWRITE_TABLE)?;
        self.destination.clear_document(PRODUCT_CATEGORY_TABLE)?;
        info!(target: "urlmigrate", event = "url_rewrite_rollback");
        Ok(())
    }
}
