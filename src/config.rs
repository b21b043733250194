//! Step configuration loaded from a TOML file and overridden from the CLI.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AppError, AppResult};

pub const DEFAULT_BULK_SIZE: usize = 100;
pub const MIN_BULK_SIZE: usize = 1;
pub const MAX_BULK_SIZE: usize = 100_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("bulk size {0} is outside the supported range (1-100000)")]
    BulkSize(usize),
    #[error("{side} database path is not configured")]
    MissingPath { side: &'static str },
    #[error("table prefix {0:?} may only contain ASCII letters, digits and underscores")]
    InvalidPrefix(String),
}

impl From<ConfigError> for AppError {
    fn from(error: ConfigError) -> Self {
        let code = match error {
            ConfigError::BulkSize(_) => "CONFIG/INVALID_BULK_SIZE",
            ConfigError::MissingPath { .. } => "CONFIG/MISSING_PATH",
            ConfigError::InvalidPrefix(_) => "CONFIG/INVALID_PREFIX",
        };
        AppError::new(code, error.to_string())
    }
}

/// One side of the migration: a SQLite file plus an optional table prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepOptions {
    /// Page size used for every paged read of the source.
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
    /// When false any duplicate `(request_path, store_id)` fails the integrity phase.
    #[serde(default)]
    pub auto_resolve_urlrewrite_duplicates: bool,
}

fn default_bulk_size() -> usize {
    DEFAULT_BULK_SIZE
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            bulk_size: DEFAULT_BULK_SIZE,
            auto_resolve_urlrewrite_duplicates: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub source: DatabaseConfig,
    #[serde(default)]
    pub destination: DatabaseConfig,
    #[serde(default)]
    pub options: StepOptions,

    /// Path to the file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> AppResult<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load configuration from a file. Relative database paths resolve
    /// against the directory the file lives in.
    pub fn load_from_path(path: &Path) -> AppResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "read_config")
                .with_context("path", path.display().to_string())
        })?;
        let mut config = Self::from_toml_str(&contents)
            .map_err(|err| err.with_context("path", path.display().to_string()))?;

        if let Some(base) = path.parent() {
            for side in [&mut config.source, &mut config.destination] {
                if let Some(db) = side.path.as_mut() {
                    if db.is_relative() {
                        *db = base.join(&*db);
                    }
                }
            }
        }
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn auto_resolve_duplicates(&self) -> bool {
        self.options.auto_resolve_urlrewrite_duplicates
    }

    pub fn bulk_size(&self) -> usize {
        self.options.bulk_size
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BULK_SIZE..=MAX_BULK_SIZE).contains(&self.options.bulk_size) {
            return Err(ConfigError::BulkSize(self.options.bulk_size));
        }
        for prefix in [&self.source.prefix, &self.destination.prefix] {
            if !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(ConfigError::InvalidPrefix(prefix.clone()));
            }
        }
        Ok(())
    }

    pub fn source_db(&self) -> Result<&Path, ConfigError> {
        self.source
            .path
            .as_deref()
            .ok_or(ConfigError::MissingPath { side: "source" })
    }

    pub fn destination_db(&self) -> Result<&Path, ConfigError> {
        self.destination
            .path
            .as_deref()
            .ok_or(ConfigError::MissingPath {
                side: "destination",
            })
    }
}
