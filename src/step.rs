//! The four-phase protocol every migration step follows.

use std::fmt;
use std::str::FromStr;

use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Integrity,
    Data,
    Volume,
    Rollback,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Integrity => "integrity",
            Stage::Data => "data",
            Stage::Volume => "volume",
            Stage::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "integrity" => Ok(Stage::Integrity),
            "data" => Ok(Stage::Data),
            "volume" => Ok(Stage::Volume),
            "rollback" => Ok(Stage::Rollback),
            other => Err(
                AppError::new("STEP/INVALID_STAGE", "Invalid step configuration")
                    .with_context("stage", other.to_string()),
            ),
        }
    }
}

/// Phases return `Ok(false)` for an expected failed check. `Err` is reserved
/// for conditions that must abort the run.
pub trait Step {
    fn name(&self) -> &'static str;
    fn integrity(&mut self) -> AppResult<bool>;
    fn data(&mut self) -> AppResult<bool>;
    fn volume(&mut self) -> AppResult<bool>;
    fn rollback(&mut self) -> AppResult<()>;

    fn perform(&mut self, stage: Stage) -> AppResult<bool> {
        match stage {
            Stage::Integrity => self.integrity(),
            Stage::Data => self.data(),
            Stage::Volume => self.volume(),
            Stage::Rollback => self.rollback().map(|()| true),
        }
    }
}
