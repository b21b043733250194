//! Migration of legacy URL rewrites into the unified `url_rewrite` schema.
//!
//! The crate exposes one step, [`url_rewrite::UrlRewriteStep`], driven
//! through the four-phase [`step::Step`] protocol by the `urlmigrate` binary.

pub mod config;
pub mod db;
mod error;
pub mod logging;
pub mod progress;
pub mod resource;
pub mod schema;
pub mod step;
pub mod url_rewrite;

pub use error::{AppError, AppResult};
