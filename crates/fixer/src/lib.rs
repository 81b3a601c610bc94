//! # Fixer
//!
//! Consistency validation and repair for worksheet archives.
//!
//! A worksheet is a ZIP archive holding one JSON record per page under
//! `pages/`, a page index at `pages.json`, metadata at `worksheet.json` and
//! images under `images/`. Editors crashing mid-save leave these out of sync;
//! this library cross-checks them, strips editor widgets that cannot be saved
//! back, and writes a corrected archive.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fixer::{repair, Classification, LogLevel};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("worksheet.lma")?;
//! let outcome = repair(&bytes, &|message: &str, level: LogLevel| {
//!     println!("[{:?}] {}", level, message);
//! });
//!
//! match outcome.classification {
//!     Classification::Error => eprintln!("Cannot fix: {:?}", outcome.error),
//!     _ => {
//!         for warning in &outcome.warnings {
//!             println!("fixed: {}", warning);
//!         }
//!         if let Some(artifact) = &outcome.artifact {
//!             std::fs::write("worksheet_fixed.lma", artifact)?;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod progress;
pub mod reader;
pub mod repair;
pub mod sanitize;
pub mod types;
pub mod validate;
pub mod writer;

// Re-export main types
pub use error::RepairError;
pub use repair::Repairer;
pub use sanitize::{Sanitized, Sanitizer};
pub use types::{
    Classification, Directory, Entry, LogLevel, MetaDefaults, Outcome, PageIndex, PageRecord,
    RebuildFlags, RepairOptions, WorksheetMeta,
};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Type alias for progress callback functions.
///
/// The callback receives a human-readable message and its severity. Every
/// warning recorded in the outcome is also reported here at
/// `LogLevel::Warning`.
pub type ProgressCallback = dyn Fn(&str, LogLevel) + Send + Sync;

/// Repair an archive with default options.
///
/// # Arguments
///
/// * `archive` - Raw bytes of the worksheet archive
/// * `on_progress` - Callback receiving progress messages
///
/// # Returns
///
/// Returns an `Outcome`. Content problems never panic or return early: an
/// unrepairable archive yields `Classification::Error` and no artifact.
pub fn repair(archive: &[u8], on_progress: &ProgressCallback) -> Outcome {
    Repairer::default().repair(archive, on_progress, Arc::new(AtomicBool::new(false)))
}

/// List the entries of an archive without repairing it.
///
/// # Errors
///
/// Returns `RepairError::MalformedContainer` if the bytes are not an archive.
pub fn inspect(archive: &[u8]) -> Result<Directory, RepairError> {
    reader::list_directory(archive)
}
