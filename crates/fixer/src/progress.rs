//! Progress reporting and warning collection for a single repair run.

use crate::types::LogLevel;
use crate::ProgressCallback;

/// Forwards messages to the caller's progress callback and to `tracing`,
/// and keeps the list of recorded warnings.
pub struct Reporter<'a> {
    progress: &'a ProgressCallback,
    warnings: Vec<String>,
}

impl<'a> Reporter<'a> {
    pub fn new(progress: &'a ProgressCallback) -> Self {
        Self {
            progress,
            warnings: Vec::new(),
        }
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{message}");
        (self.progress)(message, LogLevel::Info);
    }

    pub fn success(&self, message: &str) {
        tracing::info!("{message}");
        (self.progress)(message, LogLevel::Success);
    }

    /// Record a recoverable inconsistency. Each call adds exactly one warning
    /// to the outcome.
    pub fn warning(&mut self, message: String) {
        tracing::warn!("{message}");
        (self.progress)(&message, LogLevel::Warning);
        self.warnings.push(message);
    }

    /// Report detail at warning level without recording a new warning.
    pub fn detail(&self, message: &str) {
        tracing::warn!("{message}");
        (self.progress)(message, LogLevel::Warning);
    }

    pub fn error(&self, message: &str) {
        tracing::error!("{message}");
        (self.progress)(message, LogLevel::Error);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}
