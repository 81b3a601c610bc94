//! Error types for worksheet repair operations.

use thiserror::Error;

/// Main error type for repair operations.
///
/// Only terminal conditions live here. Mismatches between the index, the
/// metadata and the page entries are recorded as warnings and never surface
/// as a `RepairError`.
#[derive(Debug, Error)]
pub enum RepairError {
    /// The archive lacks what is needed to rebuild a worksheet.
    #[error("Fatal: {0}")]
    FatalStructure(String),

    /// The input bytes are not a readable archive.
    #[error("Malformed archive: {0}")]
    MalformedContainer(String),

    /// Assembling the output archive failed.
    #[error("Failed to encode archive: {0}")]
    EncodeFailure(String),

    /// The configured disallowed-element selector does not parse.
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// An option is outside of its accepted range.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// An I/O error occurred while reading or writing entry data.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The repair was cancelled by the caller.
    #[error("Cancelled by user")]
    Cancelled,
}
