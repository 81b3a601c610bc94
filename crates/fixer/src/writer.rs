//! Archive writing for the repaired worksheet.

use crate::error::RepairError;
use std::io::{Cursor, Write};
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

/// Highest accepted compression level.
pub const MAX_COMPRESSION_LEVEL: u8 = 9;

const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming writer assembling an archive in memory.
///
/// Entries can be added in any order. Any encode failure is terminal: a
/// writer that returned an error must be dropped, its buffer is unusable.
pub struct ArchiveWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    entries: usize,
}

impl ArchiveWriter {
    pub fn open() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            entries: 0,
        }
    }

    /// Store one entry. Level 0 stores the bytes as-is, 1..=9 deflates.
    ///
    /// # Errors
    ///
    /// Returns `RepairError::InvalidOption` for a level above 9 and
    /// `RepairError::EncodeFailure` if the entry cannot be written.
    pub fn add_entry(&mut self, name: &str, bytes: &[u8], level: u8) -> Result<(), RepairError> {
        let options = entry_options(level)?;

        self.zip
            .start_file(name, options)
            .map_err(|e| encode_failure(name, e))?;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            self.zip
                .write_all(chunk)
                .map_err(|e| encode_failure(name, e))?;
        }
        self.entries += 1;

        tracing::debug!(entry = name, bytes = bytes.len(), level, "Added entry");
        Ok(())
    }

    /// Store a directory marker. `name` must end with `/`.
    pub fn add_directory(&mut self, name: &str) -> Result<(), RepairError> {
        self.zip
            .add_directory(name, SimpleFileOptions::default())
            .map_err(|e| encode_failure(name, e))?;
        self.entries += 1;
        Ok(())
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Write the central directory and return the archive bytes.
    pub fn finish(self) -> Result<Vec<u8>, RepairError> {
        let cursor = self
            .zip
            .finish()
            .map_err(|e| RepairError::EncodeFailure(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::open()
    }
}

/// Check that a level can be used for an entry.
pub fn validate_level(level: u8) -> Result<(), RepairError> {
    if level > MAX_COMPRESSION_LEVEL {
        return Err(RepairError::InvalidOption(format!(
            "compression level {level} is outside 0..={MAX_COMPRESSION_LEVEL}"
        )));
    }
    Ok(())
}

fn entry_options(level: u8) -> Result<SimpleFileOptions, RepairError> {
    validate_level(level)?;
    let options = match level {
        0 => SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        level => SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(i64::from(level))),
    };
    Ok(options)
}

fn encode_failure(name: &str, err: impl std::fmt::Display) -> RepairError {
    RepairError::EncodeFailure(format!("{name}: {err}"))
}
