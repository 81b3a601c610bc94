//! Archive reading: directory listing and selective extraction.

use crate::error::RepairError;
use crate::types::{Directory, Entry};
use std::io::{self, Cursor, Read};
use zip::ZipArchive;

/// Streaming reader over an in-memory worksheet archive.
///
/// The directory is read once when the reader is opened. Entry contents are
/// only inflated on request, one entry at a time.
pub struct ArchiveReader<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    directory: Directory,
}

impl<'a> ArchiveReader<'a> {
    /// Open an archive from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `RepairError::MalformedContainer` if the bytes do not hold a
    /// readable central directory.
    pub fn open(bytes: &'a [u8]) -> Result<Self, RepairError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| RepairError::MalformedContainer(e.to_string()))?;
        let directory = list_entries(&mut archive)?;

        tracing::debug!(entries = directory.len(), "Read archive directory");

        Ok(Self { archive, directory })
    }

    /// The directory read when the archive was opened.
    pub fn list_directory(&self) -> &Directory {
        &self.directory
    }

    /// Inflate one named entry.
    ///
    /// Returns `None` when the entry does not exist or cannot be decoded;
    /// absence is an expected answer for most callers.
    pub fn extract(&mut self, name: &str) -> Option<Vec<u8>> {
        if !self.directory.contains(name) {
            return None;
        }
        match self.read_entry(name) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(entry = name, error = %e, "Failed to decode entry");
                None
            }
        }
    }

    /// Inflate every entry whose path satisfies `predicate`, in archive order.
    ///
    /// Entries are decoded independently: one that fails to decode is left
    /// out of the result and does not stop the others. Directory markers are
    /// skipped.
    pub fn extract_matching<F>(&mut self, predicate: F) -> Vec<(String, Vec<u8>)>
    where
        F: Fn(&str) -> bool,
    {
        let names: Vec<String> = self
            .directory
            .iter()
            .filter(|e| !e.is_directory && predicate(&e.name))
            .map(|e| e.name.clone())
            .collect();

        let mut extracted = Vec::with_capacity(names.len());
        for name in names {
            match self.read_entry(&name) {
                Ok(data) => extracted.push((name, data)),
                Err(e) => {
                    tracing::warn!(entry = %name, error = %e, "Skipping undecodable entry");
                }
            }
        }
        extracted
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, RepairError> {
        let mut file = self
            .archive
            .by_name(name)
            .map_err(|e| RepairError::MalformedContainer(e.to_string()))?;
        let mut data = Vec::with_capacity(capacity_hint(file.size()));
        // io::copy inflates in fixed-size chunks; the CRC is checked at EOF.
        io::copy(&mut file, &mut data)?;
        Ok(data)
    }
}

/// List the directory of an archive without reading entry contents.
///
/// # Errors
///
/// Returns `RepairError::MalformedContainer` if the bytes are not an archive.
pub fn list_directory(bytes: &[u8]) -> Result<Directory, RepairError> {
    ArchiveReader::open(bytes).map(|reader| reader.directory)
}

fn list_entries<R>(archive: &mut ZipArchive<R>) -> Result<Directory, RepairError>
where
    R: Read + io::Seek,
{
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| RepairError::MalformedContainer(e.to_string()))?;

        entries.push(Entry {
            name: entry.name().to_string(),
            size: entry.size(),
            is_directory: entry.is_dir(),
        });
    }

    Ok(Directory::new(entries))
}

// Declared sizes come from untrusted headers.
fn capacity_hint(declared: u64) -> usize {
    const MAX_PREALLOC: u64 = 16 * 1024 * 1024;
    declared.min(MAX_PREALLOC) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};
    use zip::CompressionMethod;

    fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in files {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content).unwrap();
            }
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_list_directory() {
        let bytes = build_zip(&[
            ("pages/", b""),
            ("pages/a.json", b"{}"),
            ("pages.json", b"[\"a\"]"),
        ]);
        let dir = list_directory(&bytes).unwrap();

        assert_eq!(dir.len(), 3);
        assert!(dir.get("pages/").unwrap().is_directory);
        assert_eq!(dir.get("pages.json").unwrap().size, 5);
    }

    #[test]
    fn test_list_directory_rejects_garbage() {
        let result = list_directory(b"definitely not an archive");
        assert!(matches!(result, Err(RepairError::MalformedContainer(_))));
    }

    #[test]
    fn test_extract_missing_entry() {
        let bytes = build_zip(&[("pages/a.json", b"{}")]);
        let mut reader = ArchiveReader::open(&bytes).unwrap();

        assert_eq!(reader.extract("pages/a.json").as_deref(), Some(&b"{}"[..]));
        assert!(reader.extract("worksheet.json").is_none());
    }

    #[test]
    fn test_extract_matching_keeps_archive_order() {
        let bytes = build_zip(&[
            ("pages/b.json", b"B"),
            ("images/", b""),
            ("images/x.png", b"PNG"),
            ("pages/a.json", b"A"),
        ]);
        let mut reader = ArchiveReader::open(&bytes).unwrap();

        let pages = reader.extract_matching(|name| name.starts_with("pages/"));
        let names: Vec<&str> = pages.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["pages/b.json", "pages/a.json"]);

        let images = reader.extract_matching(|name| name.starts_with("images/"));
        assert_eq!(images, vec![("images/x.png".to_string(), b"PNG".to_vec())]);
    }

    #[test]
    fn test_undecodable_entry_is_isolated() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let files: [(&str, &[u8]); 2] = [("pages/a.json", b"AAAA"), ("pages/b.json", b"BROKEN")];
        for (name, content) in files {
            zip.start_file(name, stored).unwrap();
            zip.write_all(content).unwrap();
        }
        let mut bytes = zip.finish().unwrap().into_inner();

        // Stored payloads sit verbatim in the archive; a flipped byte fails the CRC.
        let at = bytes.windows(6).position(|w| w == b"BROKEN").unwrap();
        bytes[at] ^= 0xff;

        let mut reader = ArchiveReader::open(&bytes).unwrap();
        assert!(reader.list_directory().contains("pages/b.json"));
        assert!(reader.extract("pages/b.json").is_none());

        let pages = reader.extract_matching(|name| name.starts_with("pages/"));
        assert_eq!(pages, vec![("pages/a.json".to_string(), b"AAAA".to_vec())]);
    }

    #[test]
    fn test_capacity_hint_is_bounded() {
        assert_eq!(capacity_hint(10), 10);
        assert_eq!(capacity_hint(u64::MAX), 16 * 1024 * 1024);
    }
}
