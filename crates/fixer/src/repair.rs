//! Rebuilding a worksheet archive from a validated input.

use crate::error::RepairError;
use crate::progress::Reporter;
use crate::reader::ArchiveReader;
use crate::sanitize::Sanitizer;
use crate::types::{
    is_image_path, is_page_path, page_id_from_path, Classification, Entry, MetaDefaults,
    Outcome, PageRecord, RebuildFlags, RepairOptions, IMAGES_DIR, META_PATH, PAGES_DIR,
    PAGE_INDEX_PATH,
};
use crate::validate::{validate, Validation};
use crate::writer::{validate_level, ArchiveWriter};
use crate::ProgressCallback;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Reusable repair engine.
///
/// Holds only validated configuration, so one instance can serve any number
/// of independent repairs, including concurrent ones.
#[derive(Debug, Clone)]
pub struct Repairer {
    options: RepairOptions,
    sanitizer: Sanitizer,
}

impl Repairer {
    /// Build an engine from options.
    ///
    /// # Errors
    ///
    /// Returns `RepairError::InvalidSelector` or `RepairError::InvalidOption`
    /// if the options cannot be used.
    pub fn new(options: RepairOptions) -> Result<Self, RepairError> {
        validate_level(options.page_compression)?;
        validate_level(options.image_compression)?;
        let sanitizer = Sanitizer::new(&options.disallowed_selector)?;
        Ok(Self { options, sanitizer })
    }

    /// Check an archive and build its repaired copy.
    ///
    /// Problems with the archive never surface as `Err`: they are reported
    /// through the returned outcome. Setting `cancel_flag` stops the run at
    /// the next entry and discards everything written so far.
    pub fn repair(
        &self,
        bytes: &[u8],
        progress: &ProgressCallback,
        cancel_flag: Arc<AtomicBool>,
    ) -> Outcome {
        let mut reporter = Reporter::new(progress);

        let mut reader = match ArchiveReader::open(bytes) {
            Ok(reader) => reader,
            Err(e) => return fail(e, reporter, Vec::new()),
        };
        let entries: Vec<_> = reader.list_directory().iter().cloned().collect();
        reporter.info(&format!("Archive contains {} entries", entries.len()));

        match self.rebuild(&mut reader, &mut reporter, &cancel_flag) {
            Ok((artifact, validation)) => {
                let warnings = reporter.into_warnings();
                let classification = if warnings.is_empty() {
                    Classification::Success
                } else {
                    Classification::Warning
                };
                tracing::info!(%classification, warnings = warnings.len(), "Repair finished");

                Outcome {
                    classification,
                    warnings,
                    error: None,
                    artifact: Some(artifact),
                    entries,
                    page_index: validation.page_index,
                    meta: validation.meta,
                }
            }
            Err(e) => fail(e, reporter, entries),
        }
    }

    fn rebuild(
        &self,
        reader: &mut ArchiveReader<'_>,
        reporter: &mut Reporter<'_>,
        cancel_flag: &AtomicBool,
    ) -> Result<(Vec<u8>, Validation), RepairError> {
        let mut validation = validate(reader, reporter)?;
        check_cancelled(cancel_flag)?;

        let mut writer = ArchiveWriter::open();

        reporter.info("Copying pages over...");
        let page_ids = self.write_pages(
            reader,
            &mut writer,
            &mut validation.flags,
            reporter,
            cancel_flag,
        )?;

        reporter.info("Copying images over...");
        self.write_images(reader, &mut writer, reporter, cancel_flag)?;

        if validation.flags.needs_meta() {
            reporter.info("Rebuilding metadata...");
            let meta = default_meta(&self.options.meta_defaults)?;
            writer.add_entry(META_PATH, &meta, self.options.page_compression)?;
        } else {
            reporter.info("Copying metadata...");
            let raw = reader
                .extract(META_PATH)
                .unwrap_or_else(|| b"{}".to_vec());
            writer.add_entry(META_PATH, &raw, self.options.page_compression)?;
        }

        if validation.flags.needs_index() {
            reporter.info("Rebuilding page index...");
            let index = serde_json::to_vec(&page_ids)
                .map_err(|e| RepairError::EncodeFailure(e.to_string()))?;
            writer.add_entry(PAGE_INDEX_PATH, &index, self.options.page_compression)?;
        } else {
            reporter.info("Copying page index...");
            let raw = reader
                .extract(PAGE_INDEX_PATH)
                .unwrap_or_else(|| b"[]".to_vec());
            writer.add_entry(PAGE_INDEX_PATH, &raw, self.options.page_compression)?;
        }

        check_cancelled(cancel_flag)?;
        let artifact = writer.finish()?;
        Ok((artifact, validation))
    }

    /// Write every page record and return the ids written, in archive order.
    ///
    /// Files under `pages/` that do not name a page are left out of the
    /// output with a warning.
    fn write_pages(
        &self,
        reader: &mut ArchiveReader<'_>,
        writer: &mut ArchiveWriter,
        flags: &mut RebuildFlags,
        reporter: &mut Reporter<'_>,
        cancel_flag: &AtomicBool,
    ) -> Result<Vec<String>, RepairError> {
        let page_paths: Vec<String> = reader
            .list_directory()
            .iter()
            .filter(|e| !e.is_directory && e.name.starts_with(PAGES_DIR))
            .map(|e| e.name.clone())
            .collect();
        let mut decoded: HashMap<String, Vec<u8>> =
            reader.extract_matching(is_page_path).into_iter().collect();

        let mut page_ids = Vec::with_capacity(page_paths.len());
        for path in page_paths {
            check_cancelled(cancel_flag)?;
            let Some(id) = page_id_from_path(&path) else {
                reporter.warning(format!("Skipped {path}: not a page record"));
                continue;
            };

            let record = match decoded.remove(&path) {
                Some(raw) => self.fix_page(id, &path, raw, flags, reporter)?,
                None => {
                    flags.require_index();
                    reporter.warning(format!(
                        "Page {path} is corrupted: entry could not be decompressed"
                    ));
                    placeholder(id)?
                }
            };

            writer.add_entry(&path, &record, self.options.page_compression)?;
            page_ids.push(id.to_string());
        }

        tracing::debug!(pages = page_ids.len(), "Pages written");
        Ok(page_ids)
    }

    /// Check one page record and return the bytes to store for it.
    fn fix_page(
        &self,
        id: &str,
        path: &str,
        raw: Vec<u8>,
        flags: &mut RebuildFlags,
        reporter: &mut Reporter<'_>,
    ) -> Result<Vec<u8>, RepairError> {
        let mut record = match parse_page(&raw) {
            Ok(record) => record,
            Err(reason) => {
                flags.require_index();
                reporter.warning(format!("Page {path} is corrupted: {reason}"));
                return placeholder(id);
            }
        };
        let mut changed = false;

        let stored_id = record.get("id").cloned().unwrap_or(Value::Null);
        if stored_id.as_str() != Some(id) {
            flags.require_index();
            reporter.warning(format!("Page {path} id mismatch ({stored_id}), fixing"));
            record.insert("id".to_string(), Value::from(id));
            changed = true;
        }

        let sanitized = match record.get("content") {
            Some(Value::String(content)) if !content.is_empty() => {
                Some(self.sanitizer.sanitize(content))
            }
            _ => None,
        };
        if let Some(sanitized) = sanitized.filter(|s| s.changed) {
            reporter.warning(format!(
                "Page {id} contains non-allowed or non-saveable elements"
            ));
            for element in &sanitized.removed {
                reporter.detail(&format!("Removing {element}"));
            }
            record.insert("content".to_string(), Value::String(sanitized.html));
            changed = true;
        }

        if !changed {
            return Ok(raw);
        }
        serde_json::to_vec(&record).map_err(|e| RepairError::EncodeFailure(e.to_string()))
    }

    fn write_images(
        &self,
        reader: &mut ArchiveReader<'_>,
        writer: &mut ArchiveWriter,
        reporter: &mut Reporter<'_>,
        cancel_flag: &AtomicBool,
    ) -> Result<(), RepairError> {
        let (folders, files): (Vec<_>, Vec<_>) = reader
            .list_directory()
            .iter()
            .filter(|e| is_image_path(&e.name))
            .map(|e| (e.name.clone(), e.is_directory))
            .partition(|(_, is_directory)| *is_directory);

        for (folder, _) in &folders {
            writer.add_directory(folder)?;
        }

        let mut decoded: HashMap<String, Vec<u8>> =
            reader.extract_matching(is_image_path).into_iter().collect();
        let mut copied = 0usize;
        for (path, _) in files {
            check_cancelled(cancel_flag)?;
            match decoded.remove(&path) {
                Some(raw) => {
                    writer.add_entry(&path, &raw, self.options.image_compression)?;
                    copied += 1;
                }
                None => {
                    reporter.warning(format!("Image {path} could not be read, skipped"));
                }
            }
        }

        // Keep the folder even when every image was missing or unreadable.
        if folders.is_empty() && copied == 0 {
            writer.add_directory(IMAGES_DIR)?;
        }

        reporter.info(&format!("Added {copied} images"));
        Ok(())
    }
}

impl Default for Repairer {
    fn default() -> Self {
        Self {
            options: RepairOptions::default(),
            sanitizer: Sanitizer::default(),
        }
    }
}

/// Decode a page record: a JSON object with a `content` field.
fn parse_page(raw: &[u8]) -> Result<Map<String, Value>, String> {
    match serde_json::from_slice::<Value>(raw).map_err(|e| e.to_string())? {
        Value::Object(map) if map.contains_key("content") => Ok(map),
        _ => Err("Page JSON is invalid".to_string()),
    }
}

fn placeholder(id: &str) -> Result<Vec<u8>, RepairError> {
    serde_json::to_vec(&PageRecord::placeholder(id))
        .map_err(|e| RepairError::EncodeFailure(e.to_string()))
}

/// Fresh metadata written when the original cannot be trusted.
fn default_meta(defaults: &MetaDefaults) -> Result<Vec<u8>, RepairError> {
    let created = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| RepairError::EncodeFailure(e.to_string()))?;
    let meta = json!({
        "title": defaults.title,
        "description": defaults.description,
        "author": defaults.author,
        "latestVersion": defaults.latest_version,
        "created": created,
        "theme": defaults.theme,
        "bookmarks": [],
    });
    serde_json::to_vec(&meta).map_err(|e| RepairError::EncodeFailure(e.to_string()))
}

fn check_cancelled(cancel_flag: &AtomicBool) -> Result<(), RepairError> {
    if cancel_flag.load(Ordering::Relaxed) {
        return Err(RepairError::Cancelled);
    }
    Ok(())
}

fn fail(err: RepairError, reporter: Reporter<'_>, entries: Vec<Entry>) -> Outcome {
    let message = err.to_string();
    reporter.error(&message);
    Outcome::failed(message, reporter.into_warnings(), entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page() {
        assert!(parse_page(br#"{"id":"a","content":"<p>x</p>"}"#).is_ok());
        assert_eq!(
            parse_page(br#"{"id":"a","title":"no content"}"#).unwrap_err(),
            "Page JSON is invalid"
        );
        assert!(parse_page(b"[]").is_err());
        assert!(parse_page(b"\xff\xfe").is_err());
    }

    #[test]
    fn test_default_meta_shape() {
        let raw = default_meta(&MetaDefaults::default()).unwrap();
        let meta: Value = serde_json::from_slice(&raw).unwrap();

        assert_eq!(meta["author"], "LMAFix");
        assert_eq!(meta["theme"], "light");
        assert_eq!(meta["bookmarks"], json!([]));
        let created = meta["created"].as_str().unwrap();
        assert!(OffsetDateTime::parse(created, &Rfc3339).is_ok());
    }

    #[test]
    fn test_rejects_bad_options() {
        let options = RepairOptions {
            page_compression: 10,
            ..RepairOptions::default()
        };
        assert!(matches!(
            Repairer::new(options),
            Err(RepairError::InvalidOption(_))
        ));

        let options = RepairOptions {
            disallowed_selector: "[[".to_string(),
            ..RepairOptions::default()
        };
        assert!(matches!(
            Repairer::new(options),
            Err(RepairError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_cancel_flag() {
        let flag = AtomicBool::new(false);
        assert!(check_cancelled(&flag).is_ok());
        flag.store(true, Ordering::Relaxed);
        assert!(matches!(check_cancelled(&flag), Err(RepairError::Cancelled)));
    }
}
