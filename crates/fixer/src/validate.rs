//! Consistency checks between the directory, the page index and the metadata.
//!
//! Checks run in a fixed order. Each one either passes, records a warning and
//! sets a rebuild flag, or stops the repair with `RepairError::FatalStructure`.

use crate::error::RepairError;
use crate::progress::Reporter;
use crate::reader::ArchiveReader;
use crate::types::{
    PageIndex, RebuildFlags, WorksheetMeta, IMAGES_DIR, META_PATH, PAGES_DIR, PAGE_INDEX_PATH,
};
use serde_json::Value;
use std::collections::HashSet;

/// Metadata key naming the page the editor opens on.
pub const CURRENT_PAGE_KEY: &str = "currentPageId";

/// Everything the checks learned about the input archive.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub flags: RebuildFlags,

    /// Page index, when `pages.json` decoded to a list of ids
    pub page_index: Option<PageIndex>,

    /// Metadata, when `worksheet.json` decoded to a non-empty mapping
    pub meta: Option<WorksheetMeta>,

    /// Ids of every `pages/<id>.json` entry in archive order, whether or not
    /// the index lists them
    pub observed_ids: Vec<String>,
}

/// Run every check against an opened archive.
///
/// # Errors
///
/// Returns `RepairError::FatalStructure` when the archive has no page folder,
/// or when the folder holds no page records. Index entries alone cannot be
/// rebuilt into pages.
pub fn validate(
    reader: &mut ArchiveReader<'_>,
    reporter: &mut Reporter<'_>,
) -> Result<Validation, RepairError> {
    let directory = reader.list_directory();
    let mut validation = Validation {
        observed_ids: directory.page_ids(),
        ..Validation::default()
    };

    if directory.has_folder(IMAGES_DIR) {
        reporter.success("Worksheet has images/ folder");
    } else {
        reporter.warning("Worksheet does not have images/ folder".to_string());
    }

    if directory.has_folder(PAGES_DIR) {
        reporter.success("Worksheet has pages/ folder");
    } else {
        return Err(RepairError::FatalStructure(
            "Worksheet file does not have a pages/ folder".to_string(),
        ));
    }

    let has_meta = directory.contains(META_PATH);
    if has_meta {
        reporter.success("Worksheet has a metadata file");
    } else {
        validation.flags.require_meta();
        reporter.warning("Worksheet does not have a metadata file - needs rebuilding".to_string());
    }

    let has_index = directory.contains(PAGE_INDEX_PATH);
    if has_index {
        reporter.success("Worksheet has a page index file");
    } else {
        validation.flags.require_index();
        reporter.warning("Worksheet does not have a page index file - needs rebuilding".to_string());
    }

    if has_index {
        match reader.extract(PAGE_INDEX_PATH).map(|raw| parse_page_index(&raw)) {
            Some(Ok(index)) => {
                reporter.success("Page index is valid JSON. Cross-checking...");
                validation.page_index = Some(index);
            }
            Some(Err(reason)) => {
                validation.flags.require_index();
                reporter.warning(format!("Page index is invalid, needs rebuilding: {reason}"));
            }
            None => {
                validation.flags.require_index();
                reporter.warning("Page index could not be read, needs rebuilding".to_string());
            }
        }
    }

    if validation.observed_ids.is_empty() {
        return Err(RepairError::FatalStructure(
            "Worksheet does not contain any pages, there is nothing to fix.".to_string(),
        ));
    }

    if let Some(index) = &validation.page_index {
        cross_check(index, &validation.observed_ids, &mut validation.flags, reporter);
    }

    if has_meta {
        match reader.extract(META_PATH).map(|raw| parse_meta(&raw)) {
            Some(Ok(meta)) => {
                reporter.success("Metadata is valid JSON");
                validation.meta = Some(meta);
            }
            Some(Err(reason)) => {
                validation.flags.require_meta();
                reporter.warning(format!("Metadata is invalid, needs rebuilding: {reason}"));
            }
            None => {
                validation.flags.require_meta();
                reporter.warning("Metadata could not be read, needs rebuilding".to_string());
            }
        }
    }

    if let Some(current) = validation.meta.as_ref().and_then(|m| m.get(CURRENT_PAGE_KEY)) {
        match current_page_target(current) {
            CurrentPage::Unset => {}
            CurrentPage::Id(id) if validation.observed_ids.iter().any(|p| p == id) => {
                reporter.success("Current page index is valid");
            }
            CurrentPage::Id(id) => {
                validation.flags.require_meta();
                validation.flags.require_index();
                reporter.warning(format!("Current page index ({id}) points to a missing page"));
            }
            CurrentPage::Invalid => {
                validation.flags.require_meta();
                validation.flags.require_index();
                reporter.warning(format!(
                    "Current page index ({current}) points to a missing page"
                ));
            }
        }
    }

    Ok(validation)
}

/// Compare the index against the page entries in both directions.
fn cross_check(
    index: &[String],
    observed: &[String],
    flags: &mut RebuildFlags,
    reporter: &mut Reporter<'_>,
) {
    let observed_set: HashSet<&str> = observed.iter().map(String::as_str).collect();
    let mut listed: HashSet<&str> = HashSet::with_capacity(index.len());

    for id in index {
        if !observed_set.contains(id.as_str()) {
            flags.require_index();
            reporter.warning(format!("Missing page: {id}"));
        } else if !listed.insert(id.as_str()) {
            flags.require_index();
            reporter.warning(format!("Page listed more than once: {id}"));
        }
    }
    reporter.info("Done checking index against file list");

    let listed: HashSet<&str> = index.iter().map(String::as_str).collect();
    for id in observed {
        if !listed.contains(id.as_str()) {
            flags.require_index();
            reporter.warning(format!("Found hidden or deleted page: {id}"));
        }
    }
    reporter.info("Done checking file list against index");
}

/// Decode `pages.json`: a JSON list of page id strings.
pub fn parse_page_index(raw: &[u8]) -> Result<PageIndex, String> {
    serde_json::from_slice::<PageIndex>(raw).map_err(|e| e.to_string())
}

/// Decode `worksheet.json`: a non-empty JSON object.
pub fn parse_meta(raw: &[u8]) -> Result<WorksheetMeta, String> {
    match serde_json::from_slice::<Value>(raw).map_err(|e| e.to_string())? {
        Value::Object(map) if !map.is_empty() => Ok(map),
        _ => Err("Metadata is null or missing entries".to_string()),
    }
}

enum CurrentPage<'a> {
    Unset,
    Id(&'a str),
    Invalid,
}

// Falsy values mean no current page is selected.
fn current_page_target(value: &Value) -> CurrentPage<'_> {
    match value {
        Value::Null | Value::Bool(false) => CurrentPage::Unset,
        Value::String(s) if s.is_empty() => CurrentPage::Unset,
        Value::String(s) => CurrentPage::Id(s),
        _ => CurrentPage::Invalid,
    }
}
