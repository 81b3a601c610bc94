//! Type definitions for worksheet repair.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use ts_rs::TS;

/// Folder holding one JSON record per page.
pub const PAGES_DIR: &str = "pages/";

/// Folder holding embedded images.
pub const IMAGES_DIR: &str = "images/";

/// Ordered list of visible page ids.
pub const PAGE_INDEX_PATH: &str = "pages.json";

/// Worksheet metadata record.
pub const META_PATH: &str = "worksheet.json";

/// Title given to placeholder records replacing unreadable pages.
pub const CORRUPTED_PAGE_TITLE: &str = "Corrupted page file";

/// Editor widget that cannot be saved back into a page.
pub const DEFAULT_DISALLOWED_SELECTOR: &str = r#"[data-js="mathEditor"]"#;

/// Individual entry within an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Entry {
    /// Path of the entry within the archive
    pub name: String,

    /// Uncompressed size in bytes
    #[ts(type = "number")]
    pub size: u64,

    /// Whether this entry is a directory marker (trailing `/`)
    pub is_directory: bool,
}

/// Every entry of an archive, in the order the archive lists them.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl Directory {
    /// Build a directory from entries. A repeated path keeps its last entry.
    pub fn new(entries: Vec<Entry>) -> Self {
        let mut directory = Self::default();
        for entry in entries {
            match directory.by_name.get(&entry.name) {
                Some(&idx) => directory.entries[idx] = entry,
                None => {
                    directory
                        .by_name
                        .insert(entry.name.clone(), directory.entries.len());
                    directory.entries.push(entry);
                }
            }
        }
        directory
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Whether a folder exists, either as a directory marker or as the prefix
    /// of any stored path.
    pub fn has_folder(&self, folder: &str) -> bool {
        self.contains(folder) || self.entries.iter().any(|e| e.name.starts_with(folder))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Page ids of every `pages/<id>.json` entry, in archive order.
    pub fn page_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| page_id_from_path(&e.name))
            .map(str::to_string)
            .collect()
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

/// Extract the page id from a `pages/<id>.json` path.
///
/// Only direct children of `pages/` count; nested paths and an empty stem do
/// not name a page.
///
/// # Examples
///
/// ```
/// use fixer::types::page_id_from_path;
///
/// assert_eq!(page_id_from_path("pages/abc.json"), Some("abc"));
/// assert_eq!(page_id_from_path("pages/nested/abc.json"), None);
/// assert_eq!(page_id_from_path("pages/abc.txt"), None);
/// ```
pub fn page_id_from_path(path: &str) -> Option<&str> {
    let stem = path.strip_prefix(PAGES_DIR)?.strip_suffix(".json")?;
    if stem.is_empty() || stem.contains('/') {
        return None;
    }
    Some(stem)
}

pub fn is_page_path(path: &str) -> bool {
    page_id_from_path(path).is_some()
}

pub fn is_image_path(path: &str) -> bool {
    path.starts_with(IMAGES_DIR)
}

/// One page of the worksheet, as persisted at `pages/<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub length: u64,
}

impl PageRecord {
    /// Minimal record standing in for a page that could not be read.
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: CORRUPTED_PAGE_TITLE.to_string(),
            content: " ".to_string(),
            length: 1,
        }
    }
}

/// Ordered page ids persisted at `pages.json`.
pub type PageIndex = Vec<String>;

/// Open metadata mapping persisted at `worksheet.json`.
pub type WorksheetMeta = Map<String, Value>;

/// Decisions to regenerate the index or the metadata instead of copying them.
///
/// Flags only ever go from `false` to `true` during one repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildFlags {
    index: bool,
    meta: bool,
}

impl RebuildFlags {
    pub fn require_index(&mut self) {
        self.index = true;
    }

    pub fn require_meta(&mut self) {
        self.meta = true;
    }

    pub fn needs_index(&self) -> bool {
        self.index
    }

    pub fn needs_meta(&self) -> bool {
        self.meta
    }
}

/// Severity attached to a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Overall result of a repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Nothing needed fixing.
    Success,
    /// Issues were found and a repaired archive is available.
    Warning,
    /// The archive cannot be repaired.
    Error,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Record returned by every repair run.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub classification: Classification,

    /// Every recoverable inconsistency found, in detection order
    pub warnings: Vec<String>,

    /// Message of the fatal error, set only for `Classification::Error`
    #[ts(optional)]
    pub error: Option<String>,

    /// Repaired archive bytes, absent on fatal error
    #[serde(skip)]
    pub artifact: Option<Vec<u8>>,

    /// Directory of the input archive
    pub entries: Vec<Entry>,

    /// Page index as recovered from the input, if it parsed
    #[ts(optional)]
    pub page_index: Option<PageIndex>,

    /// Metadata as recovered from the input, if it parsed
    #[ts(type = "Record<string, unknown> | null")]
    pub meta: Option<WorksheetMeta>,
}

impl Outcome {
    /// Outcome of a run that stopped on a terminal error.
    pub fn failed(error: String, warnings: Vec<String>, entries: Vec<Entry>) -> Self {
        Self {
            classification: Classification::Error,
            warnings,
            error: Some(error),
            artifact: None,
            entries,
            page_index: None,
            meta: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.classification == Classification::Error
    }
}

/// Values written into a regenerated `worksheet.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetaDefaults {
    pub title: String,
    pub description: String,
    pub author: String,
    pub latest_version: String,
    pub theme: String,
}

impl Default for MetaDefaults {
    fn default() -> Self {
        Self {
            title: "Korjattu työkirja".to_string(),
            description: String::new(),
            author: "LMAFix".to_string(),
            latest_version: "r1.10.0".to_string(),
            theme: "light".to_string(),
        }
    }
}

/// Options for repairing an archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepairOptions {
    /// Elements matching this selector are stripped from page content
    pub disallowed_selector: String,

    /// Deflate level for page, index and metadata records (0 stores)
    pub page_compression: u8,

    /// Deflate level for images; they are already compressed
    pub image_compression: u8,

    /// Values used when the metadata has to be regenerated
    pub meta_defaults: MetaDefaults,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            disallowed_selector: DEFAULT_DISALLOWED_SELECTOR.to_string(),
            page_compression: 9,
            image_compression: 0,
            meta_defaults: MetaDefaults::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size: u64) -> Entry {
        Entry {
            name: name.to_string(),
            size,
            is_directory: name.ends_with('/'),
        }
    }

    #[test]
    fn test_directory_lookup() {
        let dir = Directory::new(vec![
            entry("pages/", 0),
            entry("pages/a.json", 10),
            entry("images/x.png", 200),
        ]);

        assert_eq!(dir.len(), 3);
        assert!(dir.contains("pages/a.json"));
        assert_eq!(dir.get("images/x.png").map(|e| e.size), Some(200));
        assert!(dir.get("pages.json").is_none());
    }

    #[test]
    fn test_directory_folder_detection() {
        let marker_only = Directory::new(vec![entry("images/", 0)]);
        assert!(marker_only.has_folder(IMAGES_DIR));
        assert!(!marker_only.has_folder(PAGES_DIR));

        let prefix_only = Directory::new(vec![entry("pages/a.json", 4)]);
        assert!(prefix_only.has_folder(PAGES_DIR));
    }

    #[test]
    fn test_directory_keeps_last_duplicate() {
        let dir = Directory::new(vec![entry("pages/a.json", 1), entry("pages/a.json", 7)]);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get("pages/a.json").map(|e| e.size), Some(7));
    }

    #[test]
    fn test_page_ids_in_archive_order() {
        let dir = Directory::new(vec![
            entry("pages/b.json", 1),
            entry("pages/", 0),
            entry("pages/a.json", 1),
            entry("pages/notes.txt", 1),
            entry("pages/sub/c.json", 1),
        ]);
        assert_eq!(dir.page_ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_page_paths() {
        assert!(is_page_path("pages/p1.json"));
        assert!(!is_page_path("pages/.json"));
        assert!(!is_page_path("pages.json"));
        assert!(is_image_path("images/a.png"));
        assert!(!is_image_path("imagesa.png"));
    }

    #[test]
    fn test_rebuild_flags_only_set() {
        let mut flags = RebuildFlags::default();
        assert!(!flags.needs_index());
        assert!(!flags.needs_meta());

        flags.require_index();
        flags.require_index();
        assert!(flags.needs_index());
        assert!(!flags.needs_meta());

        flags.require_meta();
        assert!(flags.needs_meta());
    }

    #[test]
    fn test_placeholder_record() {
        let record = PageRecord::placeholder("x");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "x");
        assert_eq!(json["title"], CORRUPTED_PAGE_TITLE);
        assert_eq!(json["content"], " ");
        assert_eq!(json["length"], 1);
    }

    #[test]
    fn test_options_deserialize_partial() {
        let options: RepairOptions =
            serde_json::from_str(r#"{"imageCompression": 3, "metaDefaults": {"author": "me"}}"#)
                .unwrap();
        assert_eq!(options.image_compression, 3);
        assert_eq!(options.page_compression, 9);
        assert_eq!(options.meta_defaults.author, "me");
        assert_eq!(options.meta_defaults.theme, "light");
        assert_eq!(options.disallowed_selector, DEFAULT_DISALLOWED_SELECTOR);
    }
}
