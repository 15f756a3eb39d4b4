//! List Filter/Sort Engine
//!
//! [`derive`] turns the file collection and a [`ListViewConfig`] into the
//! sequence a list view shows. It is pure and deterministic; callers simply
//! re-run it whenever either input changes.
//!
//! Pipeline, in order: type filter, case-insensitive filename search, stable
//! sort. Ties keep the order of the base collection in both directions.
//! Filenames sort in CLDR root collation order, so accented letters sit with
//! their base letters.

use crate::api::{parse_upload_date, FileRecord};
use icu_collator::{Collator, CollatorOptions};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Coarse file type, derived from the filename extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Document,
    Image,
    Spreadsheet,
    Archive,
    Other,
}

impl FileCategory {
    /// Category for a filename; the extension is the text after the last `.`
    pub fn from_filename(filename: &str) -> Self {
        let extension = filename.rsplit('.').next().unwrap_or("").to_lowercase();
        Self::from_extension(&extension)
    }

    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "pdf" | "doc" | "docx" | "txt" => FileCategory::Document,
            "jpg" | "jpeg" | "png" => FileCategory::Image,
            "xls" | "xlsx" | "csv" => FileCategory::Spreadsheet,
            "zip" | "rar" => FileCategory::Archive,
            _ => FileCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Document => "document",
            FileCategory::Image => "image",
            FileCategory::Spreadsheet => "spreadsheet",
            FileCategory::Archive => "archive",
            FileCategory::Other => "other",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type filter of a list view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    All,
    Category(FileCategory),
}

impl TypeFilter {
    pub fn matches(&self, category: FileCategory) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Category(wanted) => *wanted == category,
        }
    }
}

impl FromStr for TypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s.to_lowercase().as_str() {
            "all" => return Ok(TypeFilter::All),
            "document" => FileCategory::Document,
            "image" => FileCategory::Image,
            "spreadsheet" => FileCategory::Spreadsheet,
            "archive" => FileCategory::Archive,
            "other" => FileCategory::Other,
            other => return Err(format!("unknown file type '{}'", other)),
        };
        Ok(TypeFilter::Category(category))
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::All => f.write_str("all"),
            TypeFilter::Category(category) => category.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Filename,
    Size,
    #[default]
    UploadDate,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "filename" | "name" => Ok(SortKey::Filename),
            "size" => Ok(SortKey::Size),
            "upload_date" | "date" => Ok(SortKey::UploadDate),
            other => Err(format!("unknown sort key '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "asc")]
    Ascending,
    #[default]
    #[serde(alias = "desc")]
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// View configuration of a file list
///
/// The default shows everything, newest upload first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListViewConfig {
    pub search_term: String,
    pub type_filter: TypeFilter,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
}

impl ListViewConfig {
    /// Column-header click: same key flips direction, a new key sorts ascending
    pub fn toggle_sort(&mut self, key: SortKey) {
        if self.sort_key == key {
            self.sort_direction = self.sort_direction.flipped();
        } else {
            self.sort_key = key;
            self.sort_direction = SortDirection::Ascending;
        }
    }
}

/// Filter, search and sort `files` for display
pub fn derive(files: &[FileRecord], config: &ListViewConfig) -> Vec<FileRecord> {
    let needle = config.search_term.to_lowercase();

    let mut visible: Vec<&FileRecord> = files
        .iter()
        .filter(|file| config.type_filter.matches(file.category()))
        .filter(|file| needle.is_empty() || file.filename.to_lowercase().contains(&needle))
        .collect();

    let collator = match config.sort_key {
        SortKey::Filename => name_collator(),
        _ => None,
    };

    // Vec::sort_by is stable
    visible.sort_by(|a, b| {
        let ordering = compare(a, b, config.sort_key, collator.as_ref());
        match config.sort_direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });

    visible.into_iter().cloned().collect()
}

fn compare(a: &FileRecord, b: &FileRecord, key: SortKey, collator: Option<&Collator>) -> Ordering {
    match key {
        SortKey::Filename => compare_names(collator, &a.filename, &b.filename),
        SortKey::Size => a.size.cmp(&b.size),
        // Unparseable dates sort before every real date
        SortKey::UploadDate => {
            parse_upload_date(&a.upload_date).cmp(&parse_upload_date(&b.upload_date))
        }
    }
}

/// Root-locale collator at tertiary strength
fn name_collator() -> Option<Collator> {
    match Collator::try_new(&Default::default(), CollatorOptions::new()) {
        Ok(collator) => Some(collator),
        Err(e) => {
            warn!("Filename collation unavailable, using case-insensitive order: {:?}", e);
            None
        }
    }
}

/// Locale-aware name order; on a case-only difference lowercase sorts first
fn compare_names(collator: Option<&Collator>, a: &str, b: &str) -> Ordering {
    let ordering = match collator {
        Some(collator) => collator.compare(a, b),
        None => a.to_lowercase().cmp(&b.to_lowercase()),
    };
    ordering.then_with(|| b.cmp(a))
}
