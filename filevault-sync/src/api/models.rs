//! Wire models of the file-storage API

use crate::listing::FileCategory;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored file as returned by `GET /files` and `GET /files/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "_id", default)]
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    /// Upload time as sent by the server; see [`parse_upload_date`]
    #[serde(default)]
    pub upload_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date_formatted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<FileAnalysis>,
}

impl FileRecord {
    /// Parsed upload time, if the server's text is recognisable
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        parse_upload_date(&self.upload_date)
    }

    pub fn category(&self) -> FileCategory {
        FileCategory::from_filename(&self.filename)
    }

    pub fn is_duplicate(&self) -> bool {
        self.analysis
            .as_ref()
            .is_some_and(|a| flag(&a.duplicate_check, "is_duplicate"))
    }

    pub fn is_anomaly(&self) -> bool {
        self.analysis
            .as_ref()
            .is_some_and(|a| flag(&a.anomaly_check, "is_anomaly"))
    }
}

fn flag(check: &Value, key: &str) -> bool {
    check.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Externally computed analysis results; opaque apart from the two flags
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileAnalysis {
    #[serde(default)]
    pub duplicate_check: Value,
    #[serde(default)]
    pub anomaly_check: Value,
}

/// Stored file an upload was found to duplicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingFile {
    pub filename: String,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
}

/// Raw result of `POST /upload`
///
/// Classification into outcomes happens in [`crate::UploadOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: u16,
    pub body: String,
}

/// `GET /dashboard`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    #[serde(default)]
    pub stats: DashboardStats,
    #[serde(default)]
    pub recent_activity: Vec<ActivityEntry>,
    #[serde(default)]
    pub uploads_by_day: Vec<DailyUploads>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub duplicates_detected: u64,
    #[serde(default)]
    pub anomalies_detected: u64,
    /// Bytes
    #[serde(default)]
    pub total_storage: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_storage_formatted: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_iso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_formatted: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUploads {
    pub day: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub uploads: u64,
}

/// Parse an upload date in any of the forms the server has been seen to emit
///
/// Accepts RFC 3339, RFC 2822 (`Tue, 02 Jan 2024 10:00:00 GMT`), and naive
/// `YYYY-MM-DD[ HH:MM:SS]` / `YYYY-MM-DDTHH:MM:SS[.ffffff]`, the latter read
/// as UTC.
pub fn parse_upload_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
