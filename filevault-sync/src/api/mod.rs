//! File-storage API
//!
//! Read and upload seams used by the refresh triggers and the upload machine,
//! with a reqwest implementation against the server's REST endpoints:
//!
//! | Method | Path                   | Result            |
//! |--------|------------------------|-------------------|
//! | GET    | `/dashboard`           | [`DashboardData`] |
//! | GET    | `/files`               | `[FileRecord]`    |
//! | GET    | `/files/{id}`          | [`FileRecord`]    |
//! | GET    | `/files/{id}/preview`  | bytes             |
//! | GET    | `/files/{id}/download` | bytes             |
//! | POST   | `/upload`              | [`UploadResponse`]|

mod http;
mod models;

pub use http::{HttpConfig, HttpFileStore};
pub use models::{
    parse_upload_date, ActivityEntry, DailyUploads, DashboardData, DashboardStats, ExistingFile,
    FileAnalysis, FileRecord, UploadResponse,
};

use crate::upload::SelectedFile;
use crate::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Upload progress callback: `(bytes_sent, bytes_total)`
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Read side of the file-storage API
#[async_trait]
pub trait FileStore: Send + Sync + Debug {
    /// Aggregate stats, recent activity and per-day upload counts
    async fn dashboard(&self) -> Result<DashboardData>;

    /// Every stored file, in server order
    async fn list_files(&self) -> Result<Vec<FileRecord>>;

    async fn file(&self, id: &str) -> Result<FileRecord>;

    /// Preview bytes; only images have one
    async fn preview(&self, id: &str) -> Result<Vec<u8>>;

    async fn download(&self, id: &str) -> Result<Vec<u8>>;
}

/// Upload side of the file-storage API
#[async_trait]
pub trait Uploader: Send + Sync + Debug {
    /// Send one file and return the raw response
    ///
    /// `progress` is invoked as bytes leave the client.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::UploadTransport`] when no response was
    /// received. Any HTTP status, including 4xx/5xx, is returned as `Ok`.
    async fn upload(&self, file: &SelectedFile, progress: ProgressFn) -> Result<UploadResponse>;
}
