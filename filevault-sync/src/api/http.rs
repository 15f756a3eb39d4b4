//! reqwest implementation of the file-storage API

use super::{DashboardData, FileRecord, FileStore, ProgressFn, UploadResponse, Uploader};
use crate::upload::SelectedFile;
use crate::{Result, SyncError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

/// Size of each upload body chunk; progress is reported per chunk
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// API root, e.g. `http://localhost:5000/api`
    pub base_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("filevault/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// File-storage API over HTTP
///
/// `reqwest::Client` pools connections internally; clone this freely.
#[derive(Debug, Clone)]
pub struct HttpFileStore {
    client: Client,
    base_url: String,
}

impl HttpFileStore {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, context: &str) -> Result<Response> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        check_status(response, context)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        let response = self.get(path, context).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_bytes(&self, path: &str, context: &str) -> Result<Vec<u8>> {
        let response = self.get(path, context).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn check_status(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(SyncError::NotFound(context.to_string()));
    }
    Err(SyncError::UnexpectedStatus {
        status: status.as_u16(),
        context: context.to_string(),
    })
}

/// Split a file into chunks, reporting cumulative progress as each chunk is
/// pulled by the HTTP body writer
fn progress_chunks(
    file: &SelectedFile,
    progress: ProgressFn,
) -> impl futures::Stream<Item = std::io::Result<Vec<u8>>> + Send + Sync + 'static {
    let total = file.bytes.len() as u64;
    let chunks: Vec<Vec<u8>> = file
        .bytes
        .chunks(UPLOAD_CHUNK_SIZE)
        .map(<[u8]>::to_vec)
        .collect();

    let mut sent = 0u64;
    futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress(sent, total);
        Ok::<_, std::io::Error>(chunk)
    })
}

#[async_trait]
impl FileStore for HttpFileStore {
    async fn dashboard(&self) -> Result<DashboardData> {
        self.get_json("/dashboard", "loading the dashboard").await
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        self.get_json("/files", "listing files").await
    }

    async fn file(&self, id: &str) -> Result<FileRecord> {
        self.get_json(&format!("/files/{}", id), &format!("file {}", id))
            .await
    }

    async fn preview(&self, id: &str) -> Result<Vec<u8>> {
        self.get_bytes(
            &format!("/files/{}/preview", id),
            &format!("preview of file {}", id),
        )
        .await
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        self.get_bytes(
            &format!("/files/{}/download", id),
            &format!("file {}", id),
        )
        .await
    }
}

#[async_trait]
impl Uploader for HttpFileStore {
    async fn upload(&self, file: &SelectedFile, progress: ProgressFn) -> Result<UploadResponse> {
        let url = self.url("/upload");
        info!("Uploading {} ({} bytes) to {}", file.name, file.size, url);

        let part = Part::stream_with_length(
            Body::wrap_stream(progress_chunks(file, progress)),
            file.bytes.len() as u64,
        )
        .file_name(file.name.clone());
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SyncError::UploadTransport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::UploadTransport(e.to_string()))?;
        debug!("Upload of {} answered with status {}", file.name, status);

        Ok(UploadResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_base_url_is_normalised() {
        let store = HttpFileStore::new(&HttpConfig {
            base_url: "http://files.local:5000/api/".to_string(),
            ..HttpConfig::default()
        })
        .unwrap();
        assert_eq!(store.base_url(), "http://files.local:5000/api");
        assert_eq!(store.url("/files/7"), "http://files.local:5000/api/files/7");
    }

    #[tokio::test]
    async fn test_progress_body_reports_cumulative_bytes() {
        let file = SelectedFile::new("blob.bin", vec![7u8; UPLOAD_CHUNK_SIZE * 2 + 10]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |sent, total| {
            sink.lock().unwrap().push((sent, total));
        });

        let total = file.bytes.len() as u64;
        let mut stream = Box::pin(progress_chunks(&file, progress));
        let mut received = 0usize;
        while let Some(chunk) = stream.next().await {
            received += chunk.unwrap().len();
        }
        assert_eq!(received as u64, total);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (UPLOAD_CHUNK_SIZE as u64, total),
                (UPLOAD_CHUNK_SIZE as u64 * 2, total),
                (total, total)
            ]
        );
    }
}
