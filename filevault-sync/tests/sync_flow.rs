//! Sync Flow Integration Tests
//!
//! Drives the public API end to end:
//! - push events arriving on a live link become notices
//! - every notice makes the file-list view refetch
//! - uploads post their own notice and refresh the same view
//! - the refetched collection is derived for display

use filevault_sync::{
    derive, ConnectionConfig, ConnectionManager, ConnectionState, DashboardData, EventSource,
    EventStream, FileListQuery, FileRecord, FileStore, ListViewConfig, NotificationKind,
    NotificationStore, ProgressFn, PushEvent, RefreshTrigger, Result, SelectedFile,
    SortDirection, SortKey, SyncError, UploadMachine, UploadPhase, UploadResponse, Uploader,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("filevault_sync=debug")
        .try_init();
}

async fn wait_until<T>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) {
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(pred))
        .await
        .expect("timed out")
        .expect("sender dropped");
}

fn record(id: &str, filename: &str, size: u64, upload_date: &str) -> FileRecord {
    serde_json::from_value(json!({
        "_id": id,
        "filename": filename,
        "size": size,
        "upload_date": upload_date,
    }))
    .unwrap()
}

/// Single-link event source fed by the test
#[derive(Debug)]
struct ChannelSource {
    link: Mutex<Option<mpsc::UnboundedReceiver<Result<PushEvent>>>>,
}

impl ChannelSource {
    fn new() -> (Self, mpsc::UnboundedSender<Result<PushEvent>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                link: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait::async_trait]
impl EventSource for ChannelSource {
    async fn connect(&self) -> Result<EventStream> {
        let rx = self
            .link
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SyncError::Connection("link already used".to_string()))?;
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    fn endpoint(&self) -> String {
        "channel://test".to_string()
    }
}

/// Server state shared by the mock store and mock uploader
#[derive(Debug, Default)]
struct FakeServer {
    files: Mutex<Vec<FileRecord>>,
}

#[async_trait::async_trait]
impl FileStore for FakeServer {
    async fn dashboard(&self) -> Result<DashboardData> {
        let mut data = DashboardData::default();
        data.stats.total_files = self.files.lock().unwrap().len() as u64;
        Ok(data)
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        Ok(self.files.lock().unwrap().clone())
    }

    async fn file(&self, id: &str) -> Result<FileRecord> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    async fn preview(&self, id: &str) -> Result<Vec<u8>> {
        Err(SyncError::NotFound(id.to_string()))
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        Err(SyncError::NotFound(id.to_string()))
    }
}

#[async_trait::async_trait]
impl Uploader for FakeServer {
    async fn upload(&self, file: &SelectedFile, progress: ProgressFn) -> Result<UploadResponse> {
        progress(file.size, file.size);
        let mut files = self.files.lock().unwrap();
        let id = format!("{}", files.len() + 1);
        files.push(record(&id, &file.name, file.size, "2024-03-01T09:00:00"));
        Ok(UploadResponse {
            status: 200,
            body: json!({"message": "File uploaded successfully"}).to_string(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_push_event_refreshes_file_list() {
    init_tracing();

    let server = Arc::new(FakeServer::default());
    server
        .files
        .lock()
        .unwrap()
        .push(record("1", "notes.txt", 10, "2024-01-01"));

    let notifications = NotificationStore::new();
    let (source, link) = ChannelSource::new();
    let manager = ConnectionManager::new(
        Arc::new(source),
        notifications.clone(),
        ConnectionConfig::default(),
    );
    let files = RefreshTrigger::spawn(FileListQuery::new(server.clone()), notifications.subscribe());
    let mut snapshots = files.subscribe();

    wait_until(&mut snapshots, |s| s.applied_request == 1).await;
    assert_eq!(files.snapshot().data.unwrap().len(), 1);

    manager.start();
    let mut status = manager.subscribe_status();
    link.send(Ok(PushEvent::Connect)).unwrap();
    wait_until(&mut status, |s| s.state == ConnectionState::Connected).await;

    // Another client uploads; the server stores it and announces it
    server
        .files
        .lock()
        .unwrap()
        .push(record("2", "Budget.xlsx", 500, "2024-02-01"));
    link.send(Ok(PushEvent::from_wire(
        "file_uploaded",
        json!({"filename": "Budget.xlsx", "id": "2"}),
    )))
    .unwrap();

    wait_until(&mut snapshots, |s| {
        s.data.as_ref().map(|d| d.len()) == Some(2)
    })
    .await;

    let notices = notifications.list();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NotificationKind::Success);
    assert_eq!(notices[0].message, "File Budget.xlsx was uploaded successfully");

    let data = files.snapshot().data.unwrap();
    let by_size = ListViewConfig {
        sort_key: SortKey::Size,
        sort_direction: SortDirection::Descending,
        ..ListViewConfig::default()
    };
    let shown: Vec<String> = derive(&data, &by_size)
        .into_iter()
        .map(|f| f.filename)
        .collect();
    assert_eq!(shown, ["Budget.xlsx", "notes.txt"]);

    // The notice expires on its own, which is another store change
    let version = notifications.version();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(notifications.is_empty());
    assert_eq!(notifications.version(), version + 1);

    manager.stop().await;
    assert_eq!(manager.status().state, ConnectionState::Disconnected);
    files.stop();
}

#[tokio::test]
async fn test_upload_notice_refreshes_file_list() {
    init_tracing();

    let server = Arc::new(FakeServer::default());
    let notifications = NotificationStore::new();
    let files = RefreshTrigger::spawn(FileListQuery::new(server.clone()), notifications.subscribe());
    let uploads = UploadMachine::new(server.clone(), notifications.clone());
    let mut snapshots = files.subscribe();
    wait_until(&mut snapshots, |s| s.applied_request >= 1).await;

    uploads
        .select(SelectedFile::new("scan.png", vec![1u8; 2048]))
        .unwrap();
    uploads.submit().unwrap();

    let mut attempts = uploads.subscribe();
    wait_until(&mut attempts, |a| a.phase == UploadPhase::Succeeded).await;
    wait_until(&mut snapshots, |s| {
        s.data.as_ref().map(|d| d.len()) == Some(1)
    })
    .await;

    let attempt = uploads.attempt();
    assert_eq!(attempt.progress_percent, 100);
    assert_eq!(notifications.list()[0].message, "File uploaded successfully");

    let data = files.snapshot().data.unwrap();
    let images = ListViewConfig {
        type_filter: "image".parse().unwrap(),
        ..ListViewConfig::default()
    };
    assert_eq!(derive(&data, &images).len(), 1);
}
