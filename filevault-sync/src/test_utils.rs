//! Test doubles shared by the unit tests

use crate::api::{DashboardData, FileRecord, FileStore, ProgressFn, UploadResponse, Uploader};
use crate::connection::{ConnectionState, ConnectionStatus, PushEvent};
use crate::refresh::ViewQuery;
use crate::transport::{EventSource, EventStream};
use crate::upload::SelectedFile;
use crate::{Result, SyncError};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Wait (bounded) until a watched value satisfies `pred`
pub(crate) async fn wait_until<T>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) {
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(pred))
        .await
        .expect("timed out waiting for watched value")
        .expect("watch sender dropped");
}

pub(crate) async fn wait_for_state(rx: &mut watch::Receiver<ConnectionStatus>, state: ConnectionState) {
    wait_until(rx, |status| status.state == state).await;
}

/// One scripted connection attempt
#[derive(Debug)]
pub(crate) enum ScriptedLink {
    Refuse,
    Open(mpsc::UnboundedReceiver<Result<PushEvent>>),
}

/// Test side of an open scripted link
pub(crate) struct LinkHandle {
    tx: mpsc::UnboundedSender<Result<PushEvent>>,
}

impl LinkHandle {
    pub(crate) fn send(&self, event: PushEvent) {
        let _ = self.tx.send(Ok(event));
    }

    /// True once the manager dropped its end of the link
    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Event source replaying a queue of scripted links; refuses once empty
#[derive(Debug, Default)]
pub(crate) struct ScriptedSource {
    links: Mutex<VecDeque<ScriptedLink>>,
    attempts: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn refusing() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, link: ScriptedLink) {
        self.links.lock().unwrap().push_back(link);
    }

    pub(crate) fn push_link(&self) -> LinkHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(ScriptedLink::Open(rx));
        LinkHandle { tx }
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn connect(&self) -> Result<EventStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.links.lock().unwrap().pop_front();
        match next {
            Some(ScriptedLink::Open(rx)) => Ok(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            Some(ScriptedLink::Refuse) | None => {
                Err(SyncError::Connection("scripted refusal".to_string()))
            }
        }
    }

    fn endpoint(&self) -> String {
        "scripted://events".to_string()
    }
}

/// View query whose fetches complete only when the test releases them
pub(crate) struct GatedQuery {
    gates: Mutex<VecDeque<oneshot::Receiver<Result<String>>>>,
    calls: watch::Sender<usize>,
}

impl GatedQuery {
    pub(crate) fn new() -> Self {
        Self {
            gates: Mutex::new(VecDeque::new()),
            calls: watch::channel(0).0,
        }
    }

    /// Script the next fetch; send on the returned gate to complete it
    pub(crate) fn expect_fetch(&self) -> oneshot::Sender<Result<String>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    pub(crate) fn calls(&self) -> watch::Receiver<usize> {
        self.calls.subscribe()
    }
}

#[async_trait]
impl ViewQuery for GatedQuery {
    type Output = String;

    fn name(&self) -> &str {
        "gated"
    }

    async fn fetch(&self) -> Result<String> {
        let gate = self.gates.lock().unwrap().pop_front();
        self.calls.send_modify(|calls| *calls += 1);
        match gate {
            Some(gate) => gate
                .await
                .unwrap_or_else(|_| Err(SyncError::Refresh("gate dropped".to_string()))),
            None => Err(SyncError::Refresh("unscripted fetch".to_string())),
        }
    }
}

/// In-memory file store
#[derive(Debug, Default)]
pub(crate) struct StaticFileStore {
    pub(crate) files: Mutex<Vec<FileRecord>>,
    pub(crate) dashboard: Mutex<DashboardData>,
}

#[async_trait]
impl FileStore for StaticFileStore {
    async fn dashboard(&self) -> Result<DashboardData> {
        Ok(self.dashboard.lock().unwrap().clone())
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
            .ok_or_else(|| SyncError::NotFound(format!("file {}", id)))
    }

    async fn preview(&self, id: &str) -> Result<Vec<u8>> {
        Err(SyncError::NotFound(format!("preview of file {}", id)))
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        let file = self.file(id).await?;
        Ok(vec![0; file.size as usize])
    }
}

/// Scripted reply of [`MockUploader`]
pub(crate) struct MockReply {
    /// `(sent, total)` progress reports before the gate
    pub(crate) progress: Vec<(u64, u64)>,
    pub(crate) gate: Option<oneshot::Receiver<()>>,
    pub(crate) result: std::result::Result<UploadResponse, String>,
}

impl MockReply {
    pub(crate) fn status(status: u16, body: serde_json::Value) -> Self {
        Self {
            progress: vec![(50, 100), (100, 100)],
            gate: None,
            result: Ok(UploadResponse {
                status,
                body: body.to_string(),
            }),
        }
    }

    pub(crate) fn transport_error(reason: &str) -> Self {
        Self {
            progress: vec![(10, 100)],
            gate: None,
            result: Err(reason.to_string()),
        }
    }

    /// Hold the reply until the returned sender fires (or is dropped)
    pub(crate) fn gated(mut self) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        self.gate = Some(rx);
        (self, tx)
    }

    pub(crate) fn with_progress(mut self, progress: Vec<(u64, u64)>) -> Self {
        self.progress = progress;
        self
    }
}

/// Uploader replaying scripted replies
#[derive(Default)]
pub(crate) struct MockUploader {
    replies: Mutex<VecDeque<MockReply>>,
    uploaded: Mutex<Vec<String>>,
}

impl std::fmt::Debug for MockUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockUploader").finish_non_exhaustive()
    }
}

impl MockUploader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Names of uploaded files, in order
    pub(crate) fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(&self, file: &SelectedFile, progress: ProgressFn) -> Result<UploadResponse> {
        self.uploaded.lock().unwrap().push(file.name.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SyncError::UploadTransport("unscripted upload".to_string()))?;

        for (sent, total) in reply.progress {
            progress(sent, total);
            tokio::task::yield_now().await;
        }
        if let Some(gate) = reply.gate {
            let _ = gate.await;
        }
        reply.result.map_err(SyncError::UploadTransport)
    }
}
