//! Upload Progress State Machine
//!
//! Tracks one upload surface through its phases:
//!
//! ```text
//! idle ──select──► file selected ──submit──► uploading ──► succeeded
//!   ▲                   ▲                        │     ├──► failed (duplicate)
//!   │                   └──select (terminal)─────┤     ├──► failed (anomaly)
//!   └──────────────── reset (any phase) ─────────┘     └──► failed (other)
//! ```
//!
//! The transfer runs on a background task. Progress only ever increases, and
//! each terminal transition posts exactly one notice to the
//! [`NotificationStore`].

use crate::api::{ExistingFile, ProgressFn, UploadResponse, Uploader};
use crate::notification::{NewNotification, NotificationStore, DEFAULT_NOTICE_TTL};
use crate::{Result, SyncError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DUPLICATE_ERROR: &str = "Duplicate file detected!";
const ANOMALY_ERROR: &str = "Anomaly detected!";
const ANOMALY_MESSAGE: &str = "Anomaly detected in file upload!";
const MALFORMED_RESPONSE: &str = "Error processing server response";
const SERVER_ERROR: &str = "Server error occurred";
const TRANSPORT_ERROR: &str = "Error uploading file";

/// File chosen for upload
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub size: u64,
    pub bytes: Arc<[u8]>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPhase {
    #[default]
    Idle,
    FileSelected,
    Uploading,
    Succeeded,
    FailedDuplicate,
    FailedAnomaly,
    FailedOther,
}

impl UploadPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadPhase::Succeeded
                | UploadPhase::FailedDuplicate
                | UploadPhase::FailedAnomaly
                | UploadPhase::FailedOther
        )
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UploadPhase::Idle => "idle",
            UploadPhase::FileSelected => "file selected",
            UploadPhase::Uploading => "uploading",
            UploadPhase::Succeeded => "succeeded",
            UploadPhase::FailedDuplicate => "rejected as duplicate",
            UploadPhase::FailedAnomaly => "rejected as anomalous",
            UploadPhase::FailedOther => "failed",
        };
        f.write_str(label)
    }
}

/// Result of a finished upload
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Succeeded {
        message: String,
    },
    Duplicate {
        message: String,
        existing_file: Option<ExistingFile>,
        /// In `[0, 1]`; 0 when the server sent none
        similarity: f64,
    },
    Anomaly {
        message: String,
        details: Map<String, Value>,
    },
    Failed {
        message: String,
    },
}

#[derive(Deserialize)]
struct SuccessBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct RejectionBody {
    error: String,
    #[serde(default)]
    existing_file: Option<ExistingFile>,
    #[serde(default)]
    similarity: Option<f64>,
    #[serde(default)]
    details: Option<Value>,
}

fn failed(message: &str) -> UploadOutcome {
    UploadOutcome::Failed {
        message: message.to_string(),
    }
}

impl UploadOutcome {
    /// Classify a server response
    ///
    /// Only status 400 carries structured rejections; every other non-2xx
    /// status is a generic server error.
    pub fn from_response(response: &UploadResponse) -> Self {
        match response.status {
            200..=299 => match serde_json::from_str::<SuccessBody>(&response.body) {
                Ok(body) => UploadOutcome::Succeeded {
                    message: body
                        .message
                        .unwrap_or_else(|| "File uploaded successfully".to_string()),
                },
                Err(e) => {
                    warn!("Unreadable upload response: {}", e);
                    failed(MALFORMED_RESPONSE)
                }
            },
            400 => match serde_json::from_str::<RejectionBody>(&response.body) {
                Ok(body) if body.error == DUPLICATE_ERROR => UploadOutcome::Duplicate {
                    message: body.error,
                    existing_file: body.existing_file,
                    similarity: clamp_similarity(body.similarity),
                },
                Ok(body) if body.error == ANOMALY_ERROR => UploadOutcome::Anomaly {
                    message: ANOMALY_MESSAGE.to_string(),
                    details: match body.details {
                        Some(Value::Object(details)) => details,
                        _ => Map::new(),
                    },
                },
                Ok(body) => UploadOutcome::Failed {
                    message: body.error,
                },
                Err(e) => {
                    warn!("Unreadable upload rejection: {}", e);
                    failed(MALFORMED_RESPONSE)
                }
            },
            status => {
                warn!("Upload failed with HTTP status {}", status);
                failed(SERVER_ERROR)
            }
        }
    }

    /// Outcome when no response arrived
    pub fn from_transport_error(error: &SyncError) -> Self {
        warn!("Upload transport failure: {}", error);
        failed(TRANSPORT_ERROR)
    }

    pub fn phase(&self) -> UploadPhase {
        match self {
            UploadOutcome::Succeeded { .. } => UploadPhase::Succeeded,
            UploadOutcome::Duplicate { .. } => UploadPhase::FailedDuplicate,
            UploadOutcome::Anomaly { .. } => UploadPhase::FailedAnomaly,
            UploadOutcome::Failed { .. } => UploadPhase::FailedOther,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UploadOutcome::Succeeded { message }
            | UploadOutcome::Duplicate { message, .. }
            | UploadOutcome::Anomaly { message, .. }
            | UploadOutcome::Failed { message } => message,
        }
    }

    fn notice(&self, ttl: Duration) -> NewNotification {
        let notice = match self {
            UploadOutcome::Succeeded { .. } => NewNotification::success("File uploaded successfully"),
            UploadOutcome::Duplicate { .. } => NewNotification::warning("Duplicate file detected"),
            UploadOutcome::Anomaly { .. } => NewNotification::error("Anomaly detected in file upload"),
            UploadOutcome::Failed { message } => NewNotification::error(message.clone()),
        };
        notice.expires_after(ttl)
    }
}

fn clamp_similarity(similarity: Option<f64>) -> f64 {
    match similarity {
        Some(value) if value.is_finite() => value.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Observable state of the upload surface
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadAttempt {
    pub file: Option<SelectedFile>,
    pub phase: UploadPhase,
    pub progress_percent: u8,
    pub result: Option<UploadOutcome>,
}

struct MachineState {
    attempt: UploadAttempt,
    dragging: bool,
    /// Bumped on every submit and reset; callbacks from older transfers are ignored
    generation: u64,
    transfer: Option<JoinHandle<()>>,
}

struct MachineInner {
    uploader: Arc<dyn Uploader>,
    notifications: NotificationStore,
    notice_ttl: Duration,
    state: Mutex<MachineState>,
    published: watch::Sender<UploadAttempt>,
}

impl MachineInner {
    fn lock(&self) -> MutexGuard<'_, MachineState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self, state: &MachineState) {
        self.published.send_replace(state.attempt.clone());
    }

    fn progress(&self, generation: u64, sent: u64, total: u64) {
        let mut state = self.lock();
        if state.generation != generation || state.attempt.phase != UploadPhase::Uploading {
            return;
        }
        let percent = if total == 0 {
            100
        } else {
            (sent.saturating_mul(100) / total).min(100) as u8
        };
        if percent > state.attempt.progress_percent {
            state.attempt.progress_percent = percent;
            self.publish(&state);
        }
    }

    fn finish(&self, generation: u64, outcome: UploadOutcome) {
        let notice = {
            let mut state = self.lock();
            if state.generation != generation || state.attempt.phase != UploadPhase::Uploading {
                debug!("Ignoring completion of a superseded upload");
                return;
            }
            let phase = outcome.phase();
            info!("Upload finished: {} ({})", phase, outcome.message());

            state.transfer = None;
            state.attempt.phase = phase;
            if phase == UploadPhase::Succeeded {
                state.attempt.progress_percent = 100;
            }
            let notice = outcome.notice(self.notice_ttl);
            state.attempt.result = Some(outcome);
            self.publish(&state);
            notice
        };
        self.notifications.add(notice);
    }
}

impl Drop for MachineInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(transfer) = state.transfer.take() {
            transfer.abort();
        }
    }
}

/// State machine for one upload surface
#[derive(Clone)]
pub struct UploadMachine {
    inner: Arc<MachineInner>,
}

impl fmt::Debug for UploadMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadMachine")
            .field("attempt", &self.attempt())
            .finish()
    }
}

impl UploadMachine {
    pub fn new(uploader: Arc<dyn Uploader>, notifications: NotificationStore) -> Self {
        Self::with_notice_ttl(uploader, notifications, DEFAULT_NOTICE_TTL)
    }

    pub fn with_notice_ttl(
        uploader: Arc<dyn Uploader>,
        notifications: NotificationStore,
        notice_ttl: Duration,
    ) -> Self {
        let (published, _) = watch::channel(UploadAttempt::default());
        Self {
            inner: Arc::new(MachineInner {
                uploader,
                notifications,
                notice_ttl,
                state: Mutex::new(MachineState {
                    attempt: UploadAttempt::default(),
                    dragging: false,
                    generation: 0,
                    transfer: None,
                }),
                published,
            }),
        }
    }

    pub fn attempt(&self) -> UploadAttempt {
        self.inner.lock().attempt.clone()
    }

    pub fn phase(&self) -> UploadPhase {
        self.inner.lock().attempt.phase
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadAttempt> {
        self.inner.published.subscribe()
    }

    pub fn is_dragging(&self) -> bool {
        self.inner.lock().dragging
    }

    pub fn drag_enter(&self) {
        self.inner.lock().dragging = true;
    }

    pub fn drag_leave(&self) {
        self.inner.lock().dragging = false;
    }

    /// Choose a file, replacing any previous choice and result
    ///
    /// # Errors
    ///
    /// [`SyncError::ConcurrentUpload`] while a transfer is in flight.
    pub fn select(&self, file: SelectedFile) -> Result<()> {
        let mut state = self.inner.lock();
        if state.attempt.phase == UploadPhase::Uploading {
            return Err(SyncError::ConcurrentUpload);
        }
        debug!("Selected {} ({} bytes)", file.name, file.size);
        state.attempt = UploadAttempt {
            file: Some(file),
            phase: UploadPhase::FileSelected,
            progress_percent: 0,
            result: None,
        };
        self.inner.publish(&state);
        Ok(())
    }

    /// End a drag by dropping a file onto the surface
    pub fn drop_file(&self, file: SelectedFile) -> Result<()> {
        self.drag_leave();
        self.select(file)
    }

    /// Start transferring the selected file
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SyncError::ConcurrentUpload`] while uploading, otherwise
    /// [`SyncError::InvalidTransition`] unless a file is selected.
    pub fn submit(&self) -> Result<()> {
        let mut state = self.inner.lock();
        let file = match (state.attempt.phase, state.attempt.file.clone()) {
            (UploadPhase::FileSelected, Some(file)) => file,
            (UploadPhase::Uploading, _) => return Err(SyncError::ConcurrentUpload),
            (phase, _) => {
                return Err(SyncError::InvalidTransition {
                    action: "submit",
                    phase,
                })
            }
        };

        state.generation += 1;
        let generation = state.generation;
        state.attempt.phase = UploadPhase::Uploading;
        state.attempt.progress_percent = 0;
        state.attempt.result = None;
        self.inner.publish(&state);
        info!("Uploading {}", file.name);

        let weak = Arc::downgrade(&self.inner);
        let uploader = Arc::clone(&self.inner.uploader);
        state.transfer = Some(tokio::spawn(transfer(weak, uploader, file, generation)));
        Ok(())
    }

    /// Abandon any transfer and return to idle
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        if let Some(transfer) = state.transfer.take() {
            debug!("Cancelling in-flight upload");
            transfer.abort();
        }
        state.generation += 1;
        state.dragging = false;
        state.attempt = UploadAttempt::default();
        self.inner.publish(&state);
    }
}

async fn transfer(
    machine: Weak<MachineInner>,
    uploader: Arc<dyn Uploader>,
    file: SelectedFile,
    generation: u64,
) {
    let progress_machine = machine.clone();
    let progress: ProgressFn = Arc::new(move |sent, total| {
        if let Some(inner) = progress_machine.upgrade() {
            inner.progress(generation, sent, total);
        }
    });

    let outcome = match uploader.upload(&file, progress).await {
        Ok(response) => UploadOutcome::from_response(&response),
        Err(e) => UploadOutcome::from_transport_error(&e),
    };

    if let Some(inner) = machine.upgrade() {
        inner.finish(generation, outcome);
    }
}
