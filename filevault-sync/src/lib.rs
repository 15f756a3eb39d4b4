//! FileVault Sync Core
//!
//! This library holds the live part of the FileVault client: the push-event
//! connection to the server, the ephemeral notification store it feeds, the
//! refresh triggers that re-query authoritative state when the store changes,
//! the upload progress state machine, and the pure list filter/sort engine.
//!
//! ## Data flow
//!
//! ```text
//! ConnectionManager ──push events──► NotificationStore ──version──► RefreshTrigger
//!        ▲                                   ▲                          │
//!   EventSource                        UploadMachine                FileStore (HTTP)
//!   (Socket.IO)                              │                          │
//!                                        Uploader                listing::derive
//! ```

pub mod api;
pub mod connection;
pub mod listing;
pub mod notification;
pub mod refresh;
pub mod transport;
pub mod upload;

mod error;

#[cfg(test)]
pub(crate) mod test_utils;

pub use api::{
    ActivityEntry, DailyUploads, DashboardData, DashboardStats, ExistingFile, FileAnalysis,
    FileRecord, FileStore, HttpConfig, HttpFileStore, ProgressFn, UploadResponse, Uploader,
};
pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStatus, PushEvent,
    ReconnectionStrategy,
};
pub use error::{Result, SyncError};
pub use listing::{derive, FileCategory, ListViewConfig, SortDirection, SortKey, TypeFilter};
pub use notification::{
    NewNotification, Notification, NotificationId, NotificationKind, NotificationStore,
    DEFAULT_NOTICE_TTL,
};
pub use refresh::{DashboardQuery, FileListQuery, RefreshTrigger, ViewQuery, ViewSnapshot};
pub use transport::{EventSource, EventStream, SocketIoSource};
pub use upload::{SelectedFile, UploadAttempt, UploadMachine, UploadOutcome, UploadPhase};
