//! Error handling for the FileVault sync core
//!
//! A single error enum covers every fallible operation in the crate. Errors
//! from the underlying libraries convert automatically through `From`, so
//! `?` works across reqwest, tungstenite, serde_json and std I/O.
//!
//! ## Error Categories
//!
//! ### Transient
//! Connection, timeout, HTTP and WebSocket failures. These are retried by the
//! connection manager and reported as soft errors by refresh triggers.
//! See [`SyncError::is_recoverable`].
//!
//! ### Caller errors
//! `ConcurrentUpload` and `InvalidTransition` are returned synchronously by
//! the upload state machine and leave its state untouched.
//!
//! Expected business outcomes (a duplicate or anomalous upload) are not
//! errors; they are represented by [`crate::UploadOutcome`].

use crate::upload::UploadPhase;
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur in the sync core
///
/// # Examples
///
/// ```rust
/// use filevault_sync::SyncError;
///
/// let error = SyncError::Connection("handshake refused".to_string());
/// assert_eq!(error.to_string(), "Connection error: handshake refused");
/// assert!(error.is_recoverable());
///
/// let error = SyncError::ConcurrentUpload;
/// assert!(!error.is_recoverable());
/// ```
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error (file system, sockets)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error from the file-storage API client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error on the push-event channel
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Push-event connection could not be established or was refused
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Push-event frame could not be decoded
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Server answered with a status the caller did not expect
    #[error("Unexpected HTTP status {status} while {context}")]
    UnexpectedStatus { status: u16, context: String },

    /// Requested resource does not exist on the server
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network or server failure while transferring an upload
    #[error("Upload transport error: {0}")]
    UploadTransport(String),

    /// A dependent view failed to refetch its data
    #[error("Refresh failed: {0}")]
    Refresh(String),

    /// `select`/`submit` called while an upload is already in flight
    #[error("An upload is already in progress")]
    ConcurrentUpload,

    /// Upload state machine operation not valid in the current phase
    #[error("Cannot {action} while upload is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: UploadPhase,
    },
}

impl SyncError {
    /// Check if this error is transient and might succeed on retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Io(_)
                | SyncError::Http(_)
                | SyncError::WebSocket(_)
                | SyncError::Connection(_)
                | SyncError::Timeout(_)
                | SyncError::UploadTransport(_)
                | SyncError::Refresh(_)
        )
    }

    /// Short message suitable for a notice or a single CLI line
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Connection(_) | SyncError::WebSocket(_) => {
                "Lost connection to the server. Retrying shortly.".to_string()
            }
            SyncError::Timeout(msg) => format!("Timed out: {}. Check the network.", msg),
            SyncError::Http(_) | SyncError::Io(_) => {
                "Could not reach the file server.".to_string()
            }
            SyncError::UnexpectedStatus { status, .. } => {
                format!("The file server answered with status {}.", status)
            }
            SyncError::NotFound(what) => format!("{} was not found.", what),
            SyncError::UploadTransport(_) => "Error uploading file".to_string(),
            SyncError::Refresh(msg) => format!("Showing stale data: {}.", msg),
            SyncError::ConcurrentUpload => {
                "Wait for the current upload to finish first.".to_string()
            }
            SyncError::InvalidTransition { action, phase } => {
                format!("Cannot {} while the upload is {}.", action, phase)
            }
            SyncError::Json(_) | SyncError::InvalidFrame(_) => {
                "Received malformed data from the server.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SyncError::NotFound("file 42".to_string());
        assert_eq!(error.to_string(), "Not found: file 42");

        let error = SyncError::UnexpectedStatus {
            status: 500,
            context: "listing files".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unexpected HTTP status 500 while listing files"
        );

        let error = SyncError::InvalidTransition {
            action: "submit",
            phase: UploadPhase::Idle,
        };
        assert_eq!(error.to_string(), "Cannot submit while upload is idle");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(SyncError::Timeout("connect".into()).is_recoverable());
        assert!(SyncError::Refresh("dashboard".into()).is_recoverable());
        assert!(!SyncError::ConcurrentUpload.is_recoverable());
        assert!(!SyncError::InvalidFrame("42[".into()).is_recoverable());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let error: SyncError = json_error.into();
        assert!(matches!(error, SyncError::Json(_)));
        assert_eq!(error.user_message(), "Received malformed data from the server.");
    }
}
