//! Push Event Types
//!
//! Server-initiated events delivered over the push channel, and the pure
//! dispatch table that turns them into notices.

use crate::notification::NewNotification;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Events received on the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Link established and acknowledged by the server
    Connect,

    /// Server or transport closed the link
    Disconnect,

    /// A file was stored successfully
    FileUploaded {
        filename: String,
        /// Server-side id of the new record, when provided
        id: Option<String>,
    },

    /// An upload matched an already stored file
    DuplicateDetected {
        filename: String,
        existing_filename: Option<String>,
    },

    /// An upload was blocked by the anomaly check
    AnomalyDetected {
        filename: String,
        details: Option<Value>,
    },

    /// Known event name whose payload could not be decoded
    Malformed { name: String, reason: String },

    /// Event name this client does not handle
    Unknown { name: String },
}

#[derive(Deserialize)]
struct UploadedPayload {
    filename: String,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct DuplicatePayload {
    filename: String,
    #[serde(default)]
    existing_filename: Option<String>,
}

#[derive(Deserialize)]
struct AnomalyPayload {
    filename: String,
    #[serde(default)]
    details: Option<Value>,
}

fn decode_payload<T: for<'de> Deserialize<'de>>(
    name: &str,
    payload: Value,
    build: impl FnOnce(T) -> PushEvent,
) -> PushEvent {
    match serde_json::from_value::<T>(payload) {
        Ok(body) => build(body),
        Err(e) => PushEvent::Malformed {
            name: name.to_string(),
            reason: e.to_string(),
        },
    }
}

impl PushEvent {
    /// Build an event from its wire name and JSON payload
    pub fn from_wire(name: &str, payload: Value) -> Self {
        match name {
            "connect" => PushEvent::Connect,
            "disconnect" => PushEvent::Disconnect,
            "file_uploaded" => decode_payload(name, payload, |p: UploadedPayload| {
                PushEvent::FileUploaded {
                    filename: p.filename,
                    id: p.id,
                }
            }),
            "duplicate_detected" => decode_payload(name, payload, |p: DuplicatePayload| {
                PushEvent::DuplicateDetected {
                    filename: p.filename,
                    existing_filename: p.existing_filename,
                }
            }),
            "anomaly_detected" => decode_payload(name, payload, |p: AnomalyPayload| {
                PushEvent::AnomalyDetected {
                    filename: p.filename,
                    details: p.details,
                }
            }),
            other => PushEvent::Unknown {
                name: other.to_string(),
            },
        }
    }

    /// Wire name of the event
    pub fn name(&self) -> &str {
        match self {
            PushEvent::Connect => "connect",
            PushEvent::Disconnect => "disconnect",
            PushEvent::FileUploaded { .. } => "file_uploaded",
            PushEvent::DuplicateDetected { .. } => "duplicate_detected",
            PushEvent::AnomalyDetected { .. } => "anomaly_detected",
            PushEvent::Malformed { name, .. } | PushEvent::Unknown { name } => name,
        }
    }

    /// Notice this event produces, if any
    ///
    /// Link-state events and unrecognised input produce nothing; the
    /// connection manager handles the former and ignores the latter.
    pub fn notice(&self, ttl: Duration) -> Option<NewNotification> {
        let notice = match self {
            PushEvent::FileUploaded { filename, .. } => NewNotification::success(format!(
                "File {} was uploaded successfully",
                filename
            )),
            PushEvent::DuplicateDetected { filename, .. } => NewNotification::warning(format!(
                "Duplicate file detected: {} matches an existing file",
                filename
            )),
            PushEvent::AnomalyDetected { filename, .. } => {
                NewNotification::error(format!("Anomaly detected in file {}", filename))
            }
            PushEvent::Malformed { name, reason } => {
                warn!("Ignoring malformed '{}' event: {}", name, reason);
                return None;
            }
            PushEvent::Connect | PushEvent::Disconnect | PushEvent::Unknown { .. } => {
                return None;
            }
        };
        Some(notice.expires_after(ttl))
    }
}
