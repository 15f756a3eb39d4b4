//! Socket.IO frame codec
//!
//! Decodes the text frames of Engine.IO v4 with Socket.IO packets nested in
//! Engine.IO `message` packets:
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,..}   engine open
//! 2 / 3                                   engine ping / pong
//! 40{"sid":".."}                          socket connect ack
//! 42["file_uploaded",{"filename":"a"}]    socket event
//! 42/admin,7["name",{..}]                 event with namespace and ack id
//! 41                                      socket disconnect
//! 44{"message":"not authorized"}          socket connect error
//! ```

use crate::{Result, SyncError};
use serde_json::Value;

/// Frame sent to join the default namespace
pub const CONNECT_FRAME: &str = "40";

/// Reply to an engine ping
pub const PONG_FRAME: &str = "3";

/// Decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Engine.IO handshake; carries the raw handshake object
    Open(Value),
    /// Engine.IO close
    Close,
    Ping,
    Pong,
    Upgrade,
    Noop,
    /// Socket.IO namespace connect acknowledgement
    Connect,
    /// Socket.IO namespace disconnect
    Disconnect,
    /// Socket.IO namespace connect rejected
    ConnectError(String),
    /// Socket.IO event with its first argument (or `null`)
    Event { name: String, payload: Value },
    /// Socket.IO acks and binary packets; not used by this client
    Ignored,
}

/// Decode one text frame
pub fn decode(text: &str) -> Result<Frame> {
    let mut chars = text.chars();
    let engine_type = chars
        .next()
        .ok_or_else(|| SyncError::InvalidFrame("empty frame".to_string()))?;
    let rest = chars.as_str();

    match engine_type {
        '0' => {
            let handshake = if rest.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(rest)?
            };
            Ok(Frame::Open(handshake))
        }
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_socket_packet(rest),
        '5' => Ok(Frame::Upgrade),
        '6' => Ok(Frame::Noop),
        other => Err(SyncError::InvalidFrame(format!(
            "unknown engine packet type '{}'",
            other
        ))),
    }
}

fn decode_socket_packet(packet: &str) -> Result<Frame> {
    let mut chars = packet.chars();
    let socket_type = chars
        .next()
        .ok_or_else(|| SyncError::InvalidFrame("empty message packet".to_string()))?;
    let body = strip_namespace_and_ack(chars.as_str());

    match socket_type {
        '0' => Ok(Frame::Connect),
        '1' => Ok(Frame::Disconnect),
        '2' => decode_event(body),
        '4' => {
            let reason = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            Ok(Frame::ConnectError(reason))
        }
        '3' | '5' | '6' => Ok(Frame::Ignored),
        other => Err(SyncError::InvalidFrame(format!(
            "unknown socket packet type '{}'",
            other
        ))),
    }
}

/// Skip an optional `/namespace,` prefix and a numeric ack id
fn strip_namespace_and_ack(body: &str) -> &str {
    let body = match body.strip_prefix('/') {
        Some(after_slash) => match after_slash.find(',') {
            Some(comma) => &after_slash[comma + 1..],
            None => "",
        },
        None => body,
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn decode_event(body: &str) -> Result<Frame> {
    let args: Value = serde_json::from_str(body)?;
    let Value::Array(mut args) = args else {
        return Err(SyncError::InvalidFrame(
            "event body is not an array".to_string(),
        ));
    };
    if args.is_empty() {
        return Err(SyncError::InvalidFrame("event without a name".to_string()));
    }
    let name = match args.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(SyncError::InvalidFrame(format!(
                "event name is not a string: {}",
                other
            )))
        }
    };
    let payload = if args.is_empty() {
        Value::Null
    } else {
        args.remove(0)
    };
    Ok(Frame::Event { name, payload })
}
