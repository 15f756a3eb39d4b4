//! Push-event transport
//!
//! The connection manager talks to the server through the [`EventSource`]
//! trait. The shipped implementation speaks Socket.IO over WebSocket.

pub mod socketio;
mod source;
mod websocket;

pub use source::{EventSource, EventStream};
pub use websocket::{SocketIoSource, HANDSHAKE_TIMEOUT};
