//! Push-event connection
//!
//! Owns the single live link to the server, its reconnection policy, and the
//! dispatch of inbound events into the notification store.

mod events;
mod manager;
mod reconnect;

pub use events::PushEvent;
pub use manager::{ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStatus};
pub use reconnect::{ReconnectionStrategy, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY};
