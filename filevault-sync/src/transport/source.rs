//! Event Source Abstraction
//!
//! Defines the interface the connection manager uses to open a push-event
//! link, independent of the wire protocol underneath.

use crate::connection::PushEvent;
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt::Debug;

/// Stream of events from one open link
///
/// The stream yields [`PushEvent::Connect`] once the server acknowledges the
/// link. It ends (or yields an error) when the link is lost; dropping it
/// closes the underlying socket.
pub type EventStream = BoxStream<'static, Result<PushEvent>>;

/// Factory for push-event links
#[async_trait]
pub trait EventSource: Send + Sync + Debug {
    /// Open a new link to the server
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be established. A returned
    /// stream that ends before yielding `Connect` also counts as a failed
    /// attempt.
    async fn connect(&self) -> Result<EventStream>;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;
}
