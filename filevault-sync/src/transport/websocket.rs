//! Socket.IO over WebSocket
//!
//! Opens a WebSocket with `tokio-tungstenite`, performs the Engine.IO /
//! Socket.IO handshake, answers pings, and turns event frames into
//! [`PushEvent`]s.

use super::socketio::{self, Frame, CONNECT_FRAME, PONG_FRAME};
use super::source::{EventSource, EventStream};
use crate::connection::{ConnectionConfig, PushEvent};
use crate::{Result, SyncError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Default time allowed for the WebSocket upgrade
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Push-event source speaking Socket.IO (Engine.IO v4) over WebSocket
#[derive(Debug, Clone)]
pub struct SocketIoSource {
    url: String,
    handshake_timeout: Duration,
}

impl SocketIoSource {
    /// Create a source for a full Socket.IO WebSocket URL, e.g.
    /// `ws://localhost:5000/socket.io/?EIO=4&transport=websocket`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    /// Source for the endpoint and handshake timeout of a connection config
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.events_url.clone()).with_handshake_timeout(config.handshake_timeout)
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }
}

#[async_trait]
impl EventSource for SocketIoSource {
    async fn connect(&self) -> Result<EventStream> {
        debug!("Opening push-event socket to {}", self.url);

        let (ws, _response) = timeout(self.handshake_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                SyncError::Timeout(format!(
                    "WebSocket handshake with {} after {:?}",
                    self.url, self.handshake_timeout
                ))
            })??;

        info!("WebSocket open to {}", self.url);
        let (mut sink, mut frames) = ws.split();

        let events = async_stream::stream! {
            while let Some(message) = frames.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(frame)) => {
                        debug!("Server closed push socket: {:?}", frame);
                        yield Ok(PushEvent::Disconnect);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        yield Err(SyncError::from(e));
                        break;
                    }
                };

                let frame = match socketio::decode(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Skipping undecodable push frame: {}", e);
                        continue;
                    }
                };

                match frame {
                    Frame::Open(handshake) => {
                        debug!("Engine handshake: {}", handshake);
                        if let Err(e) = sink.send(Message::text(CONNECT_FRAME)).await {
                            yield Err(SyncError::from(e));
                            break;
                        }
                    }
                    Frame::Ping => {
                        if let Err(e) = sink.send(Message::text(PONG_FRAME)).await {
                            yield Err(SyncError::from(e));
                            break;
                        }
                    }
                    Frame::Connect => yield Ok(PushEvent::Connect),
                    Frame::Event { name, payload } => {
                        yield Ok(PushEvent::from_wire(&name, payload));
                    }
                    Frame::Disconnect | Frame::Close => {
                        yield Ok(PushEvent::Disconnect);
                        break;
                    }
                    Frame::ConnectError(reason) => {
                        yield Err(SyncError::Connection(format!(
                            "namespace connect rejected: {}",
                            reason
                        )));
                        break;
                    }
                    Frame::Pong | Frame::Upgrade | Frame::Noop | Frame::Ignored => {}
                }
            }

            let _ = sink.close().await;
        };

        Ok(Box::pin(events))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_uses_connection_settings() {
        let config = ConnectionConfig {
            events_url: "ws://files.internal:5000/socket.io/?EIO=4&transport=websocket"
                .to_string(),
            handshake_timeout: Duration::from_secs(3),
            ..ConnectionConfig::default()
        };

        let source = SocketIoSource::from_config(&config);
        assert_eq!(source.endpoint(), config.events_url);
        assert_eq!(source.handshake_timeout, Duration::from_secs(3));

        let defaults = SocketIoSource::from_config(&ConnectionConfig::default());
        assert_eq!(defaults.handshake_timeout, HANDSHAKE_TIMEOUT);
    }
}
