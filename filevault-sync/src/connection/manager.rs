//! Connection Manager
//!
//! Maintains the push-event link and drives its state machine:
//!
//! ```text
//! disconnected ──start()──► connecting ──connect──► connected
//!      ▲                      │    ▲                    │
//!      └──budget exhausted────┘    └────link lost───────┘
//! ```
//!
//! Connection attempts are spaced by a fixed delay; after the configured
//! number of consecutive failures the manager settles in `disconnected` and
//! does nothing further until [`ConnectionManager::start`] is called again.
//!
//! All I/O happens on one background task. Callers only observe state through
//! [`ConnectionManager::status`] / [`ConnectionManager::subscribe_status`].

use super::events::PushEvent;
use super::reconnect::{ReconnectionStrategy, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY};
use crate::notification::{NewNotification, NotificationStore, DEFAULT_NOTICE_TTL};
use crate::transport::{EventSource, EventStream, HANDSHAKE_TIMEOUT};
use futures::StreamExt;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default Socket.IO endpoint of the file server
const DEFAULT_EVENTS_URL: &str = "ws://localhost:5000/socket.io/?EIO=4&transport=websocket";

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Observable connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful connect
    pub failed_attempts: u32,
}

impl ConnectionStatus {
    fn new(state: ConnectionState, failed_attempts: u32) -> Self {
        Self {
            state,
            failed_attempts,
        }
    }
}

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Push-event endpoint
    pub events_url: String,
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// WebSocket handshake timeout, read by [`crate::SocketIoSource::from_config`]
    pub handshake_timeout: Duration,
    /// Lifetime of notices produced by push events
    pub notice_ttl: Duration,
    /// Announce reconnections with a notice so dependent views refetch
    /// anything missed during the outage
    pub refresh_on_reconnect: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            events_url: DEFAULT_EVENTS_URL.to_string(),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            retry_delay: RECONNECT_DELAY,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            notice_ttl: DEFAULT_NOTICE_TTL,
            refresh_on_reconnect: true,
        }
    }
}

/// How a single link ended
enum LinkOutcome {
    /// Never reached `connected`
    Failed,
    /// Was connected, then lost
    Lost,
}

struct Shared {
    config: ConnectionConfig,
    source: Arc<dyn EventSource>,
    notifications: NotificationStore,
    status: watch::Sender<ConnectionStatus>,
    /// Set by the first successful connect; survives `stop()` / `start()`
    has_connected: AtomicBool,
}

impl Shared {
    fn set_status(&self, state: ConnectionState, failed_attempts: u32) {
        self.status
            .send_if_modified(|current| {
                let next = ConnectionStatus::new(state, failed_attempts);
                if *current == next {
                    return false;
                }
                debug!("Connection status: {} -> {}", current.state, state);
                *current = next;
                true
            });
    }
}

/// Owner of the single push-event link
pub struct ConnectionManager {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.shared.source.endpoint())
            .field("status", &self.status())
            .finish()
    }
}

impl ConnectionManager {
    /// Create a manager; nothing happens until [`Self::start`]
    pub fn new(
        source: Arc<dyn EventSource>,
        notifications: NotificationStore,
        config: ConnectionConfig,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::new(ConnectionState::Disconnected, 0));
        Self {
            shared: Arc::new(Shared {
                config,
                source,
                notifications,
                status,
                has_connected: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Observe status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Begin connecting unless already connecting or connected
    ///
    /// Must be called within a tokio runtime. Never blocks on I/O.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                debug!("Connection manager already running");
                return;
            }
        }

        info!("Starting push-event connection to {}", self.shared.source.endpoint());
        self.shared.set_status(ConnectionState::Connecting, 0);
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(run(shared)));
    }

    /// Tear down the link and cancel pending retries
    ///
    /// When this returns, the background task has finished and its socket
    /// has been dropped.
    pub async fn stop(&self) {
        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            info!("Push-event connection stopped");
        }
        let failed = self.status().failed_attempts;
        self.shared.set_status(ConnectionState::Disconnected, failed);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

/// Background loop: connect, pump events, retry with fixed spacing
async fn run(shared: Arc<Shared>) {
    let mut strategy =
        ReconnectionStrategy::new(shared.config.max_attempts, shared.config.retry_delay);

    loop {
        shared.set_status(ConnectionState::Connecting, strategy.attempt);

        let outcome = match shared.source.connect().await {
            Ok(stream) => pump(&shared, stream, &mut strategy).await,
            Err(e) => {
                warn!(
                    "Failed to connect to {}: {}",
                    shared.source.endpoint(),
                    e
                );
                LinkOutcome::Failed
            }
        };

        let delay = match outcome {
            LinkOutcome::Lost => {
                info!("Push-event link lost, reconnecting");
                shared.set_status(ConnectionState::Connecting, strategy.attempt);
                Some(strategy.delay)
            }
            LinkOutcome::Failed => {
                let next = strategy.record_failure();
                if next.is_some() {
                    info!("Scheduling reconnection - {}", strategy.status());
                    shared.set_status(ConnectionState::Connecting, strategy.attempt);
                }
                next
            }
        };

        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => {
                warn!(
                    "Giving up on {} after {} failed attempts",
                    shared.source.endpoint(),
                    strategy.attempt
                );
                shared.set_status(ConnectionState::Disconnected, strategy.attempt);
                return;
            }
        }
    }
}

/// Read one link until it ends
async fn pump(
    shared: &Shared,
    mut stream: EventStream,
    strategy: &mut ReconnectionStrategy,
) -> LinkOutcome {
    let mut connected = false;

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                warn!("Push-event link error: {}", e);
                break;
            }
        };

        match event {
            PushEvent::Connect => {
                strategy.reset();
                shared.set_status(ConnectionState::Connected, 0);
                let reconnected = shared.has_connected.swap(true, Ordering::SeqCst);
                if reconnected && shared.config.refresh_on_reconnect {
                    shared.notifications.add(
                        NewNotification::info("Reconnected to server")
                            .expires_after(shared.config.notice_ttl),
                    );
                }
                info!("Connected to {}", shared.source.endpoint());
                connected = true;
            }
            PushEvent::Disconnect => {
                debug!("Server sent disconnect");
                break;
            }
            other => match other.notice(shared.config.notice_ttl) {
                Some(notice) => {
                    debug!("Dispatching '{}' event", other.name());
                    shared.notifications.add(notice);
                }
                None => debug!("Ignoring '{}' event", other.name()),
            },
        }
    }

    if connected {
        LinkOutcome::Lost
    } else {
        LinkOutcome::Failed
    }
}
