//! Notification Store
//!
//! Holds the ordered list of ephemeral notices shown to the user (upload
//! results, duplicate/anomaly alerts, connectivity changes).
//!
//! Every effective mutation bumps a monotonically increasing version that
//! other components observe through [`NotificationStore::subscribe`]. The
//! store is otherwise opaque to observers.
//!
//! ## Expiry
//!
//! A notice added with `expires_after` owns exactly one expiry task. Manual
//! removal and [`NotificationStore::clear`] abort the task, and the task only
//! holds a weak reference to the store, so no timer outlives the notice or
//! fires against a cleared store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifetime of notices produced by push events and upload results
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(5);

/// Unique, monotonically increasing notice identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl NotificationId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        };
        f.write_str(label)
    }
}

/// A notice as stored and exposed by the store. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_after: Option<Duration>,
}

/// A notice to be added; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub message: String,
    pub expires_after: Option<Duration>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            expires_after: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    /// Remove the notice automatically after `ttl`
    pub fn expires_after(mut self, ttl: Duration) -> Self {
        self.expires_after = Some(ttl);
        self
    }
}

#[derive(Default)]
struct StoreState {
    /// Newest first
    notices: VecDeque<Notification>,
    /// Pending expiry task per notice
    timers: HashMap<NotificationId, JoinHandle<()>>,
}

struct StoreInner {
    state: Mutex<StoreState>,
    version: watch::Sender<u64>,
    next_id: AtomicU64,
}

impl StoreInner {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A panic while holding the lock cannot leave the list half-edited
        // (every edit is a single push/remove), so recover the guard.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    /// Called by an expiry task once its deadline passed.
    fn expire(&self, id: NotificationId) {
        let mut state = self.lock();
        // The handle belongs to the running task itself; dropping it detaches.
        state.timers.remove(&id);
        let before = state.notices.len();
        state.notices.retain(|n| n.id != id);
        if state.notices.len() != before {
            debug!("Notification {} expired", id);
            self.bump();
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
    }
}

/// Ordered store of ephemeral notices with self-expiry
///
/// Cloning is cheap; all clones share the same list and version counter.
/// Expiring notices requires a running tokio runtime.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("NotificationStore")
            .field("len", &state.notices.len())
            .field("pending_timers", &state.timers.len())
            .field("version", &self.version())
            .finish()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                version,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Add a notice at the front of the list and return its id
    ///
    /// If the notice carries `expires_after`, exactly one deferred removal
    /// is scheduled for it.
    pub fn add(&self, notice: NewNotification) -> NotificationId {
        let id = NotificationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let notification = Notification {
            id,
            kind: notice.kind,
            message: notice.message,
            created_at: Utc::now(),
            expires_after: notice.expires_after,
        };

        debug!(
            "Adding {} notification {}: {}",
            notification.kind, id, notification.message
        );

        // The expiry task is registered while the lock is held so that it
        // cannot run its removal before its handle is recorded.
        let mut state = self.inner.lock();
        if let Some(ttl) = notification.expires_after {
            let weak = Arc::downgrade(&self.inner);
            let timer = spawn_expiry(weak, id, ttl);
            state.timers.insert(id, timer);
        }
        state.notices.push_front(notification);
        self.inner.bump();
        id
    }

    /// Remove a notice by id
    ///
    /// Idempotent: removing an unknown or already-removed id is a no-op and
    /// returns `false`. Any pending expiry for the notice is cancelled.
    pub fn remove(&self, id: NotificationId) -> bool {
        let mut state = self.inner.lock();
        if let Some(timer) = state.timers.remove(&id) {
            timer.abort();
        }
        let before = state.notices.len();
        state.notices.retain(|n| n.id != id);
        let removed = state.notices.len() != before;
        if removed {
            debug!("Removed notification {}", id);
            self.inner.bump();
        }
        removed
    }

    /// Remove every notice and cancel every pending expiry
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        let had_notices = !state.notices.is_empty();
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        state.notices.clear();
        if had_notices {
            debug!("Cleared all notifications");
            self.inner.bump();
        }
    }

    /// Snapshot of the current notices, newest first
    pub fn list(&self) -> Vec<Notification> {
        self.inner.lock().notices.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of expiry tasks still pending
    pub fn pending_expiries(&self) -> usize {
        self.inner.lock().timers.len()
    }

    /// Current store version
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Observe version changes
    ///
    /// The returned receiver treats the current version as already seen.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }
}

fn spawn_expiry(store: Weak<StoreInner>, id: NotificationId, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        match store.upgrade() {
            Some(inner) => inner.expire(id),
            None => warn!("Notification store dropped before {} expired", id),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_add_orders_newest_first() {
        let store = NotificationStore::new();
        let first = store.add(NewNotification::info("first"));
        let second = store.add(NewNotification::warning("second"));

        let list = store.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second);
        assert_eq!(list[1].id, first);
        assert!(second > first);
        assert_eq!(store.version(), 2);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = NotificationStore::new();
        let id = store.add(NewNotification::error("boom"));

        assert!(store.remove(id));
        assert!(!store.remove(id));
        assert!(store.is_empty());
        // add + one effective remove
        assert_eq!(store.version(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_not_before_deadline() {
        let store = NotificationStore::new();
        store.add(NewNotification::success("uploaded").expires_after(Duration::from_secs(5)));
        assert_eq!(store.pending_expiries(), 1);

        sleep(Duration::from_millis(4_999)).await;
        assert_eq!(store.len(), 1);

        sleep(Duration::from_millis(2)).await;
        assert!(store.is_empty());
        assert_eq!(store.pending_expiries(), 0);
        assert_eq!(store.version(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_remove_cancels_expiry() {
        let store = NotificationStore::new();
        let id = store.add(NewNotification::info("short").expires_after(Duration::from_secs(1)));
        store.add(NewNotification::info("sticky"));

        assert!(store.remove(id));
        assert_eq!(store.pending_expiries(), 0);
        let version = store.version();

        sleep(Duration::from_secs(3)).await;
        assert_eq!(store.version(), version);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_all_timers() {
        let store = NotificationStore::new();
        for i in 0..4 {
            store.add(
                NewNotification::warning(format!("notice {}", i))
                    .expires_after(Duration::from_millis(500 * (i + 1))),
            );
        }

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.pending_expiries(), 0);
        let version = store.version();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(store.version(), version);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_notice_expires_once() {
        let store = NotificationStore::new();
        let mut rx = store.subscribe();
        for secs in [3, 1, 2] {
            store.add(NewNotification::info("tick").expires_after(Duration::from_secs(secs)));
        }
        assert_eq!(store.version(), 3);

        sleep(Duration::from_secs(5)).await;
        assert!(store.is_empty());
        // three adds plus exactly three expiries
        assert_eq!(store.version(), 6);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 6);
    }

    #[tokio::test]
    async fn test_clear_on_empty_store_is_silent() {
        let store = NotificationStore::new();
        store.clear();
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&NotificationKind::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }
}
