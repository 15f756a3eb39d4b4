//! Refresh Trigger
//!
//! Re-queries a view's authoritative data whenever the notification store
//! version changes. Each query gets a sequence number when it starts; a
//! result is applied only if no later query has started since, so a slow
//! stale response can never overwrite fresher data. In-flight queries are
//! never cancelled, only discarded.
//!
//! Failures keep the previous data and record a soft error in the
//! [`ViewSnapshot`].

use crate::api::{DashboardData, FileRecord, FileStore};
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One read query a view depends on
#[async_trait]
pub trait ViewQuery: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// Short name for logs
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Self::Output>;
}

/// Latest state of a refreshed view
#[derive(Debug)]
pub struct ViewSnapshot<T> {
    /// Last successfully fetched data
    pub data: Option<Arc<T>>,
    /// Text of the last failure, cleared by the next success
    pub error: Option<String>,
    /// A query newer than the applied one is in flight
    pub loading: bool,
    /// Sequence number of the query whose result is shown
    pub applied_request: u64,
}

impl<T> Clone for ViewSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            loading: self.loading,
            applied_request: self.applied_request,
        }
    }
}

impl<T> Default for ViewSnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
            applied_request: 0,
        }
    }
}

impl<T> ViewSnapshot<T> {
    /// Data is shown but the last refresh failed
    pub fn is_stale(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }
}

struct TriggerInner<Q: ViewQuery> {
    query: Q,
    started: AtomicU64,
    snapshot: watch::Sender<ViewSnapshot<Q::Output>>,
}

impl<Q: ViewQuery> TriggerInner<Q> {
    fn issue(self: &Arc<Self>) -> u64 {
        let seq = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        self.snapshot.send_if_modified(|snapshot| {
            let changed = !snapshot.loading;
            snapshot.loading = true;
            changed
        });
        debug!("Refreshing {} (request {})", self.query.name(), seq);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.query.fetch().await;
            inner.apply(seq, result);
        });
        seq
    }

    fn apply(&self, seq: u64, result: Result<Q::Output>) {
        self.snapshot.send_if_modified(|snapshot| {
            let latest = self.started.load(Ordering::SeqCst);
            if seq != latest {
                debug!(
                    "Discarding {} result of request {} (latest is {})",
                    self.query.name(),
                    seq,
                    latest
                );
                return false;
            }

            match result {
                Ok(data) => {
                    snapshot.data = Some(Arc::new(data));
                    snapshot.error = None;
                }
                Err(e) => {
                    warn!("Refreshing {} failed: {}", self.query.name(), e);
                    snapshot.error = Some(e.user_message());
                }
            }
            snapshot.loading = false;
            snapshot.applied_request = seq;
            true
        });
    }
}

/// Keeps one view's data in step with the notification store
pub struct RefreshTrigger<Q: ViewQuery> {
    inner: Arc<TriggerInner<Q>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl<Q: ViewQuery> fmt::Debug for RefreshTrigger<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTrigger")
            .field("query", &self.inner.query.name())
            .field("requests_started", &self.requests_started())
            .finish()
    }
}

impl<Q: ViewQuery> RefreshTrigger<Q> {
    /// Fetch once now, then again on every change of `versions`
    ///
    /// `versions` is normally [`crate::NotificationStore::subscribe`].
    pub fn spawn(query: Q, mut versions: watch::Receiver<u64>) -> Self {
        let inner = Arc::new(TriggerInner {
            query,
            started: AtomicU64::new(0),
            snapshot: watch::channel(ViewSnapshot::default()).0,
        });

        let driver_inner = Arc::clone(&inner);
        let driver = tokio::spawn(async move {
            versions.borrow_and_update();
            driver_inner.issue();
            while versions.changed().await.is_ok() {
                let version = *versions.borrow_and_update();
                debug!(
                    "Store version {} observed by {}",
                    version,
                    driver_inner.query.name()
                );
                driver_inner.issue();
            }
            debug!("Version source closed for {}", driver_inner.query.name());
        });

        Self {
            inner,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Issue a query outside the version stream; returns its sequence number
    pub fn refresh_now(&self) -> u64 {
        self.inner.issue()
    }

    pub fn snapshot(&self) -> ViewSnapshot<Q::Output> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot<Q::Output>> {
        self.inner.snapshot.subscribe()
    }

    pub fn requests_started(&self) -> u64 {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Stop reacting to version changes
    ///
    /// Queries already in flight still complete and may be applied.
    pub fn stop(&self) {
        if let Some(driver) = self.driver.lock().unwrap_or_else(|p| p.into_inner()).take() {
            driver.abort();
        }
    }
}

impl<Q: ViewQuery> Drop for RefreshTrigger<Q> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Dashboard aggregate stats
#[derive(Debug, Clone)]
pub struct DashboardQuery {
    store: Arc<dyn FileStore>,
}

impl DashboardQuery {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ViewQuery for DashboardQuery {
    type Output = DashboardData;

    fn name(&self) -> &str {
        "dashboard"
    }

    async fn fetch(&self) -> Result<DashboardData> {
        self.store.dashboard().await
    }
}

/// Full file collection
#[derive(Debug, Clone)]
pub struct FileListQuery {
    store: Arc<dyn FileStore>,
}

impl FileListQuery {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ViewQuery for FileListQuery {
    type Output = Vec<FileRecord>;

    fn name(&self) -> &str {
        "files"
    }

    async fn fetch(&self) -> Result<Vec<FileRecord>> {
        self.store.list_files().await
    }
}
