// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Polling change detector for directory-backed document stores.
//
// The watcher keeps a snapshot (file name -> id, mtime, size) of the source
// directory and, on every tick, diffs it against a fresh one. Files present
// only in the new snapshot are `added`, files whose mtime or size moved are
// `changed`, files present only in the old snapshot are `deleted`. The new
// snapshot becomes the baseline whatever the handlers do with the events.
//
// Polling is used instead of OS notifications so that the same code runs on
// every platform and over any `SnapshotSource`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::document::Document;
use crate::error::StorageError;

/// Default time between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Point-in-time state of one document file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    /// File name within the watched directory.
    pub file_name: String,
    /// Document id derived from the file name.
    pub id: String,
    /// Last modification time.
    pub last_modified: SystemTime,
    /// Size in bytes.
    pub size: u64,
}

/// Snapshot of a whole directory, keyed by file name.
pub type DirectorySnapshot = BTreeMap<String, FileSnapshot>;

/// Something the watcher can take snapshots of and load files from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Describe every recognized document file currently present.
    async fn snapshot(&self) -> Result<DirectorySnapshot, StorageError>;

    /// Read the document stored in `file_name`.
    async fn load(&self, file_name: &str) -> Result<Document, StorageError>;
}

/// One difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// Present now, absent before.
    Added(FileSnapshot),
    /// Present in both with a different mtime or size.
    Changed(FileSnapshot),
    /// Present before, absent now.
    Deleted(FileSnapshot),
}

impl FileChange {
    /// The snapshot entry this change refers to.
    pub fn file(&self) -> &FileSnapshot {
        match self {
            FileChange::Added(f) | FileChange::Changed(f) | FileChange::Deleted(f) => f,
        }
    }
}

/// Compare two snapshots by file name.
///
/// Changes come out as additions and modifications in file-name order,
/// followed by deletions in file-name order.
pub fn diff_snapshots(old: &DirectorySnapshot, new: &DirectorySnapshot) -> Vec<FileChange> {
    let mut changes = Vec::new();
    for (name, current) in new {
        match old.get(name) {
            None => changes.push(FileChange::Added(current.clone())),
            Some(previous)
                if previous.last_modified != current.last_modified
                    || previous.size != current.size =>
            {
                changes.push(FileChange::Changed(current.clone()))
            }
            Some(_) => {}
        }
    }
    for (name, previous) in old {
        if !new.contains_key(name) {
            changes.push(FileChange::Deleted(previous.clone()));
        }
    }
    changes
}

/// Receives watcher events. All methods default to doing nothing.
pub trait WatchHandler: Send + Sync {
    /// A new document file appeared.
    fn on_file_added(&self, _id: &str, _doc: Document) {}

    /// An existing document file was modified.
    fn on_file_changed(&self, _id: &str, _doc: Document) {}

    /// A document file disappeared.
    fn on_file_deleted(&self, _id: &str) {}

    /// Taking a snapshot failed; the tick was skipped.
    fn on_error(&self, _error: &StorageError) {}
}

/// Lifecycle state of a [`FileWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// No poll loop is running.
    Stopped,
    /// The poll loop is running.
    Watching,
}

/// Shared by the poll loop and [`FileWatcher::poll_once`].
struct PollCore {
    source: Arc<dyn SnapshotSource>,
    handler: Arc<dyn WatchHandler>,
    baseline: Mutex<DirectorySnapshot>,
}

impl PollCore {
    /// Run one snapshot/diff/dispatch cycle and return what changed.
    async fn poll(&self) -> Vec<FileChange> {
        // Held for the whole cycle so overlapping polls cannot interleave.
        let mut baseline = self.baseline.lock().await;

        let current = match self.source.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "directory snapshot failed");
                self.handler.on_error(&e);
                return Vec::new();
            }
        };

        let changes = diff_snapshots(&baseline, &current);
        *baseline = current;

        for change in &changes {
            let file = change.file();
            match change {
                FileChange::Added(_) | FileChange::Changed(_) => {
                    let doc = match self.source.load(&file.file_name).await {
                        Ok(doc) => doc,
                        Err(e) => {
                            warn!(file = %file.file_name, error = %e, "skipping unreadable file");
                            continue;
                        }
                    };
                    if matches!(change, FileChange::Added(_)) {
                        debug!(id = %file.id, "file added");
                        self.handler.on_file_added(&file.id, doc);
                    } else {
                        debug!(id = %file.id, "file changed");
                        self.handler.on_file_changed(&file.id, doc);
                    }
                }
                FileChange::Deleted(_) => {
                    debug!(id = %file.id, "file deleted");
                    self.handler.on_file_deleted(&file.id);
                }
            }
        }
        changes
    }
}

struct PollLoop {
    core: Arc<PollCore>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollLoop {
    fn spawn(core: Arc<PollCore>, period: Duration) -> Self {
        let (shutdown, mut stop_rx) = watch::channel(false);
        let loop_core = Arc::clone(&core);
        // `interval` panics on a zero period.
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the baseline is fresh.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        loop_core.poll().await;
                    }
                }
            }
        });
        Self {
            core,
            shutdown,
            handle,
        }
    }

    /// Signal the loop and wait for an in-flight poll to finish.
    async fn halt(self) -> Arc<PollCore> {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "watch loop ended abnormally");
        }
        self.core
    }
}

struct WatcherInner {
    source: Option<Arc<dyn SnapshotSource>>,
    poll_interval: Duration,
    running: Option<PollLoop>,
}

/// Polling watcher over a single [`SnapshotSource`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use notas_storage::document::Document;
/// use notas_storage::filesystem::FileSystemBackend;
/// use notas_storage::watcher::{FileWatcher, WatchHandler};
///
/// struct Printer;
/// impl WatchHandler for Printer {
///     fn on_file_added(&self, id: &str, _doc: Document) {
///         println!("added {id}");
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let watcher = FileWatcher::new(Arc::new(Printer));
/// watcher.set_backend(Arc::new(FileSystemBackend::new("/tmp/notas-docs"))).await.unwrap();
/// watcher.start().await.unwrap();
/// # });
/// ```
pub struct FileWatcher {
    handler: Arc<dyn WatchHandler>,
    inner: Mutex<WatcherInner>,
}

impl FileWatcher {
    /// Create a stopped watcher reporting to `handler`.
    pub fn new(handler: Arc<dyn WatchHandler>) -> Self {
        Self::with_interval(handler, DEFAULT_POLL_INTERVAL)
    }

    /// Create a stopped watcher with a custom poll interval.
    pub fn with_interval(handler: Arc<dyn WatchHandler>, poll_interval: Duration) -> Self {
        Self {
            handler,
            inner: Mutex::new(WatcherInner {
                source: None,
                poll_interval,
                running: None,
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WatchState {
        if self.inner.lock().await.running.is_some() {
            WatchState::Watching
        } else {
            WatchState::Stopped
        }
    }

    /// The configured poll interval.
    pub async fn poll_interval(&self) -> Duration {
        self.inner.lock().await.poll_interval
    }

    /// Attach `source`, replacing any previous one. A running watcher is
    /// restarted against the new source with a fresh baseline.
    pub async fn set_backend(&self, source: Arc<dyn SnapshotSource>) -> Result<(), StorageError> {
        let was_running = {
            let mut inner = self.inner.lock().await;
            inner.source = Some(source);
            match inner.running.take() {
                Some(running) => {
                    running.halt().await;
                    true
                }
                None => false,
            }
        };
        if was_running {
            self.start().await?;
        }
        Ok(())
    }

    /// Take the initial snapshot and begin polling.
    ///
    /// Starting a running watcher is a no-op. Fails with
    /// [`StorageError::NotConfigured`] if no source has been attached.
    pub async fn start(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        if inner.running.is_some() {
            warn!("file watcher already running");
            return Ok(());
        }
        let source = inner
            .source
            .clone()
            .ok_or_else(|| StorageError::NotConfigured("file watcher has no backend".to_string()))?;

        let baseline = source.snapshot().await?;
        info!(
            files = baseline.len(),
            interval_ms = inner.poll_interval.as_millis() as u64,
            "file watcher started"
        );

        let core = Arc::new(PollCore {
            source,
            handler: Arc::clone(&self.handler),
            baseline: Mutex::new(baseline),
        });
        inner.running = Some(PollLoop::spawn(core, inner.poll_interval));
        Ok(())
    }

    /// Stop polling. An in-flight poll completes; no further polls run.
    pub async fn stop(&self) {
        let running = self.inner.lock().await.running.take();
        if let Some(running) = running {
            running.halt().await;
            info!("file watcher stopped");
        }
    }

    /// Change the poll interval, restarting the loop if it is running. The
    /// current baseline is kept.
    pub async fn set_poll_interval(&self, poll_interval: Duration) {
        let mut inner = self.inner.lock().await;
        inner.poll_interval = poll_interval;
        if let Some(running) = inner.running.take() {
            let core = running.halt().await;
            inner.running = Some(PollLoop::spawn(core, poll_interval));
            debug!(interval_ms = poll_interval.as_millis() as u64, "poll loop restarted");
        }
    }

    /// Run one poll cycle immediately, outside the timer.
    pub async fn poll_once(&self) -> Result<Vec<FileChange>, StorageError> {
        let core = {
            let inner = self.inner.lock().await;
            match &inner.running {
                Some(running) => Arc::clone(&running.core),
                None => {
                    return Err(StorageError::NotConfigured(
                        "file watcher is not running".to_string(),
                    ))
                }
            }
        };
        Ok(core.poll().await)
    }
}
