//! Change detection on the ban file.
//!
//! [`FileChangeDetector`] owns the last known content of the file and the
//! single-slot critical section that guards it. Two kinds of callers take
//! the slot:
//!
//! - the event path ([`FileChangeDetector::on_external_change`]) uses a
//!   non-blocking acquire and drops the event when the slot is busy, which
//!   coalesces bursts of filesystem notifications into one pass;
//! - the reconciliation path ([`FileChangeDetector::acquire`]) waits for the
//!   slot so that periodic passes are never skipped.
//!
//! Writes made through the detector suppress watcher notifications until a
//! settle delay has passed so they are not mistaken for external edits.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{BanSyncError, Result};
use crate::fs_abstraction::{FileSystem, RealFileSystem};

/// Attempts made by a full read before giving up.
pub const READ_ATTEMPTS: u32 = 5;

/// Base step of the linear backoff between read attempts.
pub const READ_RETRY_STEP: Duration = Duration::from_millis(100);

/// Pause before reading after an external change, letting the writer finish.
pub const CHANGE_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// How long watcher events stay suppressed after a write of our own.
pub const WRITE_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Split file content into trimmed, non-blank lines.
pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render lines as file content, one per line, newline-terminated.
pub fn render_lines(lines: &[String]) -> String {
    let mut content = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    content
}

/// The last successfully read or written content of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSnapshot {
    lines: Vec<String>,
}

impl FileSnapshot {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Set difference against a newer snapshot. Order and duplicates are ignored.
    pub fn diff(&self, current: &FileSnapshot) -> FileDelta {
        FileDelta {
            added: set_minus(&current.lines, &self.lines),
            removed: set_minus(&self.lines, &current.lines),
        }
    }
}

fn set_minus(left: &[String], right: &[String]) -> Vec<String> {
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|line| !right.contains(line.as_str()) && seen.insert(line.as_str()))
        .cloned()
        .collect()
}

/// Lines that appeared in or disappeared from the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl FileDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Notifications published to subscribers of the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    LinesAdded(Vec<String>),
    LinesRemoved(Vec<String>),
}

/// Result of one pass of the event path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Another pass held the slot; the event was folded into it.
    Coalesced,
    Unchanged,
    Changed(FileDelta),
    /// The file could not be read; the snapshot was left as is.
    ReadFailed,
}

#[derive(Debug, Default)]
struct DetectorState {
    snapshot: Option<FileSnapshot>,
}

/// Watches one file and reports line-set changes.
pub struct FileChangeDetector {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    state: Mutex<DetectorState>,
    suppressed: Arc<AtomicBool>,
    watching: AtomicBool,
    subscribers: Vec<mpsc::UnboundedSender<DetectorEvent>>,
    /// Added lines reported to subscribers and not yet handled by them
    pending_added: DashSet<String>,
    change_settle: Duration,
    write_settle: Duration,
}

impl FileChangeDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, Arc::new(RealFileSystem))
    }

    pub fn with_fs(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
            state: Mutex::new(DetectorState::default()),
            suppressed: Arc::new(AtomicBool::new(false)),
            watching: AtomicBool::new(false),
            subscribers: Vec::new(),
            pending_added: DashSet::new(),
            change_settle: CHANGE_SETTLE_DELAY,
            write_settle: WRITE_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delays(mut self, change: Duration, write: Duration) -> Self {
        self.change_settle = change;
        self.write_settle = write;
        self
    }

    /// Register a receiver for added/removed line events.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DetectorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while a reconciliation or change-detection pass holds the slot.
    pub fn is_processing(&self) -> bool {
        self.state.try_lock().is_err()
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    /// Whether the file can currently be opened for reading.
    pub fn is_accessible(&self) -> bool {
        self.fs.read_to_string(&self.path).is_ok()
    }

    /// Create an empty file (and its directory) if none exists.
    /// Returns true when the file was created.
    pub async fn ensure_exists(&self) -> Result<bool> {
        let _slot = self.acquire().await;
        if self.fs.exists(&self.path) {
            return Ok(false);
        }

        let created = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => self.fs.create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|()| self.fs.replace(&self.path, b""));

        created.map_err(|source| BanSyncError::FileWrite {
            path: self.path.clone(),
            source,
        })?;
        info!("Created ban file {}", self.path.display());
        Ok(true)
    }

    /// True if `line` was reported as added and its handler has not finished.
    pub fn is_pending(&self, line: &str) -> bool {
        self.pending_added.contains(line)
    }

    /// Mark reported lines as handled.
    pub fn clear_pending(&self, lines: &[String]) {
        for line in lines {
            self.pending_added.remove(line.trim());
        }
    }

    /// Wait for the critical section.
    pub async fn acquire(&self) -> DetectorSlot<'_> {
        DetectorSlot {
            detector: self,
            state: self.state.lock().await,
        }
    }

    /// Take the critical section only if it is free.
    pub fn try_acquire(&self) -> Option<DetectorSlot<'_>> {
        self.state.try_lock().ok().map(|state| DetectorSlot {
            detector: self,
            state,
        })
    }

    /// Read the file without taking the slot.
    pub async fn read_all(&self) -> Result<Vec<String>> {
        self.read_with_retry().await
    }

    /// Replace the file content, waiting for the slot first.
    pub async fn write_all(&self, lines: &[String]) -> Result<()> {
        self.acquire().await.write_all(lines).await
    }

    /// Record the current file content as the baseline for change detection.
    pub async fn prime(&self) -> Result<usize> {
        let mut slot = self.acquire().await;
        let lines = slot.read_all().await?;
        let count = lines.len();
        slot.state.snapshot = Some(FileSnapshot::new(lines));
        debug!("Primed snapshot of {} with {} lines", self.path.display(), count);
        Ok(count)
    }

    pub async fn snapshot(&self) -> Option<FileSnapshot> {
        self.state.lock().await.snapshot.clone()
    }

    /// Handle one filesystem notification for the watched file.
    ///
    /// Subscribers are notified before the snapshot is replaced and before
    /// the slot is released.
    pub async fn on_external_change(&self) -> ChangeOutcome {
        let Some(mut slot) = self.try_acquire() else {
            debug!("Ignoring file change event - already processing");
            return ChangeOutcome::Coalesced;
        };

        tokio::time::sleep(self.change_settle).await;

        let current = match slot.read_all().await {
            Ok(lines) => FileSnapshot::new(lines),
            Err(e) => {
                warn!("Skipping change detection pass: {}", e);
                return ChangeOutcome::ReadFailed;
            }
        };

        let delta = slot
            .state
            .snapshot
            .as_ref()
            .map(|previous| {
                debug!(
                    "Comparing {} current lines with {} previous lines",
                    current.len(),
                    previous.len()
                );
                previous.diff(&current)
            });

        let outcome = match delta {
            None => {
                debug!("No baseline yet, recording {} lines", current.len());
                ChangeOutcome::Unchanged
            }
            Some(delta) if delta.is_empty() => {
                debug!("No changes detected in file content");
                ChangeOutcome::Unchanged
            }
            Some(delta) => {
                if !delta.added.is_empty() {
                    info!("Detected {} new lines in file", delta.added.len());
                    if !self.subscribers.is_empty() {
                        for line in &delta.added {
                            self.pending_added.insert(line.clone());
                        }
                    }
                    self.emit(DetectorEvent::LinesAdded(delta.added.clone()));
                }
                if !delta.removed.is_empty() {
                    info!("Detected {} removed lines in file", delta.removed.len());
                    for line in &delta.removed {
                        self.pending_added.remove(line);
                    }
                    self.emit(DetectorEvent::LinesRemoved(delta.removed.clone()));
                }
                ChangeOutcome::Changed(delta)
            }
        };

        slot.state.snapshot = Some(current);
        outcome
    }

    /// Start delivering filesystem notifications to [`Self::on_external_change`].
    ///
    /// The parent directory is watched so that replacements by rename are
    /// observed. Dropping the returned handle stops the watch.
    pub fn watch(self: &Arc<Self>) -> Result<FileWatch> {
        let file_name: OsString = self
            .path
            .file_name()
            .ok_or_else(|| {
                BanSyncError::Watcher(format!("{} has no file name", self.path.display()))
            })?
            .to_os_string();
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<EventKind>();
        let suppressed = Arc::clone(&self.suppressed);
        let watched = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if suppressed.load(Ordering::SeqCst) || !is_content_event(&event.kind) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if ours && tx.send(event.kind).is_err() {
                        debug!("File watch channel closed");
                    }
                }
                Err(e) => error!("File watcher error for {}: {}", watched.display(), e),
            },
            NotifyConfig::default(),
        )
        .map_err(|e| BanSyncError::Watcher(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                BanSyncError::Watcher(format!("Failed to watch {}: {}", dir.display(), e))
            })?;
        self.watching.store(true, Ordering::SeqCst);

        let detector = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(kind) = rx.recv().await {
                debug!("File change detected: {:?}", kind);
                let detector = Arc::clone(&detector);
                tokio::spawn(async move {
                    detector.on_external_change().await;
                });
            }
        });

        info!("Watching {} for changes", self.path.display());
        Ok(FileWatch {
            _watcher: watcher,
            task,
            detector: Arc::clone(self),
        })
    }

    fn emit(&self, event: DetectorEvent) {
        for tx in &self.subscribers {
            if tx.send(event.clone()).is_err() {
                debug!("Dropping detector event for a closed subscriber");
            }
        }
    }

    async fn read_with_retry(&self) -> Result<Vec<String>> {
        let mut attempt = 1;
        loop {
            match self.fs.read_to_string(&self.path) {
                Ok(content) => {
                    let lines = parse_lines(&content);
                    debug!(
                        "Read {} lines from {} on attempt {}",
                        lines.len(),
                        self.path.display(),
                        attempt
                    );
                    return Ok(lines);
                }
                Err(e) if attempt < READ_ATTEMPTS => {
                    debug!(
                        "Read of {} failed on attempt {}/{}: {}",
                        self.path.display(),
                        attempt,
                        READ_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(READ_RETRY_STEP * attempt).await;
                    attempt += 1;
                }
                Err(source) => {
                    error!(
                        "Failed to read {} after {} attempts",
                        self.path.display(),
                        attempt
                    );
                    return Err(BanSyncError::FileAccess {
                        path: self.path.clone(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

fn is_content_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Exclusive access to the file and its snapshot.
pub struct DetectorSlot<'a> {
    detector: &'a FileChangeDetector,
    state: MutexGuard<'a, DetectorState>,
}

impl DetectorSlot<'_> {
    pub async fn read_all(&self) -> Result<Vec<String>> {
        self.detector.read_with_retry().await
    }

    /// The baseline, if one has been recorded.
    pub fn snapshot(&self) -> Option<&FileSnapshot> {
        self.state.snapshot.as_ref()
    }

    /// Record lines read under this slot as the baseline without writing.
    pub fn record_snapshot(&mut self, lines: Vec<String>) {
        self.state.snapshot = Some(FileSnapshot::new(lines));
    }

    /// Replace the whole file and record it as the new baseline.
    pub async fn write_all(&mut self, lines: &[String]) -> Result<()> {
        let detector = self.detector;
        let lines: Vec<String> = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        let _suppress = SuppressGuard::engage(&detector.suppressed);
        let result = detector
            .fs
            .replace(&detector.path, render_lines(&lines).as_bytes());

        match &result {
            Ok(()) => {
                info!(
                    "Wrote {} lines to {}",
                    lines.len(),
                    detector.path.display()
                );
                self.state.snapshot = Some(FileSnapshot::new(lines));
            }
            Err(e) => error!("Error writing to {}: {}", detector.path.display(), e),
        }

        if detector.is_watching() {
            tokio::time::sleep(detector.write_settle).await;
        }

        result.map_err(|source| BanSyncError::FileWrite {
            path: detector.path.clone(),
            source,
        })
    }
}

struct SuppressGuard<'a>(&'a AtomicBool);

impl<'a> SuppressGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle for an active watch. Dropping it stops the watch.
pub struct FileWatch {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    detector: Arc<FileChangeDetector>,
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.detector.watching.store(false, Ordering::SeqCst);
        self.task.abort();
        debug!("Stopped watching {}", self.detector.path.display());
    }
}
