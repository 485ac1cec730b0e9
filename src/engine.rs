//! Two-way reconciliation between the ban file and the ban table.
//!
//! The database is authoritative for the file: [`ReconciliationEngine::reconcile_now`]
//! rewrites the file to the set of active bans. Lines added to the file by
//! hand flow the other way through [`ReconciliationEngine::on_new_lines_from_file`],
//! which inserts a permanent ban for each new identifier.
//!
//! A pass holds the detector slot only while it reads and writes the file.
//! Store queries happen before the slot is taken, name lookups and
//! notifications after it is released.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::detector::{DetectorEvent, FileChangeDetector, FileSnapshot};
use crate::error::{BanSyncError, Result};
use crate::notifier::Notifier;
use crate::resolver::NameResolver;
use crate::retry::RetryPolicy;
use crate::steam_id::{SteamId2, SteamId64};
use crate::store::{BanRecord, BanStore};

/// Name recorded and announced when the player's name cannot be resolved.
pub const UNKNOWN_PLAYER: &str = "Unknown Player";

/// Summary of one database-to-file pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Active bans visible to this server
    pub active: usize,
    pub written: bool,
    /// Active bans that were not in the file before this pass
    pub newly_added: Vec<SteamId64>,
    /// Lines found in the file that the detector had not reported yet
    pub absorbed: Vec<String>,
}

pub struct ReconciliationEngine {
    detector: Arc<FileChangeDetector>,
    store: Arc<dyn BanStore>,
    resolver: Arc<dyn NameResolver>,
    notifier: Arc<dyn Notifier>,
    server_id: u32,
    retry: RetryPolicy,
    /// Identifiers currently going through the file-to-database pipeline
    in_flight: DashSet<SteamId64>,
    /// Counts database-to-file passes; bumped before each pass queries the store
    epoch: AtomicU64,
    /// Identifiers the file-to-database pipeline finished with, keyed by the
    /// epoch current when it finished
    settled: DashMap<SteamId64, u64>,
}

impl ReconciliationEngine {
    pub fn new(
        detector: Arc<FileChangeDetector>,
        store: Arc<dyn BanStore>,
        resolver: Arc<dyn NameResolver>,
        notifier: Arc<dyn Notifier>,
        server_id: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            detector,
            store,
            resolver,
            notifier,
            server_id,
            retry,
            in_flight: DashSet::new(),
            epoch: AtomicU64::new(0),
            settled: DashMap::new(),
        }
    }

    pub fn detector(&self) -> &Arc<FileChangeDetector> {
        &self.detector
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    /// Probe the store through the retry policy.
    pub async fn test_connectivity(&self, cancel: &CancellationToken) -> bool {
        match self
            .retry
            .run("test_connectivity", cancel, || self.store.test_connectivity())
            .await
        {
            Ok(()) => {
                info!("Database connection test successful");
                true
            }
            Err(e) => {
                error!("Database connection test failed: {}", e);
                false
            }
        }
    }

    /// Bring the file in line with the active bans of the store.
    ///
    /// On a store failure the file is left untouched.
    pub async fn reconcile_now(&self, cancel: &CancellationToken) -> Result<ReconcileReport> {
        debug!("Starting database to file synchronization");

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let active = self.fetch_active_bans(cancel).await?;

        let mut slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BanSyncError::Cancelled),
            slot = self.detector.acquire() => slot,
        };

        let file_lines = slot.read_all().await?;
        let current: HashSet<&str> = file_lines.iter().map(String::as_str).collect();

        // Lines that reached the file after the detector's last look are
        // still owed to the file-to-database pipeline; keep them.
        let absorbed: Vec<String> = match slot.snapshot() {
            Some(snapshot) => {
                snapshot
                    .diff(&FileSnapshot::new(file_lines.clone()))
                    .added
            }
            None => Vec::new(),
        };

        let mut retained: BTreeSet<SteamId64> = absorbed
            .iter()
            .filter_map(|line| line.parse().ok())
            .collect();
        // Reported lines whose handler has not run yet, ids being banned
        // right now, and ids banned after this pass queried the store.
        for line in &current {
            if self.detector.is_pending(line) {
                if let Ok(id) = line.parse() {
                    retained.insert(id);
                }
            }
        }
        for id in self.in_flight.iter() {
            if current.contains(id.to_string().as_str()) {
                retained.insert(*id);
            }
        }
        for entry in self.settled.iter() {
            if *entry.value() >= epoch && current.contains(entry.key().to_string().as_str()) {
                retained.insert(*entry.key());
            }
        }

        let target: BTreeSet<SteamId64> = active.union(&retained).copied().collect();
        let target_lines: Vec<String> = target.iter().map(ToString::to_string).collect();
        let target_set: HashSet<&str> = target_lines.iter().map(String::as_str).collect();

        let newly_added: Vec<SteamId64> = active
            .iter()
            .filter(|id| !current.contains(id.to_string().as_str()))
            .copied()
            .collect();

        let written = if target_set == current {
            debug!("No changes detected during sync");
            slot.record_snapshot(file_lines.clone());
            false
        } else {
            slot.write_all(&target_lines).await?;
            true
        };
        drop(slot);
        self.settled.retain(|_, settled_at| *settled_at >= epoch);

        info!("Synchronized {} active bans to file", active.len());

        if !newly_added.is_empty() {
            let mut notifications = Vec::with_capacity(newly_added.len());
            for id in &newly_added {
                let resolved = tokio::select! {
                    _ = cancel.cancelled() => None,
                    name = self.resolver.resolve(*id) => name,
                };
                match resolved {
                    Some(name) if !name.trim().is_empty() => notifications.push((*id, name)),
                    _ => warn!(
                        "Could not retrieve player name for {}, skipping notification",
                        id
                    ),
                }
            }
            if !notifications.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => debug!("Notification dispatch cancelled"),
                    _ = self.notifier.notify_batch(&notifications) => {}
                }
            }
        }

        if !absorbed.is_empty() {
            info!(
                "Processing {} lines added to the file since the last change event",
                absorbed.len()
            );
            self.on_new_lines_from_file(&absorbed, cancel).await;
        }

        Ok(ReconcileReport {
            active: active.len(),
            written,
            newly_added,
            absorbed,
        })
    }

    /// Create a ban for each new identifier that has no active ban yet.
    ///
    /// Each identifier is handled on its own; a failure is logged and the
    /// rest still run. Returns the identifiers that were banned.
    pub async fn on_new_lines_from_file(
        &self,
        lines: &[String],
        cancel: &CancellationToken,
    ) -> Vec<SteamId64> {
        info!("Processing {} new lines from file", lines.len());
        let mut banned = Vec::new();

        for line in lines {
            if cancel.is_cancelled() {
                debug!("Stopping new line processing on shutdown");
                break;
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let id: SteamId64 = match line.parse() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Invalid SteamID64 format '{}': {}", line, e);
                    continue;
                }
            };

            if !self.in_flight.insert(id) {
                debug!("{} is already being processed", id);
                continue;
            }
            let result = self.ban_new_id(id, cancel).await;
            self.settled.insert(id, self.epoch.load(Ordering::SeqCst));
            self.in_flight.remove(&id);

            match result {
                Ok(true) => banned.push(id),
                Ok(false) => {}
                Err(e) => error!("Error processing new SteamID {}: {}", id, e),
            }
        }

        self.detector.clear_pending(lines);
        banned
    }

    /// Removals from the file are only recorded; no unban is performed.
    pub fn on_lines_removed_from_file(&self, lines: &[String]) {
        info!("Detected {} removed lines from file", lines.len());
        for line in lines {
            debug!("Removed from file: {}", line);
        }
    }

    /// Route a detector event to its handler.
    pub async fn handle_event(&self, event: DetectorEvent, cancel: &CancellationToken) {
        match event {
            DetectorEvent::LinesAdded(lines) => {
                self.on_new_lines_from_file(&lines, cancel).await;
            }
            DetectorEvent::LinesRemoved(lines) => self.on_lines_removed_from_file(&lines),
        }
    }

    async fn fetch_active_bans(&self, cancel: &CancellationToken) -> Result<BTreeSet<SteamId64>> {
        let raw = self
            .retry
            .run("list_active_ban_ids", cancel, || {
                self.store.list_active_ban_ids(self.server_id)
            })
            .await?;

        let mut active = BTreeSet::new();
        for auth_id in &raw {
            match auth_id.trim().parse::<SteamId2>() {
                Ok(id) => {
                    active.insert(id.to_steam64());
                }
                Err(e) => warn!("Could not convert SteamID2 '{}': {}", auth_id, e),
            }
        }
        Ok(active)
    }

    /// Returns Ok(false) when the ban already exists.
    async fn ban_new_id(&self, id: SteamId64, cancel: &CancellationToken) -> Result<bool> {
        let auth_id = id.to_steam2();

        let exists = self
            .retry
            .run(format!("exists_active_ban({})", auth_id), cancel, || {
                self.store.exists_active_ban(&auth_id)
            })
            .await?;
        if exists {
            debug!("SteamID {} already exists in database", id);
            return Ok(false);
        }

        let name = self.resolve_name(id, cancel).await;
        let record = BanRecord::permanent(
            auth_id,
            name.clone(),
            self.server_id,
            chrono::Utc::now().timestamp(),
        );

        self.retry
            .run(format!("insert_ban({})", auth_id), cancel, || {
                self.store.insert_ban(&record)
            })
            .await?;

        tokio::select! {
            _ = cancel.cancelled() => debug!("Notification for {} cancelled", id),
            _ = self.notifier.notify_new(id, &name) => {}
        }

        info!("Successfully processed new ban for {} ({})", name, id);
        Ok(true)
    }

    async fn resolve_name(&self, id: SteamId64, cancel: &CancellationToken) -> String {
        let resolved = tokio::select! {
            _ = cancel.cancelled() => None,
            name = self.resolver.resolve(id) => name,
        };

        match resolved {
            Some(name) if !name.trim().is_empty() => name,
            _ => {
                warn!("Could not retrieve player name for {}", id);
                UNKNOWN_PLAYER.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::mock::RecordingNotifier;
    use crate::resolver::mock::StaticResolver;
    use crate::retry::RetryError;
    use crate::store::mock::MemoryBanStore;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::{mpsc, Notify};

    // SteamID64 / SteamID2 pairs
    const A: &str = "76561197960265729";
    const A2: &str = "STEAM_0:1:0";
    const B: &str = "76561197960265730";
    const B2: &str = "STEAM_0:0:1";
    const C: &str = "76561197960265731";
    const C2: &str = "STEAM_0:1:1";
    const D: &str = "76561197960265732";

    struct Harness {
        _dir: TempDir,
        engine: ReconciliationEngine,
        store: Arc<MemoryBanStore>,
        notifier: Arc<RecordingNotifier>,
        resolver: Arc<StaticResolver>,
        events: mpsc::UnboundedReceiver<DetectorEvent>,
    }

    impl Harness {
        fn new(file: &str, store: MemoryBanStore, resolver: StaticResolver) -> Self {
            let store = Arc::new(store);
            Self::with_backend(file, store.clone(), store, resolver)
        }

        /// `backend` is what the engine queries; `store` is inspected by tests.
        fn with_backend(
            file: &str,
            store: Arc<MemoryBanStore>,
            backend: Arc<dyn BanStore>,
            resolver: StaticResolver,
        ) -> Self {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("banned_users.txt");
            std::fs::write(&path, file).unwrap();

            let mut detector = FileChangeDetector::new(path);
            let events = detector.subscribe();
            let notifier = Arc::new(RecordingNotifier::new());
            let resolver = Arc::new(resolver);
            let engine = ReconciliationEngine::new(
                Arc::new(detector),
                backend,
                resolver.clone(),
                notifier.clone(),
                2,
                RetryPolicy::new(3, Duration::from_secs(5)),
            );

            Self {
                _dir: dir,
                engine,
                store,
                notifier,
                resolver,
                events,
            }
        }

        fn file(&self) -> String {
            std::fs::read_to_string(self.engine.detector().path()).unwrap()
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ids(items: &[&str]) -> Vec<SteamId64> {
        items.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_applies_set_difference() {
        let h = Harness::new(
            &format!("{A}\n{B}\n"),
            MemoryBanStore::with_active(&[B2, C2]),
            StaticResolver::with_names(&[(C, "carol")]),
        );

        let report = h.engine.reconcile_now(&CancellationToken::new()).await.unwrap();

        assert!(report.written);
        assert_eq!(report.active, 2);
        assert_eq!(report.newly_added, ids(&[C]));
        assert_eq!(h.file(), format!("{B}\n{C}\n"));
        assert_eq!(
            h.notifier.batched(),
            vec![(C.to_string(), "carol".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_is_idempotent() {
        let h = Harness::new(
            "",
            MemoryBanStore::with_active(&[A2, B2]),
            StaticResolver::default(),
        );
        let cancel = CancellationToken::new();

        let first = h.engine.reconcile_now(&cancel).await.unwrap();
        assert!(first.written);
        assert_eq!(first.newly_added.len(), 2);

        let second = h.engine.reconcile_now(&cancel).await.unwrap();
        assert!(!second.written);
        assert!(second.newly_added.is_empty());
        assert_eq!(h.notifier.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_without_difference_does_not_write() {
        // Different order and a blank line, same set
        let h = Harness::new(
            &format!("{B}\n\n{A}"),
            MemoryBanStore::with_active(&[A2, B2]),
            StaticResolver::default(),
        );

        let report = h.engine.reconcile_now(&CancellationToken::new()).await.unwrap();

        assert!(!report.written);
        assert_eq!(h.file(), format!("{B}\n\n{A}"));
        assert!(h.notifier.batches.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_leaves_file_untouched() {
        let store = MemoryBanStore::with_active(&[C2]);
        for _ in 0..3 {
            store
                .list_failures
                .lock()
                .unwrap()
                .push_back(StoreError::Unavailable("connection refused".into()));
        }
        let h = Harness::new(&format!("{A}\n{B}\n"), store, StaticResolver::default());

        let result = h.engine.reconcile_now(&CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(BanSyncError::Store(RetryError::Exhausted { attempts: 3, .. }))
        ));
        assert_eq!(*h.store.list_calls.lock().unwrap(), 3);
        assert_eq!(h.file(), format!("{A}\n{B}\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_recovers_within_retry_budget() {
        let store = MemoryBanStore::with_active(&[A2]);
        store
            .list_failures
            .lock()
            .unwrap()
            .push_back(StoreError::Unavailable("timeout".into()));
        let h = Harness::new("", store, StaticResolver::default());

        let report = h.engine.reconcile_now(&CancellationToken::new()).await.unwrap();
        assert!(report.written);
        assert_eq!(h.file(), format!("{A}\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_and_removed_bans_filtered() {
        let store = MemoryBanStore::new();
        store.add_row(A2, 0, None);
        store.add_row(B2, 2, None);
        store.add_row(C2, 9, None);
        store.add_row("STEAM_0:0:2", 2, Some("U"));
        store.add_row("garbage", 2, None);
        let h = Harness::new("", store, StaticResolver::default());

        let report = h.engine.reconcile_now(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.active, 2);
        assert_eq!(h.file(), format!("{A}\n{B}\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_names_are_not_announced() {
        let h = Harness::new(
            "",
            MemoryBanStore::with_active(&[A2, B2]),
            StaticResolver::with_names(&[(A, "alice")]),
        );

        h.engine.reconcile_now(&CancellationToken::new()).await.unwrap();

        assert_eq!(h.file(), format!("{A}\n{B}\n"));
        assert_eq!(h.notifier.batched(), vec![(A.to_string(), "alice".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_with_only_unresolved_names_is_not_sent() {
        let h = Harness::new(
            "",
            MemoryBanStore::with_active(&[C2]),
            StaticResolver::default(),
        );

        let report = h.engine.reconcile_now(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.newly_added, ids(&[C]));
        assert_eq!(h.file(), format!("{C}\n"));
        assert!(h.notifier.batches.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_line_survives_sync_before_its_event_is_handled() {
        let mut h = Harness::new(
            &format!("{A}\n"),
            MemoryBanStore::with_active(&[A2]),
            StaticResolver::with_names(&[(D, "dave")]),
        );
        let cancel = CancellationToken::new();
        let detector = Arc::clone(h.engine.detector());
        detector.prime().await.unwrap();

        std::fs::write(detector.path(), format!("{A}\n{D}\n")).unwrap();
        detector.on_external_change().await;

        // The LinesAdded event is still queued
        let report = h.engine.reconcile_now(&cancel).await.unwrap();
        assert!(report.newly_added.is_empty());
        assert!(report.absorbed.is_empty());
        assert_eq!(h.file(), format!("{A}\n{D}\n"));

        let event = h.events.try_recv().unwrap();
        h.engine.handle_event(event, &cancel).await;
        assert!(!detector.is_pending(D));

        let report = h.engine.reconcile_now(&cancel).await.unwrap();
        assert!(report.newly_added.is_empty());
        assert_eq!(h.file(), format!("{A}\n{D}\n"));
        assert_eq!(h.notifier.single_ids(), vec![D.to_string()]);
        assert!(h.notifier.batched().is_empty());
    }

    /// Holds `list_active_ban_ids` open after reading until released.
    struct GatedStore {
        inner: Arc<MemoryBanStore>,
        entered: Notify,
        gate: Notify,
    }

    #[async_trait]
    impl BanStore for GatedStore {
        async fn list_active_ban_ids(
            &self,
            server_id: u32,
        ) -> std::result::Result<Vec<String>, StoreError> {
            let ids = self.inner.list_active_ban_ids(server_id).await;
            self.entered.notify_one();
            self.gate.notified().await;
            ids
        }

        async fn exists_active_ban(
            &self,
            auth_id: &SteamId2,
        ) -> std::result::Result<bool, StoreError> {
            self.inner.exists_active_ban(auth_id).await
        }

        async fn insert_ban(&self, record: &BanRecord) -> std::result::Result<(), StoreError> {
            self.inner.insert_ban(record).await
        }

        async fn test_connectivity(&self) -> std::result::Result<(), StoreError> {
            self.inner.test_connectivity().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_banned_during_stale_sync_is_kept() {
        let store = Arc::new(MemoryBanStore::with_active(&[A2]));
        let gated = Arc::new(GatedStore {
            inner: store.clone(),
            entered: Notify::new(),
            gate: Notify::new(),
        });
        let mut h = Harness::with_backend(
            &format!("{A}\n"),
            store,
            gated.clone(),
            StaticResolver::with_names(&[(D, "dave")]),
        );
        let cancel = CancellationToken::new();
        let detector = Arc::clone(h.engine.detector());
        detector.prime().await.unwrap();

        std::fs::write(detector.path(), format!("{A}\n{D}\n")).unwrap();
        detector.on_external_change().await;
        let event = h.events.try_recv().unwrap();

        // The sync reads the ban list, then D is banned before it writes
        let (report, ()) = tokio::join!(h.engine.reconcile_now(&cancel), async {
            gated.entered.notified().await;
            h.engine.handle_event(event, &cancel).await;
            gated.gate.notify_one();
        });
        let report = report.unwrap();
        assert!(report.newly_added.is_empty());
        assert_eq!(h.file(), format!("{A}\n{D}\n"));
        assert_eq!(h.store.inserted_ids(), vec!["STEAM_0:0:2".to_string()]);

        gated.gate.notify_one();
        let report = h.engine.reconcile_now(&cancel).await.unwrap();
        assert!(report.newly_added.is_empty());
        assert_eq!(h.file(), format!("{A}\n{D}\n"));
        assert_eq!(h.notifier.single_ids(), vec![D.to_string()]);
        assert!(h.notifier.batched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreported_file_lines_are_kept_and_banned() {
        let h = Harness::new(
            &format!("{A}\n"),
            MemoryBanStore::with_active(&[A2]),
            StaticResolver::with_names(&[(D, "dave")]),
        );
        h.engine.detector().prime().await.unwrap();

        // Edited by hand; the change event has not been processed yet
        std::fs::write(h.engine.detector().path(), format!("{A}\n{D}\n")).unwrap();

        let report = h.engine.reconcile_now(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.absorbed, lines(&[D]));
        assert!(!report.written);
        assert_eq!(h.file(), format!("{A}\n{D}\n"));
        assert_eq!(h.store.inserted_ids(), vec!["STEAM_0:0:2".to_string()]);
        assert_eq!(h.notifier.single_ids(), vec![D.to_string()]);

        // The pending event now finds nothing new
        assert_eq!(
            h.engine.detector().on_external_change().await,
            crate::detector::ChangeOutcome::Unchanged
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_lines_create_permanent_bans() {
        let h = Harness::new(
            "",
            MemoryBanStore::new(),
            StaticResolver::with_names(&[(A, "alice")]),
        );

        let banned = h
            .engine
            .on_new_lines_from_file(&lines(&[A, "  ", B]), &CancellationToken::new())
            .await;

        assert_eq!(banned, ids(&[A, B]));
        let inserted = h.store.inserted.lock().unwrap().clone();
        assert_eq!(inserted.len(), 2);
        assert_eq!(inserted[0].auth_id.to_string(), A2);
        assert_eq!(inserted[0].name, "alice");
        assert_eq!(inserted[0].server_id, 2);
        assert_eq!(inserted[0].duration_seconds, 0);
        assert_eq!(inserted[0].created_at, inserted[0].ends_at);
        assert_eq!(inserted[1].name, UNKNOWN_PLAYER);
        assert_eq!(h.notifier.single_ids(), lines(&[A, B]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_lines_skip_existing_and_invalid() {
        let h = Harness::new(
            "",
            MemoryBanStore::with_active(&[A2]),
            StaticResolver::default(),
        );

        let banned = h
            .engine
            .on_new_lines_from_file(&lines(&[A, "not-a-steamid", "12345", C]), &CancellationToken::new())
            .await;

        assert_eq!(banned, ids(&[C]));
        assert_eq!(h.store.inserted_ids(), vec![C2.to_string()]);
        assert_eq!(h.notifier.single_ids(), vec![C.to_string()]);
        // No name lookup for skipped identifiers
        assert_eq!(*h.resolver.calls.lock().unwrap(), ids(&[C]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_insert_does_not_stop_siblings() {
        let store = MemoryBanStore::new();
        store
            .insert_failures
            .lock()
            .unwrap()
            .push_back(StoreError::Query("duplicate entry".into()));
        let h = Harness::new("", store, StaticResolver::default());

        let banned = h
            .engine
            .on_new_lines_from_file(&lines(&[A, B]), &CancellationToken::new())
            .await;

        assert_eq!(banned, ids(&[B]));
        assert_eq!(h.notifier.single_ids(), vec![B.to_string()]);
        assert!(h.engine.in_flight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_lines_take_no_action() {
        let h = Harness::new(
            "",
            MemoryBanStore::with_active(&[A2]),
            StaticResolver::default(),
        );

        h.engine
            .handle_event(
                DetectorEvent::LinesRemoved(lines(&[A])),
                &CancellationToken::new(),
            )
            .await;

        assert!(h.store.inserted.lock().unwrap().is_empty());
        assert!(h.notifier.single.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_reconcile_does_not_write() {
        let h = Harness::new(
            &format!("{A}\n"),
            MemoryBanStore::with_active(&[B2]),
            StaticResolver::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = h.engine.reconcile_now(&cancel).await;

        assert!(result.is_err());
        assert_eq!(h.file(), format!("{A}\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_check() {
        let h = Harness::new("", MemoryBanStore::new(), StaticResolver::default());
        assert!(h.engine.test_connectivity(&CancellationToken::new()).await);
    }
}
