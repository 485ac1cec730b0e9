//! The long-running sync daemon.
//!
//! [`BanSyncService`] wires the detector, the engine and the collaborators
//! together, performs the startup sequence and then drives the periodic
//! timers and the detector event stream until cancelled.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::detector::{DetectorEvent, FileChangeDetector};
use crate::engine::ReconciliationEngine;
use crate::notifier::{DiscordNotifier, Notifier};
use crate::release::ReleaseChecker;
use crate::resolver::{NameResolver, SteamNameResolver};
use crate::retry::RetryPolicy;
use crate::store::mysql::MySqlBanStore;
use crate::store::BanStore;

/// Runtime knobs of the service loop.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub server_id: u32,
    pub debug_mode: bool,
    pub watch: bool,
    pub sync_interval: Duration,
    pub release_check_interval: Duration,
    pub cache_sweep_interval: Duration,
    pub retry: RetryPolicy,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            server_id: config.server_id,
            debug_mode: config.debug_mode,
            watch: config.file_watcher_enabled,
            sync_interval: config.sync_interval(),
            release_check_interval: config.release_check_interval(),
            cache_sweep_interval: config.cache_ttl(),
            retry: config.retry_policy(),
        }
    }
}

pub struct BanSyncService {
    engine: Arc<ReconciliationEngine>,
    resolver: Arc<dyn NameResolver>,
    notifier: Arc<dyn Notifier>,
    release: Option<ReleaseChecker>,
    events: mpsc::UnboundedReceiver<DetectorEvent>,
    settings: ServiceSettings,
}

impl BanSyncService {
    /// Build the production service: MySQL store, Steam resolver, Discord notifier.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = MySqlBanStore::connect_lazy(config.database.get_url().as_str())
            .context("Invalid database configuration")?;
        let resolver = SteamNameResolver::new(config.steam.get_api_key(), config.cache_ttl())?;
        let notifier = DiscordNotifier::new(config.discord.clone())?;

        let release = if config.release_check.enabled {
            Some(ReleaseChecker::new(
                &config.release_check.owner,
                &config.release_check.repository,
            )?)
        } else {
            None
        };

        Ok(Self::new(
            FileChangeDetector::new(&config.ban_file),
            Arc::new(store),
            Arc::new(resolver),
            Arc::new(notifier),
            release,
            ServiceSettings::from_config(config),
        ))
    }

    pub fn new(
        mut detector: FileChangeDetector,
        store: Arc<dyn BanStore>,
        resolver: Arc<dyn NameResolver>,
        notifier: Arc<dyn Notifier>,
        release: Option<ReleaseChecker>,
        settings: ServiceSettings,
    ) -> Self {
        let events = detector.subscribe();
        let engine = ReconciliationEngine::new(
            Arc::new(detector),
            store,
            resolver.clone(),
            notifier.clone(),
            settings.server_id,
            settings.retry,
        );

        Self {
            engine: Arc::new(engine),
            resolver,
            notifier,
            release,
            events,
            settings,
        }
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// Run until `cancel` fires. Fails only if startup fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!("Starting ban sync service");
        let detector = Arc::clone(self.engine.detector());

        if !self.engine.test_connectivity(&cancel).await {
            if cancel.is_cancelled() {
                return Ok(());
            }
            anyhow::bail!("Database connection test failed");
        }

        if self.settings.debug_mode {
            self.notifier.test_webhook().await;
        }

        detector
            .ensure_exists()
            .await
            .context("Failed to prepare ban file")?;
        let lines = detector
            .prime()
            .await
            .context("Failed to read ban file")?;
        info!("Loaded {} lines from {}", lines, detector.path().display());

        if let Err(e) = self.engine.reconcile_now(&cancel).await {
            error!("Initial synchronization failed: {}", e);
        }

        let watch = if self.settings.watch {
            match detector.watch() {
                Ok(watch) => Some(watch),
                Err(e) => {
                    error!("File watcher unavailable, relying on periodic sync: {}", e);
                    None
                }
            }
        } else {
            info!("File watcher disabled, relying on periodic sync");
            None
        };

        if let Some(release) = &self.release {
            release.check().await;
        }

        let mut sync_timer = timer(self.settings.sync_interval);
        let mut release_timer = timer(self.settings.release_check_interval);
        let mut sweep_timer = timer(self.settings.cache_sweep_interval);
        let mut tasks = JoinSet::new();

        info!(
            "Ban sync service started (sync every {}s)",
            self.settings.sync_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sync_timer.tick() => {
                    if let Err(e) = self.engine.reconcile_now(&cancel).await {
                        error!("Periodic synchronization failed: {}", e);
                    }
                }
                _ = release_timer.tick(), if self.release.is_some() => {
                    if let Some(release) = &self.release {
                        release.check().await;
                    }
                }
                _ = sweep_timer.tick() => {
                    self.resolver.sweep_cache();
                }
                Some(event) = self.events.recv() => {
                    let engine = Arc::clone(&self.engine);
                    let cancel = cancel.clone();
                    tasks.spawn(async move { engine.handle_event(event, &cancel).await });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Change handling task failed: {}", e);
                    }
                }
            }
        }

        info!("Shutting down ban sync service");
        drop(watch);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                debug!("Change handling task ended with error: {}", e);
            }
        }
        info!("Ban sync service stopped");
        Ok(())
    }
}

/// Interval whose first tick is one period away.
fn timer(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
