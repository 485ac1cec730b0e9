//! Sync command implementation.

use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::lock::{lock_path_for, LockGuard};
use crate::service::BanSyncService;
use crate::signal::ShutdownGuard;

/// Run a single database to file pass.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let _lock = LockGuard::acquire(lock_path_for(&config.ban_file))?;
    let shutdown = ShutdownGuard::new(CancellationToken::new());

    let service = BanSyncService::from_config(&config)?;
    let engine = service.engine();
    engine.detector().ensure_exists().await?;

    let report = engine.reconcile_now(&shutdown.token()).await?;

    println!();
    println!("Active bans:  {}", report.active);
    println!("File updated: {}", if report.written { "yes" } else { "no" });
    println!("New in file:  {}", report.newly_added.len());
    for id in &report.newly_added {
        println!("  + {}", id);
    }
    println!();

    Ok(())
}
