//! Run command implementation.

use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::lock::{lock_path_for, LockGuard};
use crate::service::BanSyncService;
use crate::signal::ShutdownGuard;

/// Run the sync daemon until a shutdown signal arrives.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let _lock = LockGuard::acquire(lock_path_for(&config.ban_file))?;

    info!(
        "Syncing {} with server id {}",
        config.ban_file.display(),
        config.server_id
    );

    let shutdown = ShutdownGuard::new(CancellationToken::new());
    BanSyncService::from_config(&config)?
        .run(shutdown.token())
        .await
}
