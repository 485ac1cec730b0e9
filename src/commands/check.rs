//! Check command implementation.

use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::detector::FileChangeDetector;
use crate::notifier::{DiscordNotifier, Notifier};
use crate::store::mysql::MySqlBanStore;
use crate::store::BanStore;

/// Test every external dependency named in the configuration.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let cancel = CancellationToken::new();

    println!();
    println!("Configuration: {} (valid)", config_path.display());

    let store = MySqlBanStore::connect_lazy(config.database.get_url().as_str())?;
    let database = config
        .retry_policy()
        .run("test_connectivity", &cancel, || store.test_connectivity())
        .await;
    match &database {
        Ok(()) => println!("Database:      reachable"),
        Err(e) => println!("Database:      FAILED ({})", e),
    }

    let notifier = DiscordNotifier::new(config.discord.clone())?;
    if notifier.is_enabled() {
        let ok = notifier.test_webhook().await;
        println!(
            "Discord:       {}",
            if ok { "test message delivered" } else { "FAILED" }
        );
    } else {
        println!("Discord:       disabled");
    }

    let detector = FileChangeDetector::new(&config.ban_file);
    println!(
        "Ban file:      {} ({})",
        config.ban_file.display(),
        if detector.is_accessible() {
            "readable"
        } else if config.ban_file.exists() {
            "NOT readable"
        } else {
            "missing, will be created"
        }
    );
    println!();

    database.map_err(|e| anyhow::anyhow!("Database check failed: {}", e))
}
