//! bansync - keeps a banned-player list file and a SourceBans database in sync.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use bansync::cli::{Cli, Commands};
use bansync::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // debug_mode in the config also enables debug output for the daemon
    let debug_mode = matches!(cli.command, Commands::Run | Commands::Sync)
        && Config::load(&cli.config)
            .map(|c| c.debug_mode)
            .unwrap_or(false);

    let log_level = if cli.verbose || debug_mode {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run => bansync::commands::run::run(&cli.config).await,
        Commands::Sync => bansync::commands::sync::run(&cli.config).await,
        Commands::Check => bansync::commands::check::run(&cli.config).await,
        Commands::Convert { id } => bansync::commands::convert::run(&id),
        Commands::Init { force } => bansync::commands::init::run(&cli.config, force),
        Commands::Version => {
            println!("bansync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
