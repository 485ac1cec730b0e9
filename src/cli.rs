//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "bansync")]
#[command(author, version, about = "Keeps a banned-player list file and a SourceBans database in sync")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sync daemon until SIGINT/SIGTERM
    Run,

    /// Run one database to file synchronization and exit
    Sync,

    /// Check database, webhook and ban file access
    Check,

    /// Convert between SteamID64 and STEAM_0:Y:Z
    Convert {
        /// Identifier in either form
        id: String,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show version
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["bansync", "sync", "--config", "/tmp/c.yaml", "-v"]);
        assert!(matches!(cli.command, Commands::Sync));
        assert_eq!(cli.config, PathBuf::from("/tmp/c.yaml"));
        assert!(cli.verbose);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["bansync", "run"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_convert_and_init_args() {
        let cli = Cli::parse_from(["bansync", "convert", "STEAM_0:1:0"]);
        assert!(matches!(cli.command, Commands::Convert { ref id } if id == "STEAM_0:1:0"));

        let cli = Cli::parse_from(["bansync", "init", "--force"]);
        assert!(matches!(cli.command, Commands::Init { force: true }));
    }
}
