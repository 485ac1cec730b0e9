//! # bansync - ban list synchronization for Source game servers
//!
//! Keeps a flat file of banned SteamID64 values and the SourceBans `sb_bans`
//! table consistent in both directions:
//!
//! - the database is authoritative for the file: every sync pass rewrites the
//!   file to the set of active bans visible to this server;
//! - identifiers added to the file by hand become permanent bans in the
//!   database, with the player's name looked up through the Steam Web API
//!   and a Discord notification sent for each one.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI (clap)  run, sync, check, convert, init, version       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BanSyncService  timers, watcher events, shutdown           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ReconciliationEngine                                       │
//! │    ├── FileChangeDetector (notify)   file side              │
//! │    ├── BanStore (sqlx, MySQL)        database side          │
//! │    ├── NameResolver (reqwest)        Steam Web API + cache  │
//! │    └── Notifier (reqwest)            Discord webhooks       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RetryPolicy, SteamId64/SteamId2, ExpiringCache             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use bansync::config::Config;
//! use bansync::service::BanSyncService;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/bansync/config.yaml")?;
//!     let service = BanSyncService::from_config(&config)?;
//!
//!     let report = service
//!         .engine()
//!         .reconcile_now(&CancellationToken::new())
//!         .await?;
//!     println!("{} active bans", report.active);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod fs_abstraction;
pub mod lock;
pub mod notifier;
pub mod release;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod signal;
pub mod steam_id;
pub mod store;

pub use error::{BanSyncError, Result};
