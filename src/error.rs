//! Error types for bansync.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::RetryError;
use crate::steam_id::SteamIdError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum BanSyncError {
    #[error("Invalid identifier: {0}")]
    Format(#[from] SteamIdError),

    #[error("Failed to access {} after {attempts} attempts: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] RetryError<StoreError>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File watcher error: {0}")]
    Watcher(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, BanSyncError>;
