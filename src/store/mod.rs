//! Ban storage abstraction.
//!
//! The reconciliation engine only talks to [`BanStore`]; the production
//! implementation is [`MySqlBanStore`] over a SourceBans `sb_bans` table.

pub mod mysql;

use async_trait::async_trait;
use thiserror::Error;

pub use mysql::MySqlBanStore;

use crate::retry::Transient;
use crate::steam_id::SteamId2;

/// Reason stamped on bans created from the ban file.
pub const DEFAULT_BAN_REASON: &str = "Banned by Ban Sync System";

/// A row of the ban table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub auth_id: SteamId2,
    pub name: String,
    /// Unix seconds
    pub created_at: i64,
    /// Unix seconds
    pub ends_at: i64,
    /// 0 = permanent
    pub duration_seconds: i64,
    pub server_id: u32,
    pub ip_address: String,
    /// Set when the ban was lifted. Never written by bansync.
    pub removal_marker: Option<String>,
    pub reason: String,
}

impl BanRecord {
    /// A permanent ban created at `now` (unix seconds) for `server_id`.
    pub fn permanent(auth_id: SteamId2, name: impl Into<String>, server_id: u32, now: i64) -> Self {
        Self {
            auth_id,
            name: name.into(),
            created_at: now,
            ends_at: now,
            duration_seconds: 0,
            server_id,
            ip_address: String::new(),
            removal_marker: None,
            reason: DEFAULT_BAN_REASON.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.removal_marker.is_none()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, pool or server-side failure; worth retrying.
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// The query itself is wrong or returned unusable data.
    #[error("database query failed: {0}")]
    Query(String),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Operations the engine needs from the ban table.
#[async_trait]
pub trait BanStore: Send + Sync {
    /// Structured identifiers of bans with no removal marker, scoped to
    /// global bans (server 0) or `server_id`. Values are returned raw so
    /// that malformed rows can be reported by the caller.
    async fn list_active_ban_ids(&self, server_id: u32) -> Result<Vec<String>, StoreError>;

    async fn exists_active_ban(&self, auth_id: &SteamId2) -> Result<bool, StoreError>;

    async fn insert_ban(&self, record: &BanRecord) -> Result<(), StoreError>;

    async fn test_connectivity(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory ban table with scriptable failures.
    #[derive(Default)]
    pub struct MemoryBanStore {
        pub rows: Mutex<Vec<(String, u32, Option<String>)>>,
        pub inserted: Mutex<Vec<BanRecord>>,
        /// Errors returned (front first) by the next calls to `list_active_ban_ids`.
        pub list_failures: Mutex<VecDeque<StoreError>>,
        /// Errors returned (front first) by the next calls to `insert_ban`.
        pub insert_failures: Mutex<VecDeque<StoreError>>,
        pub list_calls: Mutex<u32>,
        /// When set, `test_connectivity` reports the database as unreachable.
        pub offline: Mutex<bool>,
    }

    impl MemoryBanStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_active(ids: &[&str]) -> Self {
            let store = Self::new();
            for id in ids {
                store.add_row(id, 0, None);
            }
            store
        }

        pub fn add_row(&self, auth_id: &str, server_id: u32, removal_marker: Option<&str>) {
            self.rows.lock().unwrap().push((
                auth_id.to_string(),
                server_id,
                removal_marker.map(str::to_string),
            ));
        }

        pub fn inserted_ids(&self) -> Vec<String> {
            self.inserted
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.auth_id.to_string())
                .collect()
        }
    }

    #[async_trait]
    impl BanStore for MemoryBanStore {
        async fn list_active_ban_ids(&self, server_id: u32) -> Result<Vec<String>, StoreError> {
            *self.list_calls.lock().unwrap() += 1;
            if let Some(err) = self.list_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            let mut ids: Vec<String> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, sid, removed)| removed.is_none() && (*sid == 0 || *sid == server_id))
                .map(|(id, _, _)| id.clone())
                .collect();
            ids.sort();
            ids.dedup();
            Ok(ids)
        }

        async fn exists_active_ban(&self, auth_id: &SteamId2) -> Result<bool, StoreError> {
            let wanted = auth_id.to_string();
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .any(|(id, _, removed)| removed.is_none() && *id == wanted))
        }

        async fn insert_ban(&self, record: &BanRecord) -> Result<(), StoreError> {
            if let Some(err) = self.insert_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            self.add_row(&record.auth_id.to_string(), record.server_id, None);
            self.inserted.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn test_connectivity(&self) -> Result<(), StoreError> {
            if *self.offline.lock().unwrap() {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(())
        }
    }
}
