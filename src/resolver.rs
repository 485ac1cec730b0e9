//! Display-name lookup for banned players through the Steam Web API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::cache::ExpiringCache;
use crate::config::SecureString;
use crate::steam_id::SteamId64;

const TIMEOUT_SECS: u64 = 15;
const STEAM_API_BASE: &str = "https://api.steampowered.com";

/// Persona name used when the profile has none.
const UNNAMED_PERSONA: &str = "Unknown";

/// Resolves a SteamID64 to a player's display name.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// `None` when the name could not be fetched. Never fails loudly.
    async fn resolve(&self, id: SteamId64) -> Option<String>;

    /// Drop expired cached names. Returns the number removed.
    fn sweep_cache(&self) -> usize {
        0
    }
}

#[derive(Debug, Deserialize)]
struct PlayerSummariesResponse {
    response: PlayerSummaries,
}

#[derive(Debug, Deserialize)]
struct PlayerSummaries {
    #[serde(default)]
    players: Vec<PlayerSummary>,
}

#[derive(Debug, Deserialize)]
struct PlayerSummary {
    personaname: Option<String>,
}

/// Extract the persona name from a `GetPlayerSummaries` body.
///
/// Returns `Ok(None)` when no player matched.
fn parse_player_summaries(body: &str) -> Result<Option<String>> {
    let parsed: PlayerSummariesResponse =
        serde_json::from_str(body).context("Malformed GetPlayerSummaries response")?;
    Ok(parsed.response.players.into_iter().next().map(|player| {
        player
            .personaname
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNNAMED_PERSONA.to_string())
    }))
}

/// [`NameResolver`] backed by `ISteamUser/GetPlayerSummaries` with a TTL cache.
pub struct SteamNameResolver {
    client: Client,
    api_key: SecureString,
    base_url: String,
    cache: ExpiringCache<SteamId64, String>,
}

impl SteamNameResolver {
    pub fn new(api_key: SecureString, cache_ttl: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!("bansync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client for Steam API")?;

        Ok(Self {
            client,
            api_key,
            base_url: STEAM_API_BASE.to_string(),
            cache: ExpiringCache::new(cache_ttl),
        })
    }

    /// Point the resolver at another API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn cache(&self) -> &ExpiringCache<SteamId64, String> {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Steam player cache cleared");
    }

    async fn fetch_name(&self, id: SteamId64) -> Result<Option<String>> {
        let url = format!(
            "{}/ISteamUser/GetPlayerSummaries/v0002/",
            self.base_url
        );
        let steam_id = id.to_string();
        debug!("Fetching player info from Steam API for {}", steam_id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("steamids", steam_id.as_str()),
            ])
            .send()
            .await
            .context("Steam API request failed")?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Steam API rate limit exceeded for {}", id);
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("Steam API returned {}", status);
        }

        let body = response
            .text()
            .await
            .context("Failed to read Steam API response")?;
        parse_player_summaries(&body)
    }
}

#[async_trait]
impl NameResolver for SteamNameResolver {
    async fn resolve(&self, id: SteamId64) -> Option<String> {
        if let Some(name) = self.cache.get(&id) {
            debug!("Retrieved player name from cache for {}", id);
            return Some(name);
        }

        match self.fetch_name(id).await {
            Ok(Some(name)) => {
                debug!("Resolved {} to {}", id, name);
                self.cache.put(id, name.clone());
                Some(name)
            }
            Ok(None) => {
                warn!("No player found for {}", id);
                None
            }
            Err(e) => {
                error!("Error fetching player info for {}: {:#}", id, e);
                None
            }
        }
    }

    fn sweep_cache(&self) -> usize {
        let removed = self.cache.sweep_expired();
        if removed > 0 {
            debug!("Cleaned up {} expired cache entries", removed);
        }
        removed
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Resolver answering from a fixed table.
    #[derive(Default)]
    pub struct StaticResolver {
        pub names: HashMap<SteamId64, String>,
        pub calls: Mutex<Vec<SteamId64>>,
    }

    impl StaticResolver {
        pub fn with_names(entries: &[(&str, &str)]) -> Self {
            Self {
                names: entries
                    .iter()
                    .map(|(id, name)| (id.parse().unwrap(), name.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NameResolver for StaticResolver {
        async fn resolve(&self, id: SteamId64) -> Option<String> {
            self.calls.lock().unwrap().push(id);
            self.names.get(&id).cloned()
        }
    }
}
