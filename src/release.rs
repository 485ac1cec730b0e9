//! Check GitHub for a newer bansync release.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

const TIMEOUT_SECS: u64 = 15;
const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: Option<String>,
}

fn normalize_version(tag: &str) -> String {
    let tag = tag.trim();
    tag.strip_prefix(['v', 'V']).unwrap_or(tag).to_ascii_lowercase()
}

/// True when `latest` names a different release than `current`.
pub fn is_newer_release(latest: &str, current: &str) -> bool {
    normalize_version(latest) != normalize_version(current)
}

pub struct ReleaseChecker {
    client: Client,
    owner: String,
    repository: String,
    current_version: String,
    base_url: String,
}

impl ReleaseChecker {
    pub fn new(owner: &str, repository: &str) -> Result<Self> {
        // GitHub rejects requests without a User-Agent
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!("bansync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client for GitHub")?;

        Ok(Self {
            client,
            owner: owner.to_string(),
            repository: repository.to_string(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            base_url: GITHUB_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Tag of the latest published release, or `None` if it cannot be fetched.
    pub async fn latest_release(&self) -> Option<String> {
        match self.fetch_latest_tag().await {
            Ok(tag) => tag,
            Err(e) => {
                error!("Error checking for new release: {:#}", e);
                None
            }
        }
    }

    /// Log whether a newer release exists. Returns the newer tag, if any.
    pub async fn check(&self) -> Option<String> {
        let latest = self.latest_release().await?;
        debug!(
            "Latest version from GitHub: {}, current version: {}",
            latest, self.current_version
        );

        if is_newer_release(&latest, &self.current_version) {
            info!(
                "New version available: {} (current: {})",
                latest, self.current_version
            );
            Some(latest)
        } else {
            info!("Application is up to date");
            None
        }
    }

    async fn fetch_latest_tag(&self) -> Result<Option<String>> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.base_url, self.owner, self.repository
        );
        debug!("Checking for new release at {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("GitHub request failed")?;

        if !response.status().is_success() {
            warn!("Failed to check for new release. Status: {}", response.status());
            return Ok(None);
        }

        let release: LatestRelease = response
            .json()
            .await
            .context("Malformed GitHub release response")?;

        Ok(release.tag_name.filter(|tag| !tag.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_newer_release() {
        assert!(!is_newer_release("v0.1.0", "0.1.0"));
        assert!(!is_newer_release("V0.1.0", "0.1.0"));
        assert!(!is_newer_release(" 0.1.0 ", "v0.1.0"));
        assert!(is_newer_release("v0.2.0", "0.1.0"));
        assert!(is_newer_release("v0.1.0-rc1", "0.1.0"));
    }

    #[test]
    fn test_release_deserialize() {
        let release: LatestRelease =
            serde_json::from_str(r#"{"tag_name":"v1.2.3","name":"1.2.3"}"#).unwrap();
        assert_eq!(release.tag_name.as_deref(), Some("v1.2.3"));

        let release: LatestRelease = serde_json::from_str("{}").unwrap();
        assert!(release.tag_name.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_api_yields_none() {
        let checker = ReleaseChecker::new("bansync", "bansync")
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        assert_eq!(checker.check().await, None);
        assert_eq!(checker.current_version(), env!("CARGO_PKG_VERSION"));
    }
}
