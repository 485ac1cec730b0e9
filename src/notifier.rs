//! Ban notifications over Discord webhooks.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::DiscordConfig;
use crate::steam_id::SteamId64;

/// Timeout for webhook HTTP requests
const TIMEOUT_SECS: u64 = 30;

/// Discord accepts at most this many embeds per message
const MAX_EMBEDS_PER_MESSAGE: usize = 10;

/// Pause between consecutive batch messages
const BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Outbound ban notifications. Delivery failures are logged, never returned.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_new(&self, id: SteamId64, name: &str);

    async fn notify_batch(&self, bans: &[(SteamId64, String)]);

    /// Send a test message. True if it was delivered.
    async fn test_webhook(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: &'static str,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: &'static str,
    description: String,
    color: u32,
    timestamp: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    embeds: Vec<Embed>,
}

/// Hide the token (last path segment) of a webhook URL for logging.
pub fn mask_webhook_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "***".to_string();
    };
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = rest.split('/').collect();
    // host, at least one path segment, and the token
    if segments.len() < 3 || segments[0].is_empty() {
        return "***".to_string();
    }
    let kept = &segments[..segments.len() - 1];
    format!("{}://{}/***", scheme, kept.join("/"))
}

/// [`Notifier`] posting embeds to every configured Discord webhook.
pub struct DiscordNotifier {
    config: DiscordConfig,
    client: Client,
}

impl DiscordNotifier {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client for Discord")?;

        Ok(Self { config, client })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.webhook_urls.is_empty()
    }

    fn ban_embed(&self, id: SteamId64, name: &str) -> Embed {
        let mut description = format!(
            "Player **{}** with SteamID64 **{}** has been banned from the server.",
            name, id
        );
        if !self.config.appeal_url.trim().is_empty() {
            description.push_str(&format!(
                "\nTo appeal this ban, visit: {}",
                self.config.appeal_url
            ));
        }

        Embed {
            title: "Ban Notification",
            description,
            color: self.config.embed_color,
            timestamp: chrono::Utc::now().to_rfc3339(),
            fields: vec![
                EmbedField {
                    name: "SteamID64",
                    value: id.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "Player name",
                    value: name.to_string(),
                    inline: true,
                },
            ],
        }
    }

    /// Post to all webhooks concurrently. Returns how many accepted the payload.
    async fn send(&self, payload: &WebhookPayload) -> usize {
        let posts = self
            .config
            .webhook_urls
            .iter()
            .map(|url| self.post(url, payload));

        join_all(posts)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }

    async fn post(&self, url: &str, payload: &WebhookPayload) -> bool {
        let masked = mask_webhook_url(url);
        debug!("Sending Discord webhook to {}", masked);

        match self.client.post(url).json(payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Sent Discord webhook to {}", masked);
                true
            }
            Ok(response) => {
                // Don't log response body as it may echo the token
                warn!(
                    "Discord webhook {} returned status {}",
                    masked,
                    response.status()
                );
                false
            }
            Err(e) => {
                error!("Error sending Discord webhook to {}: {}", masked, e);
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify_new(&self, id: SteamId64, name: &str) {
        if !self.is_enabled() {
            debug!("Discord notifications are disabled or no webhook URLs configured");
            return;
        }

        let payload = WebhookPayload {
            embeds: vec![self.ban_embed(id, name)],
        };
        self.send(&payload).await;
    }

    async fn notify_batch(&self, bans: &[(SteamId64, String)]) {
        if !self.is_enabled() {
            debug!("Discord notifications are disabled or no webhook URLs configured");
            return;
        }
        if bans.is_empty() {
            debug!("No bans to send in batch notification");
            return;
        }

        let chunks: Vec<_> = bans.chunks(MAX_EMBEDS_PER_MESSAGE).collect();
        let multiple = chunks.len() > 1;
        for chunk in chunks {
            let payload = WebhookPayload {
                embeds: chunk
                    .iter()
                    .map(|(id, name)| self.ban_embed(*id, name))
                    .collect(),
            };
            self.send(&payload).await;

            if multiple {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
        }
    }

    async fn test_webhook(&self) -> bool {
        if !self.is_enabled() {
            warn!("Discord notifications are disabled or no webhook URLs configured");
            return false;
        }

        let payload = WebhookPayload {
            embeds: vec![Embed {
                title: "Test Notification",
                description: "This is a test message from bansync to verify webhook connectivity."
                    .to_string(),
                color: self.config.embed_color,
                timestamp: chrono::Utc::now().to_rfc3339(),
                fields: Vec::new(),
            }],
        };

        let delivered = self.send(&payload).await;
        let ok = delivered == self.config.webhook_urls.len();
        if ok {
            info!("Discord webhook test successful");
        } else {
            error!(
                "Discord webhook test failed ({}/{} webhooks accepted)",
                delivered,
                self.config.webhook_urls.len()
            );
        }
        ok
    }
}
