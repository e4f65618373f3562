use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use terraria_pty::Notifier;

use crate::config::DiscordFileConfig;

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Posts announcements to a Discord channel as a bot
pub struct DiscordNotifier {
    client: reqwest::Client,
    api_base: String,
    channel_id: String,
    bot_token: String,
}

impl DiscordNotifier {
    pub fn new(channel_id: impl Into<String>, bot_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_base: DISCORD_API_BASE.to_string(),
            channel_id: channel_id.into(),
            bot_token: bot_token.into(),
        })
    }

    pub fn from_config(config: &DiscordFileConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.channel_id.trim(), config.bot_token.trim())
    }

    /// Point at a different API root (tests, proxies)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/channels/{}/messages", self.api_base, self.channel_id)
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        let url = self.messages_url();
        debug!("Posting Discord message to channel {}", self.channel_id);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&serde_json::json!({ "content": message }))
            .send()
            .await
            .context("Failed to reach Discord")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Discord returned {}: {}", status, body);
        }
        Ok(())
    }
}
