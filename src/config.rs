use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::DEFAULT_API_URL;

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config, deserialized from `config.toml` or built
/// from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Wallet addresses to monitor.
    pub wallets: Vec<String>,
    #[serde(default)]
    pub alerts: AlertSettings,
    pub channel: ChannelConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Which alert detectors run, and their thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Gates both the resolved-market and unclaimed-winnings alerts.
    #[serde(default = "default_true")]
    pub claimable: bool,
    #[serde(default = "default_true")]
    pub closing_soon: bool,
    #[serde(default = "default_closing_soon_hours")]
    pub closing_soon_hours: u32,
    #[serde(default = "default_true")]
    pub odds_shift: bool,
    /// Minimum absolute move, in percentage points.
    #[serde(default = "default_odds_shift_threshold")]
    pub odds_shift_threshold: u32,
}

impl AlertSettings {
    /// Settings with every detector switched off.
    pub fn disabled() -> Self {
        Self {
            claimable: false,
            closing_soon: false,
            odds_shift: false,
            ..Self::default()
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            claimable: true,
            closing_soon: true,
            closing_soon_hours: default_closing_soon_hours(),
            odds_shift: true,
            odds_shift_threshold: default_odds_shift_threshold(),
        }
    }
}

/// Where alerts are delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    Discord {
        webhook_url: String,
    },
    Webhook {
        url: String,
        /// Replaces the default `Content-Type: application/json` header set.
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

impl ChannelConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Telegram { .. } => "telegram",
            Self::Discord { .. } => "discord",
            Self::Webhook { .. } => "webhook",
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u64,
    /// Base URL of the Baozi REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Per-request timeout for the API and notification channels.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl SettingsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: default_poll_interval(),
            api_url: default_api_url(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_closing_soon_hours() -> u32 {
    6
}

fn default_odds_shift_threshold() -> u32 {
    15
}

fn default_poll_interval() -> u64 {
    15
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_http_timeout() -> u64 {
    15
}

impl AppConfig {
    /// Load and validate config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Build config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from `WATCH_WALLETS`, `NOTIFICATION_CHANNEL`, `ALERT_*` and
    /// the channel-specific variables, resolved through `get`.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let wallets: Vec<String> = get("WATCH_WALLETS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|w| !w.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        if wallets.is_empty() {
            bail!("WATCH_WALLETS environment variable is required (comma-separated list)");
        }

        let enabled = |key: &str| get(key).is_none_or(|v| v.trim() != "false");

        let alerts = AlertSettings {
            claimable: enabled("ALERT_CLAIMABLE"),
            closing_soon: enabled("ALERT_CLOSING_SOON"),
            closing_soon_hours: parse_var(
                &get,
                "ALERT_CLOSING_HOURS",
                default_closing_soon_hours(),
            )?,
            odds_shift: enabled("ALERT_ODDS_SHIFT"),
            odds_shift_threshold: parse_var(
                &get,
                "ALERT_ODDS_THRESHOLD",
                default_odds_shift_threshold(),
            )?,
        };

        let channel_type = get("NOTIFICATION_CHANNEL").unwrap_or_else(|| "webhook".to_string());
        let channel = match channel_type.trim() {
            "telegram" => match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
                (Some(bot_token), Some(chat_id)) => ChannelConfig::Telegram { bot_token, chat_id },
                _ => bail!(
                    "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID required for Telegram notifications"
                ),
            },
            "discord" => {
                let webhook_url = get("DISCORD_WEBHOOK_URL")
                    .context("DISCORD_WEBHOOK_URL required for Discord notifications")?;
                ChannelConfig::Discord { webhook_url }
            }
            "webhook" => {
                let url = get("WEBHOOK_URL")
                    .context("WEBHOOK_URL required for webhook notifications")?;
                let headers = match get("WEBHOOK_HEADERS") {
                    Some(raw) => serde_json::from_str(&raw)
                        .context("WEBHOOK_HEADERS must be a JSON object of strings")?,
                    None => HashMap::new(),
                };
                ChannelConfig::Webhook { url, headers }
            }
            other => bail!("unknown NOTIFICATION_CHANNEL: {other}"),
        };

        let settings = SettingsConfig {
            poll_interval_minutes: parse_var(
                &get,
                "POLL_INTERVAL_MINUTES",
                default_poll_interval(),
            )?,
            api_url: get("BAOZI_API_URL").unwrap_or_else(default_api_url),
            http_timeout_secs: parse_var(&get, "HTTP_TIMEOUT_SECS", default_http_timeout())?,
        };

        let config = Self {
            wallets,
            alerts,
            channel,
            settings,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.wallets.iter().all(|w| w.trim().is_empty()) {
            bail!("at least one wallet address is required");
        }
        if self.settings.poll_interval_minutes == 0 {
            bail!("poll_interval_minutes must be positive");
        }
        if self.settings.http_timeout_secs == 0 {
            bail!("http_timeout_secs must be positive");
        }
        Url::parse(&self.settings.api_url)
            .with_context(|| format!("invalid api_url: {}", self.settings.api_url))?;

        match &self.channel {
            ChannelConfig::Telegram { bot_token, chat_id } => {
                if bot_token.trim().is_empty() || chat_id.trim().is_empty() {
                    bail!("telegram channel needs bot_token and chat_id");
                }
            }
            ChannelConfig::Discord { webhook_url } => {
                Url::parse(webhook_url)
                    .with_context(|| format!("invalid discord webhook_url: {webhook_url}"))?;
            }
            ChannelConfig::Webhook { url, .. } => {
                Url::parse(url).with_context(|| format!("invalid webhook url: {url}"))?;
            }
        }
        Ok(())
    }
}

fn parse_var<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
