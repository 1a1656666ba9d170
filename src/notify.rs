use std::collections::HashMap;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::ChannelConfig;
use crate::error::NotifyError;
use crate::types::{Alert, AlertKind};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// A delivery channel for alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name used in logs and errors.
    fn channel(&self) -> &'static str;

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Build the notifier for the configured channel, sharing `http`.
pub fn build_notifier(
    channel: &ChannelConfig,
    http: reqwest::Client,
) -> Result<Box<dyn Notifier>, NotifyError> {
    let notifier: Box<dyn Notifier> = match channel {
        ChannelConfig::Telegram { bot_token, chat_id } => {
            Box::new(TelegramNotifier::new(http, bot_token, chat_id))
        }
        ChannelConfig::Discord { webhook_url } => Box::new(DiscordNotifier::new(http, webhook_url)),
        ChannelConfig::Webhook { url, headers } => {
            Box::new(WebhookNotifier::new(http, url, headers)?)
        }
    };
    Ok(notifier)
}

/// Outcome counts for one batch of alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
}

/// Send alerts one at a time in order. A failed send is logged and does not
/// stop the rest of the batch.
pub async fn dispatch_alerts(notifier: &dyn Notifier, alerts: &[Alert]) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    for alert in alerts {
        match notifier.send(alert).await {
            Ok(()) => {
                summary.sent += 1;
                info!("Sent {} alert via {}: {}", alert.label(), notifier.channel(), alert.title);
            }
            Err(e) => {
                summary.failed += 1;
                warn!("Failed to send {} alert for {}: {e}", alert.label(), alert.wallet);
            }
        }
    }
    summary
}

/// `first8...last8`, the wallet form shown in messages.
pub fn short_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    let head: String = chars.iter().take(8).collect();
    let tail: String = chars[chars.len().saturating_sub(8)..].iter().collect();
    format!("{head}...{tail}")
}

async fn check_response(
    channel: &'static str,
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<(), NotifyError> {
    let resp = result.map_err(|source| NotifyError::Transport { channel, source })?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(NotifyError::Rejected {
            channel,
            status,
            body,
        });
    }
    Ok(())
}

// ── Telegram ───────────────────────────────────────────────────────

pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(http: reqwest::Client, bot_token: &str, chat_id: &str) -> Self {
        Self {
            http,
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    fn payload(&self, alert: &Alert) -> Value {
        json!({
            "chat_id": self.chat_id,
            "text": telegram_text(alert),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let url = format!("{TELEGRAM_API}/bot{}/sendMessage", self.bot_token);
        let result = self.http.post(&url).json(&self.payload(alert)).send().await;
        check_response(self.channel(), result).await
    }
}

fn emoji(kind: &AlertKind) -> &'static str {
    match kind {
        AlertKind::MarketResolved(_) => "🎉",
        AlertKind::UnclaimedWinnings(_) => "💰",
        AlertKind::ClosingSoon(_) => "⏰",
        AlertKind::OddsShift(_) => "📊",
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// HTML body for the Bot API `sendMessage` call.
pub fn telegram_text(alert: &Alert) -> String {
    format!(
        "<b>{} {}</b>\n\n{}\n\n<i>Wallet: {}</i>\n<i>Time: {} UTC</i>",
        emoji(&alert.kind),
        escape_html(&alert.title),
        escape_html(&alert.message),
        escape_html(&short_wallet(&alert.wallet)),
        alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
    )
}

// ── Discord ────────────────────────────────────────────────────────

pub struct DiscordNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(http: reqwest::Client, webhook_url: &str) -> Self {
        Self {
            http,
            webhook_url: webhook_url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn channel(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let body = json!({ "embeds": [discord_embed(alert)] });
        let result = self.http.post(&self.webhook_url).json(&body).send().await;
        check_response(self.channel(), result).await
    }
}

fn embed_color(kind: &AlertKind) -> u32 {
    match kind {
        AlertKind::MarketResolved(_) => 0x00ff00,
        AlertKind::UnclaimedWinnings(_) => 0xffd700,
        AlertKind::ClosingSoon(_) => 0xffa500,
        AlertKind::OddsShift(_) => 0x3498db,
    }
}

pub fn discord_embed(alert: &Alert) -> Value {
    json!({
        "title": alert.title,
        "description": alert.message,
        "color": embed_color(&alert.kind),
        "timestamp": alert.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        "footer": { "text": format!("Wallet: {}", short_wallet(&alert.wallet)) },
    })
}

// ── Generic webhook ────────────────────────────────────────────────

pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl WebhookNotifier {
    /// Custom `headers` replace the default JSON content type.
    pub fn new(
        http: reqwest::Client,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            http,
            url: url.to_string(),
            headers: webhook_headers(headers)?,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let result = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .json(alert)
            .send()
            .await;
        check_response(self.channel(), result).await
    }
}

pub fn webhook_headers(custom: &HashMap<String, String>) -> Result<HeaderMap, NotifyError> {
    let mut headers = HeaderMap::new();
    if custom.is_empty() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        return Ok(headers);
    }
    for (name, value) in custom {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| NotifyError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| NotifyError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}
