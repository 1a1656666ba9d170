//! AgentBook pundit: reads active markets, writes short takes to the
//! AgentBook feed and comments on busy markets.
//!
//! The pundit keeps no state between runs other than its cooldown clocks.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{AgentBookPost, BaoziClient, MarketQuery};
use crate::error::PunditError;
use crate::types::{Market, MarketStatus};

const MARKET_LIMIT: u32 = 20;
const TRENDING_COUNT: usize = 5;
const CLOSING_COUNT: usize = 3;
const POSTS_PER_RUN: usize = 2;
const COMMENTS_PER_RUN: usize = 2;

const HIGH_VOLUME_POOL: f64 = 50.0;
const COMMENT_MIN_POOL: f64 = 5.0;
const CONSENSUS_SPREAD: f64 = 30.0;
const STRONG_FAVORITE_ODDS: f64 = 60.0;

const MAX_POST_CHARS: usize = 2000;
const MAX_COMMENT_CHARS: usize = 500;

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
}

/// Why a market was picked for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisContext {
    Trending,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Crypto,
    Sports,
    Politics,
    Entertainment,
    General,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Sports => "sports",
            Self::Politics => "politics",
            Self::Entertainment => "entertainment",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketAnalysis {
    pub market: Market,
    pub context: AnalysisContext,
    pub insight: String,
    pub confidence: Confidence,
    pub category: Category,
}

/// Leading outcome of a market.
#[derive(Debug, Clone, PartialEq)]
pub struct Favorite {
    pub name: String,
    pub odds: f64,
    /// Favorite odds minus the lowest odds.
    pub spread: f64,
}

/// First outcome with the highest odds. `None` for a market without odds
/// or whose favorite index has no outcome name.
pub fn favorite(market: &Market) -> Option<Favorite> {
    let (index, odds) = market
        .odds
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, o)| match best {
            Some((_, b)) if b >= o => best,
            _ => Some((i, o)),
        })?;
    let min = market.odds.iter().copied().fold(f64::INFINITY, f64::min);
    let name = market.outcomes.get(index)?.clone();
    Some(Favorite {
        name,
        odds,
        spread: odds - min,
    })
}

pub fn detect_category(question: &str) -> Category {
    let q = question.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| q.contains(w));

    if has(&["btc", "eth", "sol", "price", "$"]) {
        Category::Crypto
    } else if has(&["super bowl", "ufc", "nba", "world cup"]) {
        Category::Sports
    } else if has(&["election", "trump", "biden", "vote"]) {
        Category::Politics
    } else if has(&["grammy", "oscar", "movie", "album"]) {
        Category::Entertainment
    } else {
        Category::General
    }
}

pub fn generate_insight(
    market: &Market,
    context: AnalysisContext,
    now: DateTime<Utc>,
) -> Option<MarketAnalysis> {
    let fav = favorite(market)?;

    let (insight, confidence) = match context {
        AnalysisContext::Trending if market.pool > HIGH_VOLUME_POOL => {
            let strong = fav.spread > CONSENSUS_SPREAD;
            let verdict = if strong { "Strong consensus" } else { "Tight race" };
            (
                format!(
                    "High volume market: {:.1} SOL pooled. {} is the favorite at {}%. {verdict}.",
                    market.pool, fav.name, fav.odds,
                ),
                if strong {
                    Confidence::High
                } else {
                    Confidence::Medium
                },
            )
        }
        AnalysisContext::Trending => (
            format!(
                "Active market with {:.1} SOL volume. {} leading at {}%.",
                market.pool, fav.name, fav.odds,
            ),
            Confidence::Medium,
        ),
        AnalysisContext::Closing => {
            let remaining_ms = market
                .closing_time
                .map(|t| (t - now).num_milliseconds())
                .unwrap_or(0);
            let hours = ceil_div(remaining_ms, MS_PER_HOUR);
            (
                format!(
                    "Closing in {hours}h: {} — {} at {}%. Last chance to bet.",
                    market.question, fav.name, fav.odds,
                ),
                Confidence::High,
            )
        }
    };

    Some(MarketAnalysis {
        market: market.clone(),
        context,
        insight,
        confidence,
        category: detect_category(&market.question),
    })
}

fn ceil_div(n: i64, d: i64) -> i64 {
    let q = n / d;
    if n % d > 0 { q + 1 } else { q }
}

/// Top markets by pool, then the soonest-closing markets that are still open.
/// A market can appear in both lists.
pub fn analyze_markets(markets: &[Market], now: DateTime<Utc>) -> Vec<MarketAnalysis> {
    let mut trending: Vec<&Market> = markets.iter().collect();
    trending.sort_by(|a, b| b.pool.total_cmp(&a.pool));

    let mut closing: Vec<(&Market, DateTime<Utc>)> = markets
        .iter()
        .filter_map(|m| m.closing_time.filter(|t| *t > now).map(|t| (m, t)))
        .collect();
    closing.sort_by_key(|(_, t)| *t);

    let trending = trending
        .into_iter()
        .take(TRENDING_COUNT)
        .filter_map(|m| generate_insight(m, AnalysisContext::Trending, now));
    let closing = closing
        .into_iter()
        .take(CLOSING_COUNT)
        .filter_map(|(m, _)| generate_insight(m, AnalysisContext::Closing, now));

    trending.chain(closing).collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn post_content(analysis: &MarketAnalysis) -> String {
    let content = format!(
        "{} Pool: {:.1} SOL. Category: {}.",
        analysis.insight, analysis.market.pool, analysis.category,
    );
    truncate_chars(&content, MAX_POST_CHARS)
}

pub fn comment_content(market: &Market) -> Option<String> {
    let fav = favorite(market)?;
    let verdict = if fav.odds > STRONG_FAVORITE_ODDS {
        "Strong favorite"
    } else {
        "Competitive market"
    };
    let content = format!(
        "{} leading at {}% with {:.1} SOL pooled. {verdict}.",
        fav.name, fav.odds, market.pool,
    );
    Some(truncate_chars(&content, MAX_COMMENT_CHARS))
}

// ── Signing ────────────────────────────────────────────────────────

/// Solana ed25519 keypair used to sign market comments.
pub struct MessageSigner {
    key: SigningKey,
}

impl MessageSigner {
    /// Parse a Solana secret key: base58 (64-byte keypair or 32-byte seed)
    /// or the JSON byte array written by `solana-keygen`.
    pub fn parse(raw: &str) -> Result<Self, PunditError> {
        let trimmed = raw.trim();
        let bytes = if trimmed.starts_with('[') {
            serde_json::from_str::<Vec<u8>>(trimmed)
                .map_err(|e| PunditError::InvalidKey(format!("bad byte array: {e}")))?
        } else {
            bs58::decode(trimmed)
                .into_vec()
                .map_err(|e| PunditError::InvalidKey(format!("bad base58: {e}")))?
        };

        let key = match bytes.len() {
            64 => {
                let mut keypair = [0u8; 64];
                keypair.copy_from_slice(&bytes);
                SigningKey::from_keypair_bytes(&keypair)
                    .map_err(|e| PunditError::InvalidKey(e.to_string()))?
            }
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                SigningKey::from_bytes(&seed)
            }
            n => {
                return Err(PunditError::InvalidKey(format!(
                    "expected 64-byte keypair or 32-byte seed, got {n} bytes"
                )));
            }
        };
        Ok(Self { key })
    }

    /// Base58 ed25519 signature over `message`.
    pub fn sign(&self, message: &str) -> String {
        let signature = self.key.sign(message.as_bytes());
        bs58::encode(signature.to_bytes()).into_string()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Base58 public key, i.e. the wallet address this key signs for.
    pub fn address(&self) -> String {
        bs58::encode(self.key.verifying_key().to_bytes()).into_string()
    }
}

/// Parse an optional key. A key that does not parse is logged and dropped,
/// leaving the pundit able to post but not comment.
pub fn signer_from_key(raw: Option<&str>) -> Option<MessageSigner> {
    let raw = raw.map(str::trim).filter(|k| !k.is_empty())?;
    match MessageSigner::parse(raw) {
        Ok(signer) => Some(signer),
        Err(e) => {
            warn!("Ignoring private key ({e}); comments are disabled");
            None
        }
    }
}

impl fmt::Debug for MessageSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageSigner(..)")
    }
}

/// The signed part of a comment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedComment<'a> {
    market_pda: &'a str,
    content: &'a str,
}

/// `x-wallet-address`, `x-signature` and `x-message` headers for one comment.
pub fn comment_headers(
    signer: &MessageSigner,
    wallet_address: &str,
    market_pda: &str,
    content: &str,
) -> Result<HeaderMap, PunditError> {
    let message = serde_json::to_string(&SignedComment {
        market_pda,
        content,
    })
    .map_err(|e| PunditError::Header {
        name: "x-message",
        reason: e.to_string(),
    })?;
    let signature = signer.sign(&message);

    let mut headers = HeaderMap::new();
    for (name, value) in [
        ("x-wallet-address", wallet_address),
        ("x-signature", signature.as_str()),
        ("x-message", message.as_str()),
    ] {
        let value = HeaderValue::from_str(value).map_err(|e| PunditError::Header {
            name,
            reason: e.to_string(),
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

// ── Runner ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PunditSettings {
    pub wallet_address: String,
    pub post_cooldown: Duration,
    pub comment_cooldown: Duration,
}

/// What one run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub markets: usize,
    pub analyses: usize,
    pub posts: usize,
    pub comments: usize,
}

pub struct Pundit {
    client: BaoziClient,
    signer: Option<MessageSigner>,
    settings: PunditSettings,
    cooldowns: Cooldowns,
}

impl Pundit {
    pub fn new(
        client: BaoziClient,
        signer: Option<MessageSigner>,
        settings: PunditSettings,
    ) -> Self {
        let cooldowns = Cooldowns::new(settings.post_cooldown, settings.comment_cooldown);
        Self {
            client,
            signer,
            settings,
            cooldowns,
        }
    }

    pub fn can_comment(&self) -> bool {
        self.signer.is_some()
    }

    /// List active markets, post the top analyses and comment on busy
    /// markets. Only the market listing can fail the run.
    pub async fn run_analysis(&mut self) -> Result<RunSummary, PunditError> {
        let query = MarketQuery {
            status: Some(MarketStatus::Active),
            layer: None,
            limit: Some(MARKET_LIMIT),
        };
        let markets = self.client.list_markets(&query).await?;

        let mut summary = RunSummary {
            markets: markets.len(),
            ..RunSummary::default()
        };
        if markets.is_empty() {
            info!("No active markets found");
            return Ok(summary);
        }

        let analyses = analyze_markets(&markets, Utc::now());
        summary.analyses = analyses.len();

        for analysis in analyses.iter().take(POSTS_PER_RUN) {
            if self.post(analysis).await {
                summary.posts += 1;
            }
        }

        let busy = markets
            .iter()
            .filter(|m| m.pool > COMMENT_MIN_POOL)
            .take(COMMENTS_PER_RUN);
        for market in busy {
            if self.comment(market).await {
                summary.comments += 1;
            }
        }

        Ok(summary)
    }

    async fn post(&mut self, analysis: &MarketAnalysis) -> bool {
        let now = Utc::now();
        if let Some(remaining) = self.cooldowns.post_remaining(now) {
            info!(
                "Skipping post: cooldown ({}m remaining)",
                ceil_div(remaining.num_milliseconds(), 60_000)
            );
            return false;
        }

        let post = AgentBookPost {
            wallet_address: self.settings.wallet_address.clone(),
            content: post_content(analysis),
            market_pda: Some(analysis.market.pda.clone()),
        };
        match self.client.create_post(&post).await {
            Ok(()) => {
                self.cooldowns.record_post(Utc::now());
                info!(
                    "Posted to AgentBook: {}",
                    truncate_chars(&analysis.market.question, 50)
                );
                true
            }
            Err(e) => {
                warn!("Failed to post to AgentBook: {e}");
                false
            }
        }
    }

    async fn comment(&mut self, market: &Market) -> bool {
        if !self.cooldowns.comment_ready(&market.pda, Utc::now()) {
            debug!("Skipping comment on {}: cooldown", market.pda);
            return false;
        }
        let Some(signer) = &self.signer else {
            debug!("Skipping comment on {}: no signing key", market.pda);
            return false;
        };
        let Some(content) = comment_content(market) else {
            return false;
        };

        let result = async {
            let headers = comment_headers(
                signer,
                &self.settings.wallet_address,
                &market.pda,
                &content,
            )?;
            self.client
                .create_comment(&market.pda, &content, headers)
                .await?;
            Ok::<(), PunditError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.cooldowns.record_comment(&market.pda, Utc::now());
                info!(
                    "Commented on market: {}",
                    truncate_chars(&market.question, 40)
                );
                true
            }
            Err(e) => {
                warn!("Failed to comment on {}: {e}", market.pda);
                false
            }
        }
    }
}

/// Post cooldown plus one comment cooldown per market PDA. Only successful
/// sends start a cooldown.
#[derive(Debug, Clone)]
pub struct Cooldowns {
    post_cooldown: Duration,
    comment_cooldown: Duration,
    last_post: Option<DateTime<Utc>>,
    last_comments: HashMap<String, DateTime<Utc>>,
}

impl Cooldowns {
    pub fn new(post_cooldown: Duration, comment_cooldown: Duration) -> Self {
        Self {
            post_cooldown,
            comment_cooldown,
            last_post: None,
            last_comments: HashMap::new(),
        }
    }

    /// Time left before the next post is allowed, `None` if allowed now.
    pub fn post_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let elapsed = now - self.last_post?;
        (elapsed < self.post_cooldown).then(|| self.post_cooldown - elapsed)
    }

    pub fn record_post(&mut self, at: DateTime<Utc>) {
        self.last_post = Some(at);
    }

    pub fn comment_ready(&self, market_pda: &str, now: DateTime<Utc>) -> bool {
        self.last_comments
            .get(market_pda)
            .is_none_or(|last| now - *last >= self.comment_cooldown)
    }

    pub fn record_comment(&mut self, market_pda: &str, at: DateTime<Utc>) {
        self.last_comments.insert(market_pda.to_string(), at);
    }
}
