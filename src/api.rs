use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;
use crate::types::{
    ClaimableWinnings, Market, MarketLayer, MarketResolution, MarketStatus, Position, Quote,
};

/// Read access to the platform data the alert engine needs.
///
/// Every method fails with an [`ApiError`] on a non-2xx response or network
/// failure; callers decide whether that failure is fatal for the wallet or
/// only drops one item.
#[async_trait]
pub trait MarketGateway: Send + Sync {
    async fn positions(&self, wallet: &str) -> Result<Vec<Position>, ApiError>;
    async fn claimable(&self, wallet: &str) -> Result<Vec<ClaimableWinnings>, ApiError>;
    async fn resolutions(&self, wallet: &str) -> Result<Vec<MarketResolution>, ApiError>;
    async fn market(&self, market_id: &str) -> Result<Market, ApiError>;
    async fn quote(&self, market_id: &str) -> Result<Quote, ApiError>;
}

/// Filter for `GET /markets`. `None` fields are omitted (the API's "all").
#[derive(Debug, Clone, Default)]
pub struct MarketQuery {
    pub status: Option<MarketStatus>,
    pub layer: Option<MarketLayer>,
    pub limit: Option<u32>,
}

impl MarketQuery {
    fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(layer) = self.layer {
            pairs.push(("layer", layer.as_str().to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

/// Body of `POST /agentbook/posts`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentBookPost {
    pub wallet_address: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_pda: Option<String>,
}

/// HTTP client for the Baozi REST API.
#[derive(Debug, Clone)]
pub struct BaoziClient {
    http: reqwest::Client,
    base_url: String,
}

impl BaoziClient {
    /// Build a client with its own connection pool and a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self::with_http(http, base_url))
    }

    /// Reuse an existing `reqwest::Client`.
    pub fn with_http(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch markets matching `query`.
    pub async fn list_markets(&self, query: &MarketQuery) -> Result<Vec<Market>, ApiError> {
        let endpoint = "/markets";
        let body = self.get_json(endpoint, &query.to_pairs()).await?;
        let markets: Vec<Market> = list_field(&body, "markets", endpoint)?
            .iter()
            .map(parse_market)
            .collect();
        debug!("Fetched {} markets", markets.len());
        Ok(markets)
    }

    /// Publish a post to the AgentBook feed.
    pub async fn create_post(&self, post: &AgentBookPost) -> Result<(), ApiError> {
        self.post_json("/agentbook/posts", post, HeaderMap::new())
            .await
    }

    /// Comment on a market. `headers` carries the wallet signature.
    pub async fn create_comment(
        &self,
        market_pda: &str,
        content: &str,
        headers: HeaderMap,
    ) -> Result<(), ApiError> {
        let endpoint = format!("/markets/{market_pda}/comments");
        self.post_json(&endpoint, &serde_json::json!({ "content": content }), headers)
            .await
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }

        let bytes = resp.bytes().await.map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        headers: HeaderMap,
    ) -> Result<(), ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MarketGateway for BaoziClient {
    async fn positions(&self, wallet: &str) -> Result<Vec<Position>, ApiError> {
        let endpoint = format!("/positions/{wallet}");
        let body = self.get_json(&endpoint, &[]).await?;
        let positions: Vec<Position> = list_field(&body, "positions", &endpoint)?
            .iter()
            .map(parse_position)
            .collect();
        debug!("Fetched {} positions for {wallet}", positions.len());
        Ok(positions)
    }

    async fn claimable(&self, wallet: &str) -> Result<Vec<ClaimableWinnings>, ApiError> {
        let endpoint = format!("/claimable/{wallet}");
        let body = self.get_json(&endpoint, &[]).await?;
        Ok(list_field(&body, "claimable", &endpoint)?
            .iter()
            .map(parse_claimable)
            .collect())
    }

    async fn resolutions(&self, wallet: &str) -> Result<Vec<MarketResolution>, ApiError> {
        let endpoint = format!("/resolutions/{wallet}");
        let body = self.get_json(&endpoint, &[]).await?;
        Ok(list_field(&body, "resolutions", &endpoint)?
            .iter()
            .map(parse_resolution)
            .collect())
    }

    async fn market(&self, market_id: &str) -> Result<Market, ApiError> {
        let endpoint = format!("/markets/{market_id}");
        let body = self.get_json(&endpoint, &[]).await?;
        Ok(parse_market(&body))
    }

    async fn quote(&self, market_id: &str) -> Result<Quote, ApiError> {
        let endpoint = format!("/quote/{market_id}");
        let body = self.get_json(&endpoint, &[]).await?;
        parse_quote(&body).ok_or_else(|| ApiError::Decode {
            endpoint,
            reason: "missing odds array".to_string(),
        })
    }
}

// ── Record parsing ─────────────────────────────────────────────────
//
// The API is inconsistent about key casing and number encoding, so records
// are read field by field from `serde_json::Value`, trying each accepted key
// in order. Null, `""`, `0` and `false` count as unset and fall through to
// the next key.

fn list_field<'a>(body: &'a Value, key: &str, endpoint: &str) -> Result<&'a Vec<Value>, ApiError> {
    body.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Decode {
            endpoint: endpoint.to_string(),
            reason: format!("missing `{key}` array"),
        })
}

fn is_set(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn first<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find(|v| is_set(v))
}

fn text(record: &Value, keys: &[&str]) -> Option<String> {
    first(record, keys).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn as_number(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

fn number(record: &Value, keys: &[&str]) -> Option<f64> {
    first(record, keys).and_then(as_number)
}

fn index(record: &Value, keys: &[&str]) -> usize {
    number(record, keys)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as usize)
        .unwrap_or(0)
}

fn flag(record: &Value, keys: &[&str]) -> bool {
    match first(record, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn numbers(v: &Value) -> Option<Vec<f64>> {
    v.as_array()
        .map(|arr| arr.iter().map(|x| as_number(x).unwrap_or(0.0)).collect())
}

/// Accepts RFC 3339 strings and unix timestamps (seconds or milliseconds).
fn timestamp(record: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    match first(record, keys)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw > 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

pub fn parse_market(m: &Value) -> Market {
    let id = text(m, &["id", "pda"]).unwrap_or_default();
    let pda = text(m, &["pda", "id"]).unwrap_or_default();
    Market {
        id,
        pda,
        question: text(m, &["question"]).unwrap_or_default(),
        status: text(m, &["status"])
            .map(|s| MarketStatus::parse(&s))
            .unwrap_or_default(),
        layer: text(m, &["layer"])
            .map(|s| MarketLayer::parse(&s))
            .unwrap_or_default(),
        outcomes: m
            .get("outcomes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|o| match o {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_else(|| vec!["Yes".to_string(), "No".to_string()]),
        odds: m
            .get("odds")
            .and_then(numbers)
            .unwrap_or_else(|| vec![50.0, 50.0]),
        pool: number(m, &["pool", "totalPool", "total_pool"]).unwrap_or(0.0),
        closing_time: timestamp(m, &["closingTime", "closing_time"]),
        resolution: text(m, &["resolution"]),
    }
}

pub fn parse_position(p: &Value) -> Position {
    Position {
        market_id: text(p, &["marketId", "market_id"]).unwrap_or_default(),
        market_question: text(p, &["marketQuestion", "market_question"]).unwrap_or_default(),
        outcome: index(p, &["outcome"]),
        outcome_name: text(p, &["outcomeName", "outcome_name"]).unwrap_or_default(),
        amount: number(p, &["amount", "stake"]).unwrap_or(0.0),
        potential_winnings: number(p, &["potentialWinnings", "potential_winnings"])
            .unwrap_or(0.0),
        current_odds: number(p, &["currentOdds", "current_odds"]).unwrap_or(50.0),
    }
}

pub fn parse_claimable(c: &Value) -> ClaimableWinnings {
    ClaimableWinnings {
        market_id: text(c, &["marketId", "market_id"]).unwrap_or_default(),
        market_question: text(c, &["marketQuestion", "market_question"]).unwrap_or_default(),
        winning_outcome: index(c, &["winningOutcome", "winning_outcome"]),
        winning_outcome_name: text(c, &["winningOutcomeName", "winning_outcome_name"])
            .unwrap_or_default(),
        amount: number(c, &["amount", "winnings"]).unwrap_or(0.0),
    }
}

pub fn parse_resolution(r: &Value) -> MarketResolution {
    MarketResolution {
        market_id: text(r, &["marketId", "market_id"]).unwrap_or_default(),
        market_question: text(r, &["marketQuestion", "market_question"]).unwrap_or_default(),
        resolved_outcome: index(r, &["resolvedOutcome", "resolved_outcome"]),
        resolved_outcome_name: text(r, &["resolvedOutcomeName", "resolved_outcome_name"])
            .unwrap_or_default(),
        user_bet_outcome: index(r, &["userBetOutcome", "user_bet_outcome"]),
        user_won: flag(r, &["userWon", "user_won"]),
        claimable_amount: number(r, &["claimableAmount", "claimable_amount"]).unwrap_or(0.0),
    }
}

/// `None` when the response carries no odds array.
pub fn parse_quote(q: &Value) -> Option<Quote> {
    let odds = q.get("odds").and_then(numbers)?;
    Some(Quote {
        odds,
        pool: number(q, &["pool", "totalPool"]).unwrap_or(0.0),
    })
}
