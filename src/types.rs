use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Odds per market, keyed by market id. Each list is parallel to the market's
/// outcome names.
pub type OddsSnapshot = HashMap<String, Vec<f64>>;

/// Lifecycle status of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    #[default]
    Active,
    Closed,
    Resolved,
    /// Any status string the platform sends that we don't model.
    Unknown,
}

impl MarketStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            "closed" => Self::Closed,
            "resolved" => Self::Resolved,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Resolved => "resolved",
            Self::Unknown => "unknown",
        }
    }
}

/// Market tier on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketLayer {
    Official,
    #[default]
    Lab,
    Private,
    Unknown,
}

impl MarketLayer {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "official" => Self::Official,
            "lab" => Self::Lab,
            "private" => Self::Private,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Lab => "lab",
            Self::Private => "private",
            Self::Unknown => "unknown",
        }
    }
}

/// Full market record as returned by `GET /markets/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: String,
    pub pda: String,
    pub question: String,
    pub status: MarketStatus,
    pub layer: MarketLayer,
    pub outcomes: Vec<String>,
    /// Percentages, one per outcome. Not guaranteed to sum to 100.
    pub odds: Vec<f64>,
    pub pool: f64,
    /// `None` when the platform omitted the field or sent an unparseable time.
    pub closing_time: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

/// A wallet's stake in one market.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub market_id: String,
    pub market_question: String,
    /// Index into the market's outcome list.
    pub outcome: usize,
    pub outcome_name: String,
    pub amount: f64,
    pub potential_winnings: f64,
    /// Odds for `outcome` at the time the position was queried.
    pub current_odds: f64,
}

/// Winnings owed to a wallet for a resolved, not yet claimed market.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimableWinnings {
    pub market_id: String,
    pub market_question: String,
    pub winning_outcome: usize,
    pub winning_outcome_name: String,
    pub amount: f64,
}

/// Resolution status of a market the wallet holds a bet in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketResolution {
    pub market_id: String,
    pub market_question: String,
    pub resolved_outcome: usize,
    pub resolved_outcome_name: String,
    pub user_bet_outcome: usize,
    pub user_won: bool,
    /// Zero when the wallet lost or already claimed.
    pub claimable_amount: f64,
}

/// Current odds and pool size for a market.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub odds: Vec<f64>,
    pub pool: f64,
}

// ── Alerts ─────────────────────────────────────────────────────────

/// One alert for one wallet, produced by the alert engine and consumed once
/// by a notifier.
///
/// Serializes as `{type, data, wallet, title, message, timestamp}`, which is
/// also the generic webhook body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(flatten)]
    pub kind: AlertKind,
    pub wallet: String,
    pub title: String,
    pub message: String,
    #[serde(serialize_with = "serialize_millis")]
    pub timestamp: DateTime<Utc>,
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
fn serialize_millis<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl Alert {
    /// Wire name of the alert kind, e.g. `odds_shift`.
    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

/// Kind-specific alert payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AlertKind {
    MarketResolved(MarketResolution),
    UnclaimedWinnings(UnclaimedWinnings),
    ClosingSoon(ClosingSoon),
    OddsShift(OddsShift),
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MarketResolved(_) => "market_resolved",
            Self::UnclaimedWinnings(_) => "unclaimed_winnings",
            Self::ClosingSoon(_) => "closing_soon",
            Self::OddsShift(_) => "odds_shift",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnclaimedWinnings {
    pub total_amount: f64,
    pub markets: Vec<ClaimableWinnings>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosingSoon {
    pub market_id: String,
    pub market_question: String,
    pub hours_remaining: i64,
    pub user_position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsShift {
    pub market_id: String,
    pub market_question: String,
    pub old_odds: f64,
    pub new_odds: f64,
    /// Absolute difference in percentage points.
    pub shift_percentage: f64,
    pub direction: ShiftDirection,
    pub user_outcome: usize,
    pub user_outcome_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftDirection {
    Up,
    Down,
}

impl fmt::Display for ShiftDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}
