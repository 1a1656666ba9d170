use std::collections::{HashMap, HashSet};
use std::future::Future;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::CLAIM_URL;
use crate::api::MarketGateway;
use crate::config::AlertSettings;
use crate::error::ApiError;
use crate::state::{CachedWalletState, WalletStateCache};
use crate::types::{
    Alert, AlertKind, ClaimableWinnings, ClosingSoon, Market, MarketResolution, MarketStatus,
    OddsShift, OddsSnapshot, Position, ShiftDirection, UnclaimedWinnings,
};

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Everything fetched for one wallet in one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct WalletSnapshot {
    pub positions: Vec<Position>,
    pub claimable: Vec<ClaimableWinnings>,
    pub resolutions: Vec<MarketResolution>,
    /// Fresh odds for every position market whose quote succeeded.
    pub odds: OddsSnapshot,
    /// Full market records, only fetched when closing-soon alerts are on.
    pub markets: HashMap<String, Market>,
}

/// Polls wallets through a [`MarketGateway`] and turns what changed into
/// [`Alert`]s.
///
/// The engine owns the per-wallet cache. `check_wallets` takes `&mut self`,
/// so two cycles on one engine can never interleave cache writes.
pub struct AlertEngine<G> {
    gateway: G,
    wallets: Vec<String>,
    settings: AlertSettings,
    cache: WalletStateCache,
}

impl<G: MarketGateway> AlertEngine<G> {
    pub fn new(gateway: G, wallets: Vec<String>, settings: AlertSettings) -> Self {
        Self {
            gateway,
            wallets,
            settings,
            cache: WalletStateCache::new(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn wallets(&self) -> &[String] {
        &self.wallets
    }

    pub fn cache(&self) -> &WalletStateCache {
        &self.cache
    }

    /// Check every configured wallet and return this cycle's alerts, grouped
    /// by wallet in configuration order.
    ///
    /// Wallets are fetched concurrently. A wallet whose fetch fails is logged
    /// and contributes no alerts; its cache entry is left untouched.
    pub async fn check_wallets(&mut self) -> Vec<Alert> {
        let gateway = &self.gateway;
        let settings = &self.settings;
        let fetches = self
            .wallets
            .iter()
            .map(|wallet| collect_snapshot(gateway, wallet, settings));
        let snapshots = join_all(fetches).await;

        let now = Utc::now();
        let mut alerts = Vec::new();
        for (wallet, result) in self.wallets.iter().zip(snapshots) {
            match result {
                Ok(snapshot) => {
                    let wallet_alerts =
                        apply_snapshot(&mut self.cache, &self.settings, wallet, &snapshot, now);
                    if !wallet_alerts.is_empty() {
                        info!("[{}] {} alert(s)", short_id(wallet), wallet_alerts.len());
                    }
                    alerts.extend(wallet_alerts);
                }
                Err(e) => {
                    warn!("Error checking wallet {wallet}: {e}");
                }
            }
        }
        alerts
    }

    /// Check a single wallet, propagating the fetch error instead of logging it.
    pub async fn check_wallet(&mut self, wallet: &str) -> Result<Vec<Alert>, ApiError> {
        let snapshot = collect_snapshot(&self.gateway, wallet, &self.settings).await?;
        Ok(apply_snapshot(
            &mut self.cache,
            &self.settings,
            wallet,
            &snapshot,
            Utc::now(),
        ))
    }
}

/// Overwrite the wallet's cache entry, then evaluate against the entry it
/// replaced.
fn apply_snapshot(
    cache: &mut WalletStateCache,
    settings: &AlertSettings,
    wallet: &str,
    snapshot: &WalletSnapshot,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let previous = cache.replace(
        wallet,
        CachedWalletState {
            positions: snapshot.positions.clone(),
            odds: snapshot.odds.clone(),
            last_check: now,
        },
    );
    evaluate(wallet, snapshot, previous.as_ref(), settings, now)
}

/// Fetch positions, claimable winnings and resolutions concurrently, then
/// quotes (and markets, if needed) for every position market.
///
/// Only the three wallet-level fetches can fail the snapshot; per-market
/// failures just leave that market out.
pub async fn collect_snapshot<G: MarketGateway + ?Sized>(
    gateway: &G,
    wallet: &str,
    settings: &AlertSettings,
) -> Result<WalletSnapshot, ApiError> {
    let (positions, claimable, resolutions) = tokio::try_join!(
        gateway.positions(wallet),
        async {
            if settings.claimable {
                gateway.claimable(wallet).await
            } else {
                Ok(Vec::new())
            }
        },
        async {
            if settings.claimable {
                gateway.resolutions(wallet).await
            } else {
                Ok(Vec::new())
            }
        },
    )?;

    let (quotes, markets) = {
        let market_ids = unique_market_ids(&positions);
        let quotes = collect_best_effort(&market_ids, |id| gateway.quote(id));
        let markets = async {
            if settings.closing_soon {
                collect_best_effort(&market_ids, |id| gateway.market(id)).await
            } else {
                HashMap::new()
            }
        };
        tokio::join!(quotes, markets)
    };

    let odds = quotes
        .into_iter()
        .map(|(id, quote)| (id, quote.odds))
        .collect();

    Ok(WalletSnapshot {
        positions,
        claimable,
        resolutions,
        odds,
        markets,
    })
}

fn unique_market_ids(positions: &[Position]) -> Vec<&str> {
    let mut seen = HashSet::new();
    positions
        .iter()
        .map(|p| p.market_id.as_str())
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Run `fetch` for every id concurrently and keep only the successes.
pub async fn collect_best_effort<'a, T, F, Fut>(ids: &[&'a str], fetch: F) -> HashMap<String, T>
where
    F: Fn(&'a str) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let attempts = ids.iter().map(|&id| {
        let pending = fetch(id);
        async move { (id, pending.await) }
    });
    join_all(attempts)
        .await
        .into_iter()
        .filter_map(|(id, result)| match result {
            Ok(value) => Some((id.to_string(), value)),
            Err(e) => {
                debug!("Skipping market {id}: {e}");
                None
            }
        })
        .collect()
}

// ── Detectors ──────────────────────────────────────────────────────

/// Run the enabled detectors in their fixed order: resolved, unclaimed,
/// closing-soon, odds-shift.
pub fn evaluate(
    wallet: &str,
    snapshot: &WalletSnapshot,
    previous: Option<&CachedWalletState>,
    settings: &AlertSettings,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if settings.claimable {
        alerts.extend(detect_market_resolved(wallet, &snapshot.resolutions, now));
        alerts.extend(detect_unclaimed_winnings(wallet, &snapshot.claimable, now));
    }

    if settings.closing_soon {
        alerts.extend(detect_closing_soon(
            wallet,
            &snapshot.positions,
            &snapshot.markets,
            settings.closing_soon_hours,
            now,
        ));
    }

    if settings.odds_shift {
        if let Some(previous) = previous {
            alerts.extend(detect_odds_shift(
                wallet,
                &snapshot.positions,
                &previous.odds,
                &snapshot.odds,
                settings.odds_shift_threshold,
                now,
            ));
        }
    }

    alerts
}

/// One alert per resolved market the wallet won and can still claim.
pub fn detect_market_resolved(
    wallet: &str,
    resolutions: &[MarketResolution],
    now: DateTime<Utc>,
) -> Vec<Alert> {
    resolutions
        .iter()
        .filter(|r| r.user_won && r.claimable_amount > 0.0)
        .map(|r| {
            // Only winners reach here, so "incorrectly" is effectively unused.
            let verdict = if r.user_bet_outcome == r.resolved_outcome {
                "correctly"
            } else {
                "incorrectly"
            };
            Alert {
                kind: AlertKind::MarketResolved(r.clone()),
                wallet: wallet.to_string(),
                title: "Market Resolved - Claim Your Winnings!".to_string(),
                message: format!(
                    "Market \"{}\" resolved {}. You bet {verdict}. Claim {:.4} SOL at {CLAIM_URL}",
                    r.market_question, r.resolved_outcome_name, r.claimable_amount,
                ),
                timestamp: now,
            }
        })
        .collect()
}

/// A single aggregate alert covering every market with unclaimed winnings.
pub fn detect_unclaimed_winnings(
    wallet: &str,
    claimable: &[ClaimableWinnings],
    now: DateTime<Utc>,
) -> Option<Alert> {
    if claimable.is_empty() {
        return None;
    }

    let total_amount: f64 = claimable.iter().map(|c| c.amount).sum();
    Some(Alert {
        kind: AlertKind::UnclaimedWinnings(UnclaimedWinnings {
            total_amount,
            markets: claimable.to_vec(),
        }),
        wallet: wallet.to_string(),
        title: "Unclaimed Winnings Available!".to_string(),
        message: format!(
            "You have {total_amount:.4} SOL unclaimed across {} market(s). Claim at {CLAIM_URL}",
            claimable.len(),
        ),
        timestamp: now,
    })
}

/// Positions in active markets closing within `window_hours` of `now`.
///
/// Positions whose market record could not be fetched are skipped.
pub fn detect_closing_soon(
    wallet: &str,
    positions: &[Position],
    markets: &HashMap<String, Market>,
    window_hours: u32,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let window_ms = i64::from(window_hours) * MS_PER_HOUR;

    positions
        .iter()
        .filter_map(|position| {
            let market = markets.get(&position.market_id)?;
            let closing_time = market.closing_time?;
            let remaining_ms = (closing_time - now).num_milliseconds();

            let in_window = remaining_ms > 0 && remaining_ms <= window_ms;
            if !in_window || market.status != MarketStatus::Active {
                return None;
            }

            let hours_remaining = (remaining_ms + MS_PER_HOUR - 1) / MS_PER_HOUR;
            Some(Alert {
                kind: AlertKind::ClosingSoon(ClosingSoon {
                    market_id: market.id.clone(),
                    market_question: market.question.clone(),
                    hours_remaining,
                    user_position: position.clone(),
                }),
                wallet: wallet.to_string(),
                title: "Market Closing Soon!".to_string(),
                message: format!(
                    "Market \"{}\" closes in {hours_remaining} hours. Your position: {:.4} SOL on {} ({}%)",
                    market.question, position.amount, position.outcome_name, position.current_odds,
                ),
                timestamp: now,
            })
        })
        .collect()
}

/// Positions whose outcome odds moved by at least `threshold` percentage
/// points between the previous and the current snapshot.
pub fn detect_odds_shift(
    wallet: &str,
    positions: &[Position],
    old_odds: &OddsSnapshot,
    new_odds: &OddsSnapshot,
    threshold: u32,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let threshold = f64::from(threshold);

    positions
        .iter()
        .filter_map(|position| {
            let old_market = old_odds.get(&position.market_id)?;
            let new_market = new_odds.get(&position.market_id)?;

            let old = old_market.get(position.outcome).copied().unwrap_or(0.0);
            let new = new_market.get(position.outcome).copied().unwrap_or(0.0);

            // 0% is treated as "no baseline".
            if old == 0.0 {
                return None;
            }

            let shift = (new - old).abs();
            if shift < threshold {
                return None;
            }

            let direction = if new > old {
                ShiftDirection::Up
            } else {
                ShiftDirection::Down
            };
            Some(Alert {
                kind: AlertKind::OddsShift(OddsShift {
                    market_id: position.market_id.clone(),
                    market_question: position.market_question.clone(),
                    old_odds: old,
                    new_odds: new,
                    shift_percentage: shift,
                    direction,
                    user_outcome: position.outcome,
                    user_outcome_name: position.outcome_name.clone(),
                }),
                wallet: wallet.to_string(),
                title: "Significant Odds Shift Detected!".to_string(),
                message: format!(
                    "Odds on \"{}\" shifted {direction} from {old:.1}% to {new:.1}% for {}. You hold {:.4} SOL on this outcome.",
                    position.market_question, position.outcome_name, position.amount,
                ),
                timestamp: now,
            })
        })
        .collect()
}

/// Last six characters of a wallet, for log prefixes.
fn short_id(wallet: &str) -> &str {
    let start = wallet
        .char_indices()
        .rev()
        .nth(5)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &wallet[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use reqwest::StatusCode;

    use crate::types::{MarketLayer, Quote};

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn unavailable(endpoint: &str) -> ApiError {
        ApiError::Status {
            endpoint: endpoint.to_string(),
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }
    }

    fn make_position(market_id: &str, outcome: usize, amount: f64, odds: f64) -> Position {
        Position {
            market_id: market_id.to_string(),
            market_question: format!("Question {market_id}?"),
            outcome,
            outcome_name: if outcome == 0 { "Yes" } else { "No" }.to_string(),
            amount,
            potential_winnings: amount * 2.0,
            current_odds: odds,
        }
    }

    fn make_market(id: &str, status: MarketStatus, closes_in: Duration) -> Market {
        Market {
            id: id.to_string(),
            pda: format!("pda-{id}"),
            question: format!("Question {id}?"),
            status,
            layer: MarketLayer::Official,
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            odds: vec![50.0, 50.0],
            pool: 10.0,
            closing_time: Some(Utc::now() + closes_in),
            resolution: None,
        }
    }

    fn make_resolution(user_won: bool, claimable_amount: f64) -> MarketResolution {
        MarketResolution {
            market_id: "m1".to_string(),
            market_question: "Will SOL hit $300?".to_string(),
            resolved_outcome: 0,
            resolved_outcome_name: "Yes".to_string(),
            user_bet_outcome: 0,
            user_won,
            claimable_amount,
        }
    }

    fn make_claimable(market_id: &str, amount: f64) -> ClaimableWinnings {
        ClaimableWinnings {
            market_id: market_id.to_string(),
            market_question: format!("Question {market_id}?"),
            winning_outcome: 0,
            winning_outcome_name: "Yes".to_string(),
            amount,
        }
    }

    fn odds(entries: &[(&str, &[f64])]) -> OddsSnapshot {
        entries
            .iter()
            .map(|(id, o)| (id.to_string(), o.to_vec()))
            .collect()
    }

    // ── Fake gateway ───────────────────────────────────────────────

    /// In-memory gateway. Quotes are popped per call so consecutive cycles
    /// can see different odds; the last quote for a market is sticky.
    #[derive(Default)]
    struct FakeGateway {
        positions: HashMap<String, Vec<Position>>,
        failing_wallets: HashSet<String>,
        claimable: HashMap<String, Vec<ClaimableWinnings>>,
        resolutions: HashMap<String, Vec<MarketResolution>>,
        markets: HashMap<String, Market>,
        quotes: Mutex<HashMap<String, Vec<Vec<f64>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn with_positions(mut self, wallet: &str, positions: Vec<Position>) -> Self {
            self.positions.insert(wallet.to_string(), positions);
            self
        }

        fn with_claimable(mut self, wallet: &str, claimable: Vec<ClaimableWinnings>) -> Self {
            self.claimable.insert(wallet.to_string(), claimable);
            self
        }

        fn with_resolutions(mut self, wallet: &str, resolutions: Vec<MarketResolution>) -> Self {
            self.resolutions.insert(wallet.to_string(), resolutions);
            self
        }

        fn with_market(mut self, market: Market) -> Self {
            self.markets.insert(market.id.clone(), market);
            self
        }

        fn with_quotes(self, market_id: &str, sequence: Vec<Vec<f64>>) -> Self {
            self.quotes
                .lock()
                .unwrap()
                .insert(market_id.to_string(), sequence);
            self
        }

        fn failing(mut self, wallet: &str) -> Self {
            self.failing_wallets.insert(wallet.to_string());
            self
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn called(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }
    }

    #[async_trait]
    impl MarketGateway for FakeGateway {
        async fn positions(&self, wallet: &str) -> Result<Vec<Position>, ApiError> {
            self.record(format!("positions:{wallet}"));
            if self.failing_wallets.contains(wallet) {
                return Err(unavailable("/positions"));
            }
            Ok(self.positions.get(wallet).cloned().unwrap_or_default())
        }

        async fn claimable(&self, wallet: &str) -> Result<Vec<ClaimableWinnings>, ApiError> {
            self.record(format!("claimable:{wallet}"));
            Ok(self.claimable.get(wallet).cloned().unwrap_or_default())
        }

        async fn resolutions(&self, wallet: &str) -> Result<Vec<MarketResolution>, ApiError> {
            self.record(format!("resolutions:{wallet}"));
            Ok(self.resolutions.get(wallet).cloned().unwrap_or_default())
        }

        async fn market(&self, market_id: &str) -> Result<Market, ApiError> {
            self.record(format!("market:{market_id}"));
            self.markets
                .get(market_id)
                .cloned()
                .ok_or_else(|| unavailable("/markets"))
        }

        async fn quote(&self, market_id: &str) -> Result<Quote, ApiError> {
            self.record(format!("quote:{market_id}"));
            let mut quotes = self.quotes.lock().unwrap();
            let sequence = quotes
                .get_mut(market_id)
                .ok_or_else(|| unavailable("/quote"))?;
            let odds = if sequence.len() > 1 {
                sequence.remove(0)
            } else {
                sequence.first().cloned().ok_or_else(|| unavailable("/quote"))?
            };
            Ok(Quote { odds, pool: 10.0 })
        }
    }

    fn engine(
        gateway: FakeGateway,
        wallets: &[&str],
        settings: AlertSettings,
    ) -> AlertEngine<FakeGateway> {
        AlertEngine::new(
            gateway,
            wallets.iter().map(|w| w.to_string()).collect(),
            settings,
        )
    }

    // ── detect_market_resolved ─────────────────────────────────────

    #[test]
    fn resolved_winner_with_claimable_alerts() {
        let alerts = detect_market_resolved("w1", &[make_resolution(true, 5.0)], now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].label(), "market_resolved");
        assert_eq!(alerts[0].title, "Market Resolved - Claim Your Winnings!");
        assert_eq!(
            alerts[0].message,
            "Market \"Will SOL hit $300?\" resolved Yes. You bet correctly. Claim 5.0000 SOL at baozi.bet/my-bets"
        );
        assert_eq!(alerts[0].timestamp, now());
    }

    #[test]
    fn resolved_loser_never_alerts() {
        let alerts = detect_market_resolved("w1", &[make_resolution(false, 5.0)], now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn resolved_already_claimed_never_alerts() {
        let alerts = detect_market_resolved("w1", &[make_resolution(true, 0.0)], now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn resolved_mismatched_outcome_says_incorrectly() {
        let mut r = make_resolution(true, 1.0);
        r.user_bet_outcome = 1;
        let alerts = detect_market_resolved("w1", &[r], now());
        assert!(alerts[0].message.contains("You bet incorrectly."));
    }

    // ── detect_unclaimed_winnings ──────────────────────────────────

    #[test]
    fn unclaimed_empty_is_none() {
        assert!(detect_unclaimed_winnings("w1", &[], now()).is_none());
    }

    #[test]
    fn unclaimed_aggregates_into_one_alert() {
        let claimable = vec![make_claimable("m1", 2.5), make_claimable("m2", 1.0)];
        let alert = detect_unclaimed_winnings("w1", &claimable, now()).unwrap();
        assert_eq!(alert.title, "Unclaimed Winnings Available!");
        assert!(alert.message.contains("3.5000 SOL"));
        assert!(alert.message.contains("2 market(s)"));
        match &alert.kind {
            AlertKind::UnclaimedWinnings(data) => {
                assert!(approx_eq(data.total_amount, 3.5));
                assert_eq!(data.markets.len(), 2);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    // ── detect_closing_soon ────────────────────────────────────────

    fn closing_markets(market: Market) -> HashMap<String, Market> {
        HashMap::from([(market.id.clone(), market)])
    }

    #[test]
    fn closing_soon_inside_window() {
        let now = now();
        let mut market = make_market("m1", MarketStatus::Active, Duration::zero());
        market.closing_time = Some(now + Duration::minutes(150));
        let positions = vec![make_position("m1", 0, 1.5, 62.5)];

        let alerts = detect_closing_soon("w1", &positions, &closing_markets(market), 6, now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Market Closing Soon!");
        assert_eq!(
            alerts[0].message,
            "Market \"Question m1?\" closes in 3 hours. Your position: 1.5000 SOL on Yes (62.5%)"
        );
        match &alerts[0].kind {
            AlertKind::ClosingSoon(data) => {
                assert_eq!(data.hours_remaining, 3);
                assert_eq!(data.user_position, positions[0]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn closing_soon_exactly_at_window_edge() {
        let now = now();
        let mut market = make_market("m1", MarketStatus::Active, Duration::zero());
        market.closing_time = Some(now + Duration::hours(6));
        let positions = vec![make_position("m1", 0, 1.0, 50.0)];
        let alerts = detect_closing_soon("w1", &positions, &closing_markets(market), 6, now);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("closes in 6 hours"));
    }

    #[test]
    fn closing_soon_outside_window_or_past() {
        let now = now();
        let positions = vec![make_position("m1", 0, 1.0, 50.0)];

        let mut later = make_market("m1", MarketStatus::Active, Duration::zero());
        later.closing_time = Some(now + Duration::hours(6) + Duration::milliseconds(1));
        assert!(detect_closing_soon("w1", &positions, &closing_markets(later), 6, now).is_empty());

        let mut closed_already = make_market("m1", MarketStatus::Active, Duration::zero());
        closed_already.closing_time = Some(now);
        assert!(
            detect_closing_soon("w1", &positions, &closing_markets(closed_already), 6, now)
                .is_empty()
        );
    }

    #[test]
    fn closing_soon_requires_active_status() {
        let now = now();
        let positions = vec![make_position("m1", 0, 1.0, 50.0)];
        for status in [MarketStatus::Closed, MarketStatus::Resolved, MarketStatus::Unknown] {
            let mut market = make_market("m1", status, Duration::zero());
            market.closing_time = Some(now + Duration::hours(2));
            let alerts = detect_closing_soon("w1", &positions, &closing_markets(market), 6, now);
            assert!(alerts.is_empty(), "status {status:?} should not alert");
        }
    }

    #[test]
    fn closing_soon_ignores_capitalized_status() {
        let now = now();
        let positions = vec![make_position("m1", 0, 1.0, 50.0)];
        let mut market = make_market("m1", MarketStatus::parse("Active"), Duration::zero());
        market.closing_time = Some(now + Duration::hours(2));
        assert_eq!(market.status, MarketStatus::Unknown);
        assert!(detect_closing_soon("w1", &positions, &closing_markets(market), 6, now).is_empty());
    }

    #[test]
    fn closing_soon_skips_missing_market_and_time() {
        let now = now();
        let positions = vec![make_position("m1", 0, 1.0, 50.0)];
        assert!(detect_closing_soon("w1", &positions, &HashMap::new(), 6, now).is_empty());

        let mut market = make_market("m1", MarketStatus::Active, Duration::zero());
        market.closing_time = None;
        assert!(detect_closing_soon("w1", &positions, &closing_markets(market), 6, now).is_empty());
    }

    // ── detect_odds_shift ──────────────────────────────────────────

    #[test]
    fn odds_shift_up_past_threshold() {
        let positions = vec![make_position("m1", 0, 2.0, 50.0)];
        let old = odds(&[("m1", &[50.0, 50.0])]);
        let new = odds(&[("m1", &[70.0, 30.0])]);

        let alerts = detect_odds_shift("w1", &positions, &old, &new, 15, now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Significant Odds Shift Detected!");
        assert_eq!(
            alerts[0].message,
            "Odds on \"Question m1?\" shifted up from 50.0% to 70.0% for Yes. You hold 2.0000 SOL on this outcome."
        );
        match &alerts[0].kind {
            AlertKind::OddsShift(data) => {
                assert_eq!(data.direction, ShiftDirection::Up);
                assert!(approx_eq(data.old_odds, 50.0));
                assert!(approx_eq(data.new_odds, 70.0));
                assert!(approx_eq(data.shift_percentage, 20.0));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn odds_shift_below_threshold() {
        let positions = vec![make_position("m1", 0, 2.0, 50.0)];
        let old = odds(&[("m1", &[50.0, 50.0])]);
        let new = odds(&[("m1", &[70.0, 30.0])]);
        assert!(detect_odds_shift("w1", &positions, &old, &new, 25, now()).is_empty());
    }

    #[test]
    fn odds_shift_down_on_other_outcome() {
        let positions = vec![make_position("m1", 1, 1.0, 50.0)];
        let old = odds(&[("m1", &[50.0, 50.0])]);
        let new = odds(&[("m1", &[70.0, 30.0])]);
        let alerts = detect_odds_shift("w1", &positions, &old, &new, 15, now());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("shifted down from 50.0% to 30.0% for No"));
    }

    #[test]
    fn odds_shift_exactly_at_threshold_fires() {
        let positions = vec![make_position("m1", 0, 1.0, 50.0)];
        let old = odds(&[("m1", &[50.0, 50.0])]);
        let new = odds(&[("m1", &[35.0, 65.0])]);
        assert_eq!(detect_odds_shift("w1", &positions, &old, &new, 15, now()).len(), 1);
    }

    #[test]
    fn odds_shift_skips_zero_baseline_and_missing_markets() {
        let positions = vec![
            make_position("zero", 0, 1.0, 0.0),
            make_position("gone", 0, 1.0, 50.0),
            make_position("new", 0, 1.0, 50.0),
        ];
        let old = odds(&[("zero", &[0.0, 100.0]), ("gone", &[50.0, 50.0])]);
        let new = odds(&[("zero", &[90.0, 10.0]), ("new", &[90.0, 10.0])]);
        assert!(detect_odds_shift("w1", &positions, &old, &new, 15, now()).is_empty());
    }

    #[test]
    fn odds_shift_missing_index_reads_as_zero() {
        let positions = vec![make_position("m1", 1, 1.0, 50.0)];
        let old = odds(&[("m1", &[50.0, 50.0])]);
        let new = odds(&[("m1", &[100.0])]);
        let alerts = detect_odds_shift("w1", &positions, &old, &new, 15, now());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("from 50.0% to 0.0%"));
    }

    // ── evaluate ───────────────────────────────────────────────────

    #[test]
    fn evaluate_orders_detectors() {
        let now = Utc::now();
        let positions = vec![make_position("m1", 0, 1.0, 50.0)];
        let snapshot = WalletSnapshot {
            positions: positions.clone(),
            claimable: vec![make_claimable("m0", 1.0)],
            resolutions: vec![make_resolution(true, 1.0)],
            odds: odds(&[("m1", &[80.0, 20.0])]),
            markets: closing_markets(make_market("m1", MarketStatus::Active, Duration::hours(1))),
        };
        let previous = CachedWalletState {
            positions,
            odds: odds(&[("m1", &[50.0, 50.0])]),
            last_check: now,
        };

        let alerts = evaluate("w1", &snapshot, Some(&previous), &AlertSettings::default(), now);
        let labels: Vec<&str> = alerts.iter().map(Alert::label).collect();
        assert_eq!(
            labels,
            vec!["market_resolved", "unclaimed_winnings", "closing_soon", "odds_shift"]
        );

        let none = evaluate("w1", &snapshot, Some(&previous), &AlertSettings::disabled(), now);
        assert!(none.is_empty());

        let first_check = evaluate("w1", &snapshot, None, &AlertSettings::default(), now);
        assert!(first_check.iter().all(|a| a.label() != "odds_shift"));
    }

    // ── AlertEngine ────────────────────────────────────────────────

    #[tokio::test]
    async fn all_flags_disabled_yields_nothing() {
        let gateway = FakeGateway::default()
            .with_positions("w1", vec![make_position("m1", 0, 1.0, 50.0)])
            .with_claimable("w1", vec![make_claimable("m1", 2.0)])
            .with_resolutions("w1", vec![make_resolution(true, 2.0)])
            .with_market(make_market("m1", MarketStatus::Active, Duration::hours(1)))
            .with_quotes("m1", vec![vec![50.0, 50.0], vec![90.0, 10.0]]);
        let mut engine = engine(gateway, &["w1"], AlertSettings::disabled());

        assert!(engine.check_wallets().await.is_empty());
        assert!(engine.check_wallets().await.is_empty());
    }

    #[tokio::test]
    async fn claimable_disabled_skips_fetches() {
        let gateway = FakeGateway::default()
            .with_claimable("w1", vec![make_claimable("m1", 2.0)])
            .with_resolutions("w1", vec![make_resolution(true, 2.0)]);
        let settings = AlertSettings {
            claimable: false,
            ..AlertSettings::default()
        };
        let mut engine = engine(gateway, &["w1"], settings);

        assert!(engine.check_wallets().await.is_empty());
        assert_eq!(engine.gateway().called("claimable:"), 0);
        assert_eq!(engine.gateway().called("resolutions:"), 0);
        assert_eq!(engine.gateway().called("positions:"), 1);
    }

    #[tokio::test]
    async fn unclaimed_and_resolved_through_engine() {
        let gateway = FakeGateway::default()
            .with_claimable("w1", vec![make_claimable("m1", 2.5), make_claimable("m2", 1.0)])
            .with_resolutions(
                "w1",
                vec![make_resolution(true, 5.0), make_resolution(false, 5.0)],
            );
        let mut engine = engine(gateway, &["w1"], AlertSettings::default());

        let alerts = engine.check_wallets().await;
        let labels: Vec<&str> = alerts.iter().map(Alert::label).collect();
        assert_eq!(labels, vec!["market_resolved", "unclaimed_winnings"]);
        assert!(alerts[1].message.contains("2 market(s)"));

        // Standing balances re-alert every cycle.
        assert_eq!(engine.check_wallets().await.len(), 2);
    }

    #[tokio::test]
    async fn odds_shift_needs_a_previous_cycle() {
        let gateway = FakeGateway::default()
            .with_positions("w1", vec![make_position("m1", 0, 2.0, 50.0)])
            .with_quotes("m1", vec![vec![50.0, 50.0], vec![70.0, 30.0]]);
        let settings = AlertSettings {
            closing_soon: false,
            ..AlertSettings::default()
        };
        let mut engine = engine(gateway, &["w1"], settings);

        assert!(engine.check_wallets().await.is_empty());
        assert_eq!(engine.cache().get("w1").unwrap().odds["m1"], vec![50.0, 50.0]);

        let alerts = engine.check_wallets().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].label(), "odds_shift");
        assert_eq!(engine.cache().get("w1").unwrap().odds["m1"], vec![70.0, 30.0]);

        // Odds are sticky now, nothing moved.
        assert!(engine.check_wallets().await.is_empty());
    }

    #[tokio::test]
    async fn failed_quote_drops_market_from_snapshot() {
        let gateway = FakeGateway::default()
            .with_positions(
                "w1",
                vec![make_position("m1", 0, 1.0, 50.0), make_position("m2", 0, 1.0, 50.0)],
            )
            .with_quotes("m1", vec![vec![40.0, 60.0]]);
        let mut engine = engine(gateway, &["w1"], AlertSettings::default());

        engine.check_wallets().await;
        let cached = engine.cache().get("w1").unwrap();
        assert_eq!(cached.positions.len(), 2);
        assert!(cached.odds.contains_key("m1"));
        assert!(!cached.odds.contains_key("m2"));
    }

    #[tokio::test]
    async fn closing_soon_status_gate_through_engine() {
        let gateway = FakeGateway::default()
            .with_positions(
                "w1",
                vec![make_position("open", 0, 1.0, 50.0), make_position("shut", 0, 1.0, 50.0)],
            )
            .with_market(make_market("open", MarketStatus::Active, Duration::hours(2)))
            .with_market(make_market("shut", MarketStatus::Closed, Duration::hours(2)));
        let mut engine = engine(gateway, &["w1"], AlertSettings::default());

        let alerts = engine.check_wallets().await;
        assert_eq!(alerts.len(), 1);
        match &alerts[0].kind {
            AlertKind::ClosingSoon(data) => assert_eq!(data.market_id, "open"),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_positions_fetch_market_once() {
        let gateway = FakeGateway::default()
            .with_positions(
                "w1",
                vec![make_position("m1", 0, 1.0, 50.0), make_position("m1", 1, 1.0, 50.0)],
            )
            .with_quotes("m1", vec![vec![50.0, 50.0]]);
        let mut engine = engine(gateway, &["w1"], AlertSettings::default());

        engine.check_wallets().await;
        assert_eq!(engine.gateway().called("quote:m1"), 1);
        assert_eq!(engine.gateway().called("market:m1"), 1);
    }

    #[tokio::test]
    async fn one_failing_wallet_does_not_block_others() {
        let gateway = FakeGateway::default()
            .failing("bad")
            .with_claimable("good", vec![make_claimable("m1", 1.0)]);
        let mut engine = engine(gateway, &["bad", "good"], AlertSettings::default());

        let alerts = engine.check_wallets().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].wallet, "good");
        assert!(engine.cache().get("bad").is_none());
        assert!(engine.cache().get("good").is_some());
    }

    #[tokio::test]
    async fn check_wallet_propagates_fetch_error() {
        let gateway = FakeGateway::default().failing("bad");
        let mut engine = engine(gateway, &[], AlertSettings::default());
        let err = engine.check_wallet("bad").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { .. }));
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn engines_do_not_share_cache() {
        let make = || {
            FakeGateway::default()
                .with_positions("w1", vec![make_position("m1", 0, 1.0, 50.0)])
                .with_quotes("m1", vec![vec![50.0, 50.0], vec![90.0, 10.0]])
        };
        let mut first = engine(make(), &["w1"], AlertSettings::default());
        let mut second = engine(make(), &["w1"], AlertSettings::default());

        first.check_wallets().await;
        assert!(second.cache().is_empty());
        // Second engine's first cycle has no baseline of its own.
        assert!(second.check_wallets().await.is_empty());
    }

    // ── collect_best_effort ────────────────────────────────────────

    #[tokio::test]
    async fn best_effort_keeps_successes() {
        let ids = ["a", "b", "c"];
        let results = collect_best_effort(&ids, |id| async move {
            if id == "b" {
                Err(unavailable("/quote"))
            } else {
                Ok(id.len())
            }
        })
        .await;
        assert_eq!(results.len(), 2);
        assert!(results.contains_key("a"));
        assert!(!results.contains_key("b"));
    }

    #[test]
    fn short_id_takes_last_six() {
        assert_eq!(short_id("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"), "usVFin");
        assert_eq!(short_id("abc"), "abc");
    }
}
