//! Probe: fetch one wallet's positions, claimable winnings, resolutions and
//! quotes from the Baozi API and print them as JSON.
//!
//! Useful for checking what the alert engine will see for a wallet.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use baozi_claim_alert::DEFAULT_API_URL;
use baozi_claim_alert::api::{BaoziClient, MarketGateway};
use baozi_claim_alert::config::AlertSettings;
use baozi_claim_alert::engine::collect_snapshot;

#[derive(Parser)]
#[command(name = "probe_wallet", about = "Dump what the alert engine sees for a wallet")]
struct Args {
    /// Wallet address to inspect
    wallet: String,

    /// Baozi API base URL
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = BaoziClient::new(&args.api_url, Duration::from_secs(15))?;

    println!("=== Wallet {} ===\n", args.wallet);

    let snapshot = collect_snapshot(&client, &args.wallet, &AlertSettings::default()).await?;

    println!("--- Positions ({}) ---", snapshot.positions.len());
    println!("{}", serde_json::to_string_pretty(&snapshot.positions)?);

    println!("\n--- Claimable ({}) ---", snapshot.claimable.len());
    println!("{}", serde_json::to_string_pretty(&snapshot.claimable)?);

    println!("\n--- Resolutions ({}) ---", snapshot.resolutions.len());
    println!("{}", serde_json::to_string_pretty(&snapshot.resolutions)?);

    println!("\n--- Quotes ({}) ---", snapshot.odds.len());
    for (market_id, odds) in &snapshot.odds {
        println!("{market_id}: {odds:?}");
    }

    println!("\n--- Markets ({}) ---", snapshot.markets.len());
    for market in snapshot.markets.values() {
        let closes = market
            .closing_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{} [{}] closes {closes}: {}",
            market.id,
            market.status.as_str(),
            market.question
        );
    }

    let missing: Vec<&str> = snapshot
        .positions
        .iter()
        .map(|p| p.market_id.as_str())
        .filter(|id| !snapshot.odds.contains_key(*id))
        .collect();
    for market_id in missing {
        if let Err(e) = client.quote(market_id).await {
            println!("quote {market_id} failed: {e}");
        }
    }

    Ok(())
}
