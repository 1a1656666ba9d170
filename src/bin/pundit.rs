//! pundit — post market takes to AgentBook and comment on busy markets.
//!
//! Reads `PUNDIT_WALLET_ADDRESS` and `PUNDIT_PRIVATE_KEY` (a base58 Solana
//! keypair) from the environment (or `.env`). Without a key, prompts for it
//! with hidden input. Use `--private-key` only for scripted/CI use.
//!
//! A missing or invalid key only disables comments; posts still go out.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use baozi_claim_alert::DEFAULT_API_URL;
use baozi_claim_alert::api::BaoziClient;
use baozi_claim_alert::pundit::{Pundit, PunditSettings, signer_from_key};

#[derive(Parser)]
#[command(name = "pundit", about = "AgentBook market analyst for Baozi")]
struct Cli {
    /// Wallet address the posts are published under
    #[arg(long)]
    wallet_address: Option<String>,

    /// Solana secret key: base58 keypair, or the JSON byte array from
    /// solana-keygen. If omitted and PUNDIT_PRIVATE_KEY is unset, reads
    /// interactively.
    #[arg(long)]
    private_key: Option<String>,

    /// Baozi API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Minutes between AgentBook posts
    #[arg(long)]
    post_cooldown: Option<i64>,

    /// Minutes between comments on the same market
    #[arg(long)]
    comment_cooldown: Option<i64>,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn cooldown_minutes(flag: Option<i64>, key: &str, default: i64) -> Result<i64> {
    let minutes = match flag {
        Some(m) => m,
        None => match env_var(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a whole number of minutes"))?,
            None => default,
        },
    };
    if minutes < 0 {
        bail!("{key} must not be negative");
    }
    Ok(minutes)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let private_key = match cli.private_key.or_else(|| env_var("PUNDIT_PRIVATE_KEY")) {
        Some(key) => key,
        None => rpassword::prompt_password("Enter private key (base58, empty to skip): ")
            .context("failed to read private key")?,
    };
    let signer = signer_from_key(Some(private_key.as_str()));
    if signer.is_none() {
        warn!("No usable signing key; posting without comments");
    }

    let wallet_address = match cli
        .wallet_address
        .or_else(|| env_var("PUNDIT_WALLET_ADDRESS"))
    {
        Some(address) => address,
        None => match &signer {
            Some(signer) => signer.address(),
            None => bail!("PUNDIT_WALLET_ADDRESS (or --wallet-address) is required"),
        },
    };
    if let Some(signer) = &signer
        && signer.address() != wallet_address
    {
        warn!("Signing key does not belong to {wallet_address}; comments may be rejected");
    }

    let api_url = cli
        .api_url
        .or_else(|| env_var("BAOZI_API_URL"))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    url::Url::parse(&api_url).with_context(|| format!("invalid api url {api_url:?}"))?;

    let settings = PunditSettings {
        wallet_address,
        post_cooldown: chrono::Duration::minutes(cooldown_minutes(
            cli.post_cooldown,
            "PUNDIT_POST_COOLDOWN",
            30,
        )?),
        comment_cooldown: chrono::Duration::minutes(cooldown_minutes(
            cli.comment_cooldown,
            "PUNDIT_COMMENT_COOLDOWN",
            60,
        )?),
    };

    let client = BaoziClient::new(&api_url, Duration::from_secs(15))?;
    let mut pundit = Pundit::new(client, signer, settings);

    info!("Running market analysis against {api_url}...");
    let summary = pundit.run_analysis().await?;
    info!(
        "Analysis complete: markets={} analyses={} posts={} comments={}",
        summary.markets, summary.analyses, summary.posts, summary.comments,
    );
    info!("View posts at: https://baozi.bet/agentbook");
    Ok(())
}
