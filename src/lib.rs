pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod pundit;
pub mod reporter;
pub mod state;
pub mod types;

/// Baozi REST API base URL (public, no auth required for reads)
pub const DEFAULT_API_URL: &str = "https://baozi.bet/api";

/// Where users claim winnings; quoted in alert messages.
pub const CLAIM_URL: &str = "baozi.bet/my-bets";
