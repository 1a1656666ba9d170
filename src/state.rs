use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{OddsSnapshot, Position};

/// What the engine saw for one wallet on its most recent successful check.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedWalletState {
    pub positions: Vec<Position>,
    /// Only markets whose quote succeeded are present.
    pub odds: OddsSnapshot,
    pub last_check: DateTime<Utc>,
}

/// Per-wallet cache of the previous poll, owned by one engine instance.
///
/// Entries are replaced wholesale; there is no history beyond one prior
/// snapshot and no eviction.
#[derive(Debug, Default)]
pub struct WalletStateCache {
    entries: HashMap<String, CachedWalletState>,
}

impl WalletStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, wallet: &str) -> Option<&CachedWalletState> {
        self.entries.get(wallet)
    }

    /// Store `state` for `wallet`, returning the entry it replaced.
    pub fn replace(
        &mut self,
        wallet: &str,
        state: CachedWalletState,
    ) -> Option<CachedWalletState> {
        self.entries.insert(wallet.to_string(), state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
