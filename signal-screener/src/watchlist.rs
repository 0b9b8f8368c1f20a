//! In-memory watchlist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{Result, ScreenerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub added_at: DateTime<Utc>,
}

/// Normalize a ticker: trimmed, upper case, no whitespace.
pub fn normalize_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() || symbol.len() > 16 || symbol.chars().any(char::is_whitespace) {
        return Err(ScreenerError::InvalidSymbol(format!("'{}'", symbol)));
    }
    Ok(symbol.to_uppercase())
}

#[derive(Default)]
pub struct Watchlist {
    entries: RwLock<BTreeMap<String, WatchlistEntry>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol. Adding a symbol already present keeps the original entry.
    pub async fn add(&self, symbol: &str) -> Result<WatchlistEntry> {
        let symbol = normalize_symbol(symbol)?;
        let mut entries = self.entries.write().await;
        let entry = entries.entry(symbol.clone()).or_insert_with(|| WatchlistEntry {
            symbol,
            added_at: Utc::now(),
        });
        Ok(entry.clone())
    }

    /// Entries ordered by symbol.
    pub async fn list(&self) -> Vec<WatchlistEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn remove(&self, symbol: &str) -> Result<()> {
        let symbol = normalize_symbol(symbol)?;
        self.entries
            .write()
            .await
            .remove(&symbol)
            .map(|_| ())
            .ok_or_else(|| ScreenerError::NotFound(format!("{} is not on the watchlist", symbol)))
    }
}
