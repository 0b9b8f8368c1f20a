//! In-memory market data provider.
//!
//! Serves bars, metadata, index membership and research documents from
//! memory. Used for offline runs (loaded from a JSON fixture) and as the
//! provider in tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use signal_common::{Error as CommonError, ResultExt};

use super::{Bar, BarSeries, MarketDataProvider, ProviderError, ResearchKind, SymbolMeta};

/// Fixture file layout.
#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    symbols: Vec<FixtureSymbol>,
    /// Index ticker → constituent tickers
    #[serde(default)]
    indices: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct FixtureSymbol {
    symbol: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    bars: Vec<Bar>,
}

#[derive(Debug, Default)]
struct Store {
    bars: HashMap<String, Vec<Bar>>,
    meta: HashMap<String, SymbolMeta>,
    indices: HashMap<String, Vec<String>>,
    research: HashMap<(ResearchKind, Option<String>), serde_json::Value>,
}

/// Provider backed by in-process maps.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    store: RwLock<Store>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON fixture of symbols (with bars) and index memberships.
    pub fn from_fixture(path: &Path) -> signal_common::Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("reading fixture {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&content)
            .context(format!("parsing fixture {}", path.display()))?;

        let provider = Self::new();
        for entry in fixture.symbols {
            let symbol = entry.symbol.to_uppercase();
            provider.insert_meta(SymbolMeta {
                symbol: symbol.clone(),
                name: entry.name,
                sector: entry.sector,
                market_cap: entry.market_cap,
            });
            provider.insert_series(BarSeries::new(symbol, entry.bars));
        }
        for (index, members) in fixture.indices {
            provider.insert_index(&index, members);
        }

        if provider.symbol_count() == 0 {
            return Err(CommonError::InvalidInput(format!(
                "fixture {} contains no symbols",
                path.display()
            )));
        }
        Ok(provider)
    }

    pub fn with_series(self, series: BarSeries) -> Self {
        self.insert_series(series);
        self
    }

    pub fn with_meta(self, meta: SymbolMeta) -> Self {
        self.insert_meta(meta);
        self
    }

    pub fn with_index(self, index: &str, members: Vec<String>) -> Self {
        self.insert_index(index, members);
        self
    }

    /// Serve `data` for `kind`; `symbol` is `None` for market-wide documents.
    pub fn with_research(self, kind: ResearchKind, symbol: Option<&str>, data: serde_json::Value) -> Self {
        if let Ok(mut store) = self.store.write() {
            store.research.insert((kind, symbol.map(String::from)), data);
        }
        self
    }

    pub fn insert_series(&self, series: BarSeries) {
        if let Ok(mut store) = self.store.write() {
            store
                .bars
                .insert(series.symbol().to_string(), series.bars().to_vec());
        }
    }

    pub fn insert_meta(&self, meta: SymbolMeta) {
        if let Ok(mut store) = self.store.write() {
            store.meta.insert(meta.symbol.clone(), meta);
        }
    }

    pub fn insert_index(&self, index: &str, members: Vec<String>) {
        if let Ok(mut store) = self.store.write() {
            store.indices.insert(index.to_string(), members);
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.store.read().map(|s| s.bars.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Store>, ProviderError> {
        self.store
            .read()
            .map_err(|_| ProviderError::Internal("store lock poisoned".into()))
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn daily_bars(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        let store = self.read()?;
        let bars = store
            .bars
            .get(symbol)
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("unknown symbol {}", symbol)))?;

        Ok(bars
            .iter()
            .filter(|b| b.date >= from && b.date <= to)
            .copied()
            .collect())
    }

    async fn symbol_meta(&self, symbol: &str) -> Result<SymbolMeta, ProviderError> {
        let store = self.read()?;
        store
            .meta
            .get(symbol)
            .cloned()
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no metadata for {}", symbol)))
    }

    async fn constituents(&self, index: &str) -> Result<Vec<String>, ProviderError> {
        let store = self.read()?;
        store
            .indices
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("unknown index {}", index)))
    }

    async fn research(
        &self,
        kind: ResearchKind,
        symbol: Option<&str>,
    ) -> Result<serde_json::Value, ProviderError> {
        let store = self.read()?;
        store
            .research
            .get(&(kind, symbol.map(String::from)))
            .cloned()
            .ok_or_else(|| {
                ProviderError::DataNotAvailable(format!(
                    "no {} for {}",
                    kind,
                    symbol.unwrap_or("market")
                ))
            })
    }
}
