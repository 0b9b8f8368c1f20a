//! Market data module for US equities.
//!
//! Provides daily bar types, the provider abstraction, and the fetcher that
//! wraps a provider with rate limiting, retries and a per-trading-date cache.
//!
//! # Data Sources
//! - **Polygon** (primary): REST aggregates, ticker reference data, index constituents
//! - **Memory**: fixture-backed provider for offline runs and tests
//!
//! Research documents (fundamentals, earnings, news, open interest) are
//! passed through from the provider without caching.

mod cache;
mod calendar;
mod fetcher;
mod memory;
mod polygon;
mod provider;
mod rate_limiter;
mod research;

pub use cache::{BarCache, BarCacheStats};
pub use calendar::{trading_date_at, Clock, FixedClock, SharedClock, SystemClock};
pub use fetcher::{MarketDataFetcher, RetryPolicy};
pub use memory::InMemoryProvider;
pub use polygon::PolygonProvider;
pub use provider::{MarketDataProvider, ProviderError};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use research::{ResearchDocument, ResearchKind};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Core Data Types
// ============================================================================

/// One daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Get the full range (high - low)
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True range relative to the previous close
    pub fn true_range(&self, prev_close: f64) -> f64 {
        self.range()
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }
}

/// Ordered daily bars for one symbol, ascending by date.
///
/// Construction sorts by date and keeps the last bar seen for a duplicated
/// date. Gaps (holidays, halts) are tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        // dedup_by keeps the first of a run; reverse so the latest wins
        bars.reverse();
        bars.dedup_by_key(|b| b.date);
        bars.reverse();
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Bars on or before `date`.
    pub fn as_of(&self, date: NaiveDate) -> BarSeries {
        let end = self.bars.partition_point(|b| b.date <= date);
        Self {
            symbol: self.symbol.clone(),
            bars: self.bars[..end].to_vec(),
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Percent change of the close over the last `bars` bars.
    pub fn return_pct(&self, bars: usize) -> Option<f64> {
        let n = self.bars.len();
        if bars == 0 || n <= bars {
            return None;
        }
        let start = self.bars[n - 1 - bars].close;
        let end = self.bars[n - 1].close;
        (start > 0.0).then(|| (end - start) / start * 100.0)
    }
}

/// Static metadata for a symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolMeta {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

impl SymbolMeta {
    pub fn bare(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Universe
// ============================================================================

/// The set of symbols a screen runs over.
///
/// Textual form: `all`, `index:<name>` (e.g. `index:nasdaq`) or a ticker
/// (optionally `symbol:<ticker>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Universe {
    Symbol(String),
    Index(String),
    All,
}

impl Default for Universe {
    fn default() -> Self {
        Self::All
    }
}

impl fmt::Display for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(s) => write!(f, "{}", s),
            Self::Index(name) => write!(f, "index:{}", name),
            Self::All => write!(f, "all"),
        }
    }
}

impl FromStr for Universe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("universe must not be empty".into());
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if let Some(name) = s.strip_prefix("index:") {
            if name.is_empty() {
                return Err("index name must not be empty".into());
            }
            return Ok(Self::Index(name.to_lowercase()));
        }
        let ticker = s.strip_prefix("symbol:").unwrap_or(s);
        if ticker.is_empty() || ticker.chars().any(char::is_whitespace) {
            return Err(format!("invalid ticker '{}'", ticker));
        }
        Ok(Self::Symbol(ticker.to_uppercase()))
    }
}

impl TryFrom<String> for Universe {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Universe> for String {
    fn from(value: Universe) -> Self {
        value.to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bar(date: NaiveDate, close: f64) -> Bar {
        Bar {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_series_sorted_and_deduplicated() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let series = BarSeries::new(
            "AAPL",
            vec![bar(d + Duration::days(2), 3.0), bar(d, 1.0), bar(d, 1.5)],
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars()[0].date, d);
        assert_eq!(series.bars()[0].close, 1.5);
        assert_eq!(series.last_date(), Some(d + Duration::days(2)));
    }

    #[test]
    fn test_as_of_truncates() {
        let series = test_support::ramp("AAPL", 10, 1.0, 10.0, 100.0);
        let cutoff = series.bars()[4].date;
        let truncated = series.as_of(cutoff);
        assert_eq!(truncated.len(), 5);
        assert_eq!(truncated.last_date(), Some(cutoff));
    }

    #[test]
    fn test_return_pct() {
        let series = test_support::ramp("AAPL", 3, 100.0, 110.0, 1.0);
        assert!((series.return_pct(2).unwrap() - 10.0).abs() < 1e-9);
        assert!(series.return_pct(3).is_none());
    }

    #[test]
    fn test_true_range_uses_gap() {
        let b = Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 12.0,
            high: 12.5,
            low: 11.8,
            close: 12.2,
            volume: 1.0,
        };
        assert!((b.true_range(10.0) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_universe_parsing() {
        assert_eq!("all".parse::<Universe>().unwrap(), Universe::All);
        assert_eq!(
            "index:NASDAQ".parse::<Universe>().unwrap(),
            Universe::Index("nasdaq".into())
        );
        assert_eq!("aapl".parse::<Universe>().unwrap(), Universe::Symbol("AAPL".into()));
        assert_eq!(
            "symbol:dow".parse::<Universe>().unwrap(),
            Universe::Symbol("DOW".into())
        );
        assert!("".parse::<Universe>().is_err());
        assert!("index:".parse::<Universe>().is_err());
    }

    #[test]
    fn test_universe_serde_as_string() {
        let json = serde_json::to_string(&Universe::Index("sp500".into())).unwrap();
        assert_eq!(json, "\"index:sp500\"");
        let parsed: Universe = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(parsed, Universe::All);
    }
}
