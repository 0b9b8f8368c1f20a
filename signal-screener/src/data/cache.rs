//! Bar cache scoped to a trading date.
//!
//! Daily bars for a given as-of date never change, so entries stay valid for
//! the whole trading date and are dropped wholesale when the date rolls over.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::{BarSeries, SymbolMeta};

#[derive(Debug, Default)]
struct CacheState {
    trading_date: Option<NaiveDate>,
    bars: HashMap<String, Arc<BarSeries>>,
    meta: HashMap<String, SymbolMeta>,
}

impl CacheState {
    /// Reset the state when `date` differs from the cached trading date.
    fn roll_to(&mut self, date: NaiveDate) {
        if self.trading_date != Some(date) {
            self.bars.clear();
            self.meta.clear();
            self.trading_date = Some(date);
        }
    }
}

/// Market data cache
#[derive(Debug, Default)]
pub struct BarCache {
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct BarCacheStats {
    pub trading_date: Option<NaiveDate>,
    pub series: usize,
    pub meta: usize,
    pub hits: u64,
    pub misses: u64,
}

impl BarCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get cached bars for `symbol` if they were stored for `date`.
    pub fn get_bars(&self, symbol: &str, date: NaiveDate) -> Option<Arc<BarSeries>> {
        let found = self.state.read().ok().and_then(|state| {
            if state.trading_date == Some(date) {
                state.bars.get(symbol).cloned()
            } else {
                None
            }
        });
        self.record(found.is_some());
        found
    }

    /// Cache bars for `symbol` under `date`, evicting everything from older dates.
    pub fn put_bars(&self, symbol: &str, date: NaiveDate, series: Arc<BarSeries>) {
        if let Ok(mut state) = self.state.write() {
            state.roll_to(date);
            state.bars.insert(symbol.to_string(), series);
        }
    }

    pub fn get_meta(&self, symbol: &str, date: NaiveDate) -> Option<SymbolMeta> {
        let found = self.state.read().ok().and_then(|state| {
            if state.trading_date == Some(date) {
                state.meta.get(symbol).cloned()
            } else {
                None
            }
        });
        self.record(found.is_some());
        found
    }

    pub fn put_meta(&self, date: NaiveDate, meta: SymbolMeta) {
        if let Ok(mut state) = self.state.write() {
            state.roll_to(date);
            state.meta.insert(meta.symbol.clone(), meta);
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> BarCacheStats {
        let (trading_date, series, meta) = self
            .state
            .read()
            .map(|s| (s.trading_date, s.bars.len(), s.meta.len()))
            .unwrap_or((None, 0, 0));

        BarCacheStats {
            trading_date,
            series,
            meta,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::ramp;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_hit_on_same_date() {
        let cache = BarCache::new();
        cache.put_bars("AAPL", day(3), Arc::new(ramp("AAPL", 5, 1.0, 2.0, 10.0)));

        assert!(cache.get_bars("AAPL", day(3)).is_some());
        assert!(cache.get_bars("MSFT", day(3)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_rollover_evicts_previous_date() {
        let cache = BarCache::new();
        cache.put_bars("AAPL", day(3), Arc::new(ramp("AAPL", 5, 1.0, 2.0, 10.0)));
        cache.put_meta(day(3), SymbolMeta::bare("AAPL"));

        assert!(cache.get_bars("AAPL", day(4)).is_none());

        cache.put_bars("MSFT", day(4), Arc::new(ramp("MSFT", 5, 1.0, 2.0, 10.0)));
        assert!(cache.get_bars("AAPL", day(3)).is_none());
        assert!(cache.get_meta("AAPL", day(4)).is_none());
        assert_eq!(cache.stats().series, 1);
        assert_eq!(cache.stats().trading_date, Some(day(4)));
    }
}
