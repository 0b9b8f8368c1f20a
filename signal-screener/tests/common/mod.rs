//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};

use signal_common::Config;
use signal_screener::data::{
    Bar, BarSeries, FixedClock, InMemoryProvider, MarketDataProvider, ProviderError, SymbolMeta,
};
use signal_screener::ScreenerState;

/// Thursday; the fixed clock sits in the New York afternoon of this date.
pub fn trading_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 28).unwrap()
}

/// Consecutive daily bars ending on `last`.
pub fn series_ending(symbol: &str, last: NaiveDate, closes: &[f64], volumes: &[f64]) -> BarSeries {
    let start = last - ChronoDuration::days(closes.len() as i64 - 1);
    let bars = closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| Bar {
            date: start + ChronoDuration::days(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume,
        })
        .collect();
    BarSeries::new(symbol, bars)
}

/// `n` closes rising linearly from `from` to `to`, constant volume.
pub fn ramp(symbol: &str, n: usize, from: f64, to: f64, volume: f64) -> BarSeries {
    let step = (to - from) / (n - 1) as f64;
    let closes: Vec<f64> = (0..n).map(|i| from + step * i as f64).collect();
    series_ending(symbol, trading_day(), &closes, &vec![volume; n])
}

/// Three rising names and one falling name, all in `NDX`.
pub fn universe_provider() -> InMemoryProvider {
    InMemoryProvider::new()
        .with_series(ramp("AAA", 80, 10.0, 20.0, 150_000.0))
        .with_series(ramp("BBB", 80, 40.0, 60.0, 80_000.0))
        .with_series(ramp("CCC", 80, 25.0, 32.0, 120_000.0))
        .with_series(ramp("DDD", 80, 90.0, 60.0, 50_000.0))
        .with_meta(SymbolMeta {
            symbol: "AAA".into(),
            name: Some("Alpha Corp".into()),
            sector: Some("Technology".into()),
            market_cap: Some(5.0e9),
        })
        .with_index(
            "NDX",
            vec!["AAA".into(), "BBB".into(), "CCC".into(), "DDD".into()],
        )
}

/// Defaults with fast retries, no throttling, one index and no scheduler.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.market_data.provider = "memory".into();
    config.market_data.requests_per_minute = 600_000;
    config.market_data.max_attempts = 3;
    config.market_data.retry_backoff_ms = 1;
    config.market_data.request_timeout_secs = 5;
    config.screener.refresh_enabled = false;
    config.screener.snapshot_dir = None;
    config.screener.indices = BTreeMap::from([("nasdaq".to_string(), "NDX".to_string())]);
    config
}

pub fn config_with_snapshots(dir: PathBuf) -> Config {
    let mut config = test_config();
    config.screener.snapshot_dir = Some(dir);
    config
}

pub fn state_with(
    config: Config,
    provider: Arc<dyn MarketDataProvider>,
) -> (Arc<ScreenerState>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::on_date(trading_day()));
    let state = ScreenerState::new(config, provider, clock.clone());
    (Arc::new(state), clock)
}

pub fn state(provider: Arc<dyn MarketDataProvider>) -> Arc<ScreenerState> {
    state_with(test_config(), provider).0
}

// ============================================================================
// Instrumented provider
// ============================================================================

/// Wraps an [`InMemoryProvider`] with call counters, per-symbol delays and
/// scripted transient failures.
pub struct InstrumentedProvider {
    inner: InMemoryProvider,
    delays: HashMap<String, Duration>,
    failures: Mutex<HashMap<String, u32>>,
    bar_calls: Mutex<HashMap<String, u32>>,
    constituent_calls: AtomicU32,
}

impl InstrumentedProvider {
    pub fn new(inner: InMemoryProvider) -> Self {
        Self {
            inner,
            delays: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            bar_calls: Mutex::new(HashMap::new()),
            constituent_calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    /// Fail the next `times` bar requests for `symbol` with a recoverable error.
    pub fn failing(self, symbol: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(symbol.to_string(), times);
        self
    }

    pub fn bar_calls(&self, symbol: &str) -> u32 {
        self.bar_calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
    }

    pub fn constituent_calls(&self) -> u32 {
        self.constituent_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for InstrumentedProvider {
    fn name(&self) -> &'static str {
        "instrumented"
    }

    async fn daily_bars(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        *self.bar_calls.lock().unwrap().entry(symbol.to_string()).or_default() += 1;

        if let Some(delay) = self.delays.get(symbol) {
            tokio::time::sleep(*delay).await;
        }

        let fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(symbol) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            return Err(ProviderError::Unavailable("scripted outage".into()));
        }

        self.inner.daily_bars(symbol, from, to).await
    }

    async fn symbol_meta(&self, symbol: &str) -> Result<SymbolMeta, ProviderError> {
        self.inner.symbol_meta(symbol).await
    }

    async fn constituents(&self, index: &str) -> Result<Vec<String>, ProviderError> {
        self.constituent_calls.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers can pile up
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.constituents(index).await
    }
}
