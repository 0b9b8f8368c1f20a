//! Market data fetcher.
//!
//! Wraps a `MarketDataProvider` with:
//! - a token-bucket rate limiter shared by all calls
//! - a per-call timeout
//! - bounded retries with exponential backoff on transient errors
//! - a bar/metadata cache scoped to the trading date

use chrono::{Duration as ChronoDuration, NaiveDate};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use signal_common::config::MarketDataConfig;

use super::{
    shared_limiter, BarCache, BarCacheStats, BarSeries, MarketDataProvider, ProviderError,
    ResearchKind, SharedRateLimiter, SymbolMeta,
};
use crate::error::{Result, ScreenerError};

/// Longest delay between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry and timeout policy for provider calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_backoff: Duration,
    /// Deadline for a single attempt
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &MarketDataConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Delay after the given failed attempt (1-based).
    fn backoff(&self, attempt: u32, err: &ProviderError) -> Duration {
        if let ProviderError::RateLimited {
            retry_after_secs: Some(secs),
        } = err
        {
            return Duration::from_secs(*secs).min(MAX_BACKOFF);
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Rate-limited, retrying, caching front for a market data provider.
pub struct MarketDataFetcher {
    provider: Arc<dyn MarketDataProvider>,
    limiter: SharedRateLimiter,
    cache: BarCache,
    retry: RetryPolicy,
    history_days: u32,
}

impl MarketDataFetcher {
    /// Create a fetcher using the market data configuration.
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: &MarketDataConfig) -> Self {
        let limiter = shared_limiter(provider.name(), config.requests_per_minute);
        Self::with_policy(
            provider,
            limiter,
            RetryPolicy::from_config(config),
            config.history_days,
        )
    }

    pub fn with_policy(
        provider: Arc<dyn MarketDataProvider>,
        limiter: SharedRateLimiter,
        retry: RetryPolicy,
        history_days: u32,
    ) -> Self {
        Self {
            provider,
            limiter,
            cache: BarCache::new(),
            retry,
            history_days,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Daily bars for `symbol` up to and including `as_of`.
    ///
    /// An empty history is `DataUnavailable`, never an empty series.
    pub async fn bars(&self, symbol: &str, as_of: NaiveDate) -> Result<Arc<BarSeries>> {
        if let Some(series) = self.cache.get_bars(symbol, as_of) {
            return Ok(series);
        }

        let from = as_of - ChronoDuration::days(i64::from(self.history_days));
        let bars = self
            .call("daily_bars", symbol, || {
                self.provider.daily_bars(symbol, from, as_of)
            })
            .await?;

        let series = BarSeries::new(symbol, bars).as_of(as_of);
        if series.is_empty() {
            return Err(ScreenerError::data_unavailable(symbol, "no bars returned"));
        }

        let series = Arc::new(series);
        self.cache.put_bars(symbol, as_of, Arc::clone(&series));
        Ok(series)
    }

    /// Static metadata for `symbol`. Missing reference data degrades to a
    /// bare record instead of failing.
    pub async fn meta(&self, symbol: &str, as_of: NaiveDate) -> Result<SymbolMeta> {
        if let Some(meta) = self.cache.get_meta(symbol, as_of) {
            return Ok(meta);
        }

        let meta = match self
            .call("symbol_meta", symbol, || self.provider.symbol_meta(symbol))
            .await
        {
            Ok(meta) => meta,
            Err(ScreenerError::DataUnavailable { .. }) => {
                debug!(symbol, "No reference data, using bare metadata");
                SymbolMeta::bare(symbol)
            }
            Err(e) => return Err(e),
        };

        self.cache.put_meta(as_of, meta.clone());
        Ok(meta)
    }

    /// Constituents of a provider index ticker.
    pub async fn constituents(&self, index: &str) -> Result<Vec<String>> {
        self.call("constituents", index, || self.provider.constituents(index))
            .await
    }

    /// Research document straight from the provider, never cached.
    pub async fn research(
        &self,
        kind: ResearchKind,
        symbol: Option<&str>,
    ) -> Result<serde_json::Value> {
        let subject = symbol.unwrap_or(kind.as_str());
        self.call(kind.as_str(), subject, || self.provider.research(kind, symbol))
            .await
    }

    pub fn cache_stats(&self) -> BarCacheStats {
        self.cache.stats()
    }

    /// Run `op` under the rate limiter, timeout and retry policy.
    async fn call<T, F, Fut>(&self, operation: &str, subject: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let outcome = match tokio::time::timeout(self.retry.request_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Network(format!(
                    "request timed out after {:?}",
                    self.retry.request_timeout
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt, &e);
                    debug!(
                        provider = self.provider.name(),
                        operation,
                        subject,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_recoverable() {
                        warn!(
                            provider = self.provider.name(),
                            operation,
                            subject,
                            attempts = attempt,
                            error = %e,
                            "Provider request failed after retries"
                        );
                    }
                    return Err(self.map_error(subject, e));
                }
            }
        }
    }

    fn map_error(&self, subject: &str, err: ProviderError) -> ScreenerError {
        match err {
            ProviderError::DataNotAvailable(reason) | ProviderError::InvalidRequest(reason) => {
                ScreenerError::data_unavailable(subject, reason)
            }
            ProviderError::RateLimited { retry_after_secs } => {
                ScreenerError::RateLimited { retry_after_secs }
            }
            other => {
                ScreenerError::ProviderUnavailable(format!("{}: {}", self.provider.name(), other))
            }
        }
    }
}
