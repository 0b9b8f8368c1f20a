//! Screening orchestrator.
//!
//! Runs the per-symbol pipeline across a universe with a bounded worker
//! pool. A permit is taken from the pool before each task is spawned, so
//! submission waits while the pool is saturated. Results are collected and
//! then sorted, which makes the output independent of completion order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use signal_common::config::Config;

use crate::analysis::SymbolAnalysis;
use crate::data::{MarketDataFetcher, SymbolMeta, Universe};
use crate::error::{Result, ScreenerError};
use crate::indicators::{KeyLevels, VolumeMetrics};
use crate::market::{ReferenceData, RelativeStrength};
use crate::patterns::PatternMatch;
use crate::scoring::Score;

use super::filter::ScreenFilter;

// ============================================================================
// Screen Entry
// ============================================================================

/// A symbol that passed every filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenEntry {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub price: f64,
    pub volume: f64,
    pub market_cap: Option<f64>,
    pub patterns: PatternMatch,
    pub score: Score,
    pub volume_metrics: Option<VolumeMetrics>,
    pub atr: Option<f64>,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub nearest_support: Option<f64>,
    pub nearest_resistance: Option<f64>,
    pub key_levels: KeyLevels,
    pub relative_strength: RelativeStrength,
}

impl ScreenEntry {
    fn new(meta: SymbolMeta, analysis: SymbolAnalysis) -> Self {
        Self {
            symbol: analysis.symbol,
            name: meta.name,
            sector: meta.sector,
            price: analysis.price,
            volume: analysis.volume,
            market_cap: meta.market_cap,
            patterns: analysis.patterns,
            score: analysis.score,
            volume_metrics: analysis.indicators.volume,
            atr: analysis.indicators.atr,
            sma20: analysis.indicators.sma20,
            sma50: analysis.indicators.sma50,
            nearest_support: analysis.key_levels.nearest_support(),
            nearest_resistance: analysis.key_levels.nearest_resistance(),
            key_levels: analysis.key_levels,
            relative_strength: analysis.relative_strength,
        }
    }
}

/// A symbol that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

// ============================================================================
// Screen Result
// ============================================================================

/// Ordered screening output with scan metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenResult {
    pub scan_id: String,
    /// Sorted by score descending, then symbol ascending
    pub entries: Vec<ScreenEntry>,
    pub as_of: NaiveDate,
    pub universe: Universe,
    pub filter: ScreenFilter,
    pub served_from_cache: bool,
    pub scanned: usize,
    pub filtered_out: usize,
    pub skipped_count: usize,
    /// Sorted by symbol
    pub skipped: Vec<SkippedSymbol>,
    pub computed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScreenResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of this result keeping only the first `n` entries.
    pub fn top(&self, n: usize) -> Self {
        let mut top = self.clone();
        top.entries.truncate(n);
        top
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Screened {} symbols in {:.1}s: {} passed, {} filtered out, {} skipped",
            self.scanned,
            self.duration_ms as f64 / 1000.0,
            self.entries.len(),
            self.filtered_out,
            self.skipped_count
        )
    }
}

/// Score descending, ties by symbol ascending.
pub fn sort_entries(entries: &mut [ScreenEntry]) {
    entries.sort_by(|a, b| {
        b.score
            .value
            .total_cmp(&a.score.value)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}

enum SymbolOutcome {
    Passed(Box<ScreenEntry>),
    FilteredOut,
    Skipped(String),
}

// ============================================================================
// Screener Engine
// ============================================================================

/// Screening orchestrator.
#[derive(Clone)]
pub struct ScreenerEngine {
    fetcher: Arc<MarketDataFetcher>,
    config: Arc<Config>,
    symbol_timeout: Duration,
    scan_timeout: Duration,
}

impl ScreenerEngine {
    pub fn new(fetcher: Arc<MarketDataFetcher>, config: Arc<Config>) -> Self {
        let symbol_timeout = Duration::from_secs(config.screener.symbol_timeout_secs);
        let scan_timeout = Duration::from_secs(config.screener.scan_timeout_secs);
        Self {
            fetcher,
            config,
            symbol_timeout,
            scan_timeout,
        }
    }

    /// Override the per-symbol and whole-scan deadlines.
    pub fn with_timeouts(mut self, symbol_timeout: Duration, scan_timeout: Duration) -> Self {
        self.symbol_timeout = symbol_timeout;
        self.scan_timeout = scan_timeout;
        self
    }

    pub fn fetcher(&self) -> &Arc<MarketDataFetcher> {
        &self.fetcher
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Symbols in a universe, sorted and de-duplicated.
    ///
    /// `All` is the union of every configured index; an index that fails to
    /// load is skipped unless all of them fail.
    pub async fn resolve_universe(&self, universe: &Universe) -> Result<Vec<String>> {
        match universe {
            Universe::Symbol(symbol) => Ok(vec![symbol.clone()]),
            Universe::Index(name) => {
                let ticker = self
                    .config
                    .screener
                    .indices
                    .get(name)
                    .ok_or_else(|| ScreenerError::NotFound(format!("index '{}'", name)))?;
                let members: BTreeSet<String> =
                    self.fetcher.constituents(ticker).await?.into_iter().collect();
                Ok(members.into_iter().collect())
            }
            Universe::All => {
                let mut members = BTreeSet::new();
                let mut last_error = None;
                let mut loaded = 0usize;
                for (name, ticker) in &self.config.screener.indices {
                    match self.fetcher.constituents(ticker).await {
                        Ok(symbols) => {
                            loaded += 1;
                            members.extend(symbols);
                        }
                        Err(e) => {
                            warn!(index = %name, error = %e, "Index constituents unavailable");
                            last_error = Some(e);
                        }
                    }
                }
                match last_error {
                    Some(e) if loaded == 0 => Err(e),
                    _ => Ok(members.into_iter().collect()),
                }
            }
        }
    }

    /// Screen `universe` as of `as_of`.
    pub async fn run(
        &self,
        universe: &Universe,
        filter: &ScreenFilter,
        as_of: NaiveDate,
    ) -> Result<ScreenResult> {
        filter.validate()?;
        match tokio::time::timeout(self.scan_timeout, self.scan(universe, filter, as_of)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(universe = %universe, timeout_secs = self.scan_timeout.as_secs(), "Scan timed out");
                Err(ScreenerError::Timeout(format!(
                    "scan of '{}' exceeded {}s",
                    universe,
                    self.scan_timeout.as_secs()
                )))
            }
        }
    }

    async fn scan(
        &self,
        universe: &Universe,
        filter: &ScreenFilter,
        as_of: NaiveDate,
    ) -> Result<ScreenResult> {
        let started = Instant::now();
        let computed_at = Utc::now();
        let scan_id = format!("scan_{}", computed_at.format("%Y%m%d_%H%M%S"));

        let symbols = self.resolve_universe(universe).await?;
        info!(
            scan_id = %scan_id,
            universe = %universe,
            symbols = symbols.len(),
            %as_of,
            "Starting screen"
        );

        let reference =
            Arc::new(ReferenceData::load(&self.fetcher, &self.config.market_data, as_of).await);
        let filter_arc = Arc::new(filter.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.screener.max_concurrency.max(1)));
        let mut pending: BTreeSet<String> = symbols.iter().cloned().collect();
        let mut tasks = JoinSet::new();

        for symbol in symbols {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| ScreenerError::Internal(format!("worker pool closed: {}", e)))?;
            let engine = self.clone();
            let filter = Arc::clone(&filter_arc);
            let reference = Arc::clone(&reference);

            tasks.spawn(async move {
                let _permit = permit;
                let outcome = match tokio::time::timeout(
                    engine.symbol_timeout,
                    engine.evaluate(&symbol, &filter, &reference, as_of),
                )
                .await
                {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => SymbolOutcome::Skipped(e.to_string()),
                    Err(_) => SymbolOutcome::Skipped(format!(
                        "timed out after {}ms",
                        engine.symbol_timeout.as_millis()
                    )),
                };
                (symbol, outcome)
            });
        }

        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        let mut filtered_out = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, outcome)) => {
                    pending.remove(&symbol);
                    match outcome {
                        SymbolOutcome::Passed(entry) => entries.push(*entry),
                        SymbolOutcome::FilteredOut => filtered_out += 1,
                        SymbolOutcome::Skipped(reason) => {
                            debug!(symbol = %symbol, reason = %reason, "Symbol skipped");
                            skipped.push(SkippedSymbol { symbol, reason });
                        }
                    }
                }
                Err(e) => warn!(scan_id = %scan_id, error = %e, "Symbol task failed"),
            }
        }

        // Tasks that panicked never reported back
        skipped.extend(pending.into_iter().map(|symbol| SkippedSymbol {
            symbol,
            reason: "evaluation task failed".to_string(),
        }));

        sort_entries(&mut entries);
        skipped.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let scanned = entries.len() + filtered_out + skipped.len();
        let result = ScreenResult {
            scan_id,
            entries,
            as_of,
            universe: universe.clone(),
            filter: filter.clone(),
            served_from_cache: false,
            scanned,
            filtered_out,
            skipped_count: skipped.len(),
            skipped,
            computed_at,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            scan_id = %result.scan_id,
            passed = result.entries.len(),
            filtered_out = result.filtered_out,
            skipped = result.skipped_count,
            "{}",
            result.summary()
        );
        Ok(result)
    }

    /// Numeric filters run before any pattern evaluation.
    async fn evaluate(
        &self,
        symbol: &str,
        filter: &ScreenFilter,
        reference: &ReferenceData,
        as_of: NaiveDate,
    ) -> Result<SymbolOutcome> {
        let meta = self.fetcher.meta(symbol, as_of).await?;
        if !filter.passes_market_cap(meta.market_cap) {
            return Ok(SymbolOutcome::FilteredOut);
        }

        let series = self.fetcher.bars(symbol, as_of).await?;
        let Some(last) = series.last() else {
            return Err(ScreenerError::data_unavailable(symbol, "no bars"));
        };
        if !filter.passes_price_volume(last.close, last.volume) {
            return Ok(SymbolOutcome::FilteredOut);
        }

        let analysis = SymbolAnalysis::run(
            &series,
            meta.sector.as_deref(),
            reference,
            &self.config.analysis,
        )?;
        if !filter.passes_patterns(&analysis.patterns) {
            return Ok(SymbolOutcome::FilteredOut);
        }

        Ok(SymbolOutcome::Passed(Box::new(ScreenEntry::new(meta, analysis))))
    }
}
