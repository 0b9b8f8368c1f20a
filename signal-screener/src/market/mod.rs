//! Relative strength, beta and market regime.
//!
//! Reference series (benchmark, sector ETFs, volatility index) are loaded once
//! per scan into [`ReferenceData`]; everything else here is pure computation
//! over bar series.

mod regime;

pub use regime::{classify_regime, BreadthMetrics, MarketContext, MarketRegime, SectorPerformance};

use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use signal_common::config::{MarketDataConfig, RelativeStrengthConfig};

use crate::data::{BarSeries, MarketDataFetcher};

// ============================================================================
// Relative Strength
// ============================================================================

/// Symbol performance against its benchmark and sector over the RS window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelativeStrength {
    /// Window length in bars
    pub window: usize,
    pub symbol_return: Option<f64>,
    pub benchmark_return: Option<f64>,
    pub sector_return: Option<f64>,
    /// Symbol return minus benchmark return (percentage points)
    pub vs_benchmark: Option<f64>,
    /// Symbol return minus sector return (percentage points)
    pub vs_sector: Option<f64>,
    pub beta: Option<f64>,
}

impl RelativeStrength {
    pub fn compute(
        symbol: &BarSeries,
        benchmark: Option<&BarSeries>,
        sector: Option<&BarSeries>,
        config: &RelativeStrengthConfig,
    ) -> Self {
        let symbol_return = symbol.return_pct(config.window);
        let benchmark_return = benchmark.and_then(|b| b.return_pct(config.window));
        let sector_return = sector.and_then(|s| s.return_pct(config.window));
        let diff = |other: Option<f64>| match (symbol_return, other) {
            (Some(s), Some(o)) => Some(s - o),
            _ => None,
        };

        Self {
            window: config.window,
            symbol_return,
            benchmark_return,
            sector_return,
            vs_benchmark: diff(benchmark_return),
            vs_sector: diff(sector_return),
            beta: benchmark.and_then(|b| beta(symbol, b, config.beta_window)),
        }
    }

    pub fn outperforms_benchmark(&self) -> bool {
        self.vs_benchmark.is_some_and(|d| d > 0.0)
    }

    /// `None` when no sector series was available.
    pub fn outperforms_sector(&self) -> Option<bool> {
        self.vs_sector.map(|d| d > 0.0)
    }
}

/// Daily returns keyed by the date of the later bar.
fn daily_returns(series: &BarSeries) -> HashMap<NaiveDate, f64> {
    series
        .bars()
        .windows(2)
        .filter(|w| w[0].close > 0.0)
        .map(|w| (w[1].date, w[1].close / w[0].close - 1.0))
        .collect()
}

/// Sample covariance over sample variance of date-aligned daily returns,
/// using the most recent `window` common dates.
pub fn beta(symbol: &BarSeries, benchmark: &BarSeries, window: usize) -> Option<f64> {
    if window < 2 {
        return None;
    }
    let bench_returns = daily_returns(benchmark);
    let mut aligned: Vec<(NaiveDate, f64, f64)> = daily_returns(symbol)
        .into_iter()
        .filter_map(|(date, r)| bench_returns.get(&date).map(|b| (date, r, *b)))
        .collect();
    if aligned.len() < window {
        return None;
    }
    aligned.sort_by_key(|(date, _, _)| *date);
    let recent = &aligned[aligned.len() - window..];

    let sym: Vec<f64> = recent.iter().map(|(_, s, _)| *s).collect();
    let bench: Vec<f64> = recent.iter().map(|(_, _, b)| *b).collect();
    let variance = bench.iter().variance();
    if !variance.is_finite() || variance <= f64::EPSILON {
        return None;
    }
    let beta = sym.iter().covariance(bench.iter()) / variance;
    beta.is_finite().then_some(beta)
}

// ============================================================================
// Reference Data
// ============================================================================

/// Benchmark, sector ETF and volatility series shared by one scan.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub benchmark_symbol: String,
    pub benchmark: Option<Arc<BarSeries>>,
    pub volatility: Option<Arc<BarSeries>>,
    /// Sector name → (ETF ticker, series)
    pub sectors: BTreeMap<String, (String, Arc<BarSeries>)>,
}

impl ReferenceData {
    /// Fetch every reference series. Failures leave the entry absent.
    pub async fn load(fetcher: &MarketDataFetcher, config: &MarketDataConfig, as_of: NaiveDate) -> Self {
        let fetch = move |symbol: String| async move {
            match fetcher.bars(&symbol, as_of).await {
                Ok(series) => Some(series),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Reference series unavailable");
                    None
                }
            }
        };

        let benchmark = fetch(config.benchmark_symbol.clone()).await;
        let volatility = fetch(config.volatility_symbol.clone()).await;
        let sector_results = join_all(config.sector_etfs.iter().map(|(sector, etf)| {
            let sector = sector.clone();
            let etf = etf.clone();
            async move {
                let series = fetch(etf.clone()).await;
                (sector, etf, series)
            }
        }))
        .await;

        let sectors: BTreeMap<_, _> = sector_results
            .into_iter()
            .filter_map(|(sector, etf, series)| series.map(|s| (sector, (etf, s))))
            .collect();

        debug!(
            benchmark = benchmark.is_some(),
            volatility = volatility.is_some(),
            sectors = sectors.len(),
            "Reference data loaded"
        );

        Self {
            benchmark_symbol: config.benchmark_symbol.clone(),
            benchmark,
            volatility,
            sectors,
        }
    }

    pub fn sector_series(&self, sector: Option<&str>) -> Option<&BarSeries> {
        sector
            .and_then(|s| self.sectors.get(s))
            .map(|(_, series)| series.as_ref())
    }

    /// Relative strength of `symbol` against the benchmark and its sector.
    pub fn relative_strength(
        &self,
        symbol: &BarSeries,
        sector: Option<&str>,
        config: &RelativeStrengthConfig,
    ) -> RelativeStrength {
        RelativeStrength::compute(
            symbol,
            self.benchmark.as_deref(),
            self.sector_series(sector),
            config,
        )
    }

    /// Latest volatility index close.
    pub fn volatility_level(&self) -> Option<f64> {
        self.volatility
            .as_ref()
            .and_then(|s| s.last())
            .map(|b| b.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::{ramp, series_from};

    fn config() -> RelativeStrengthConfig {
        RelativeStrengthConfig::default()
    }

    #[test]
    fn test_relative_strength_vs_benchmark_and_sector() {
        let symbol = ramp("AAA", 30, 100.0, 130.0, 1.0);
        let bench = ramp("SPY", 30, 100.0, 105.0, 1.0);
        let sector = ramp("XLK", 30, 100.0, 140.0, 1.0);

        let rs = RelativeStrength::compute(&symbol, Some(&bench), Some(&sector), &config());
        assert!(rs.outperforms_benchmark());
        assert_eq!(rs.outperforms_sector(), Some(false));
        assert!(rs.symbol_return.unwrap() > rs.benchmark_return.unwrap());
    }

    #[test]
    fn test_missing_references() {
        let symbol = ramp("AAA", 30, 100.0, 130.0, 1.0);
        let rs = RelativeStrength::compute(&symbol, None, None, &config());
        assert!(rs.symbol_return.is_some());
        assert!(rs.vs_benchmark.is_none());
        assert!(rs.outperforms_sector().is_none());
        assert!(!rs.outperforms_benchmark());
        assert!(rs.beta.is_none());
    }

    #[test]
    fn test_short_history_has_no_return() {
        let symbol = ramp("AAA", 10, 100.0, 130.0, 1.0);
        let rs = RelativeStrength::compute(&symbol, None, None, &config());
        assert!(rs.symbol_return.is_none());
    }

    #[test]
    fn test_beta_of_levered_series() {
        let bench_closes: Vec<f64> = (0..70)
            .map(|i| 100.0 + (i as f64 * 0.9).sin() * 3.0 + i as f64 * 0.1)
            .collect();
        // Symbol returns are exactly twice the benchmark returns
        let mut sym_closes = vec![50.0];
        for w in bench_closes.windows(2) {
            let r = w[1] / w[0] - 1.0;
            let prev = *sym_closes.last().unwrap();
            sym_closes.push(prev * (1.0 + 2.0 * r));
        }
        let volumes = vec![1.0; 70];
        let bench = series_from("SPY", &bench_closes, &volumes);
        let symbol = series_from("LEV", &sym_closes, &volumes);

        let b = beta(&symbol, &bench, 60).unwrap();
        assert!((b - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_beta_requires_window() {
        let bench = ramp("SPY", 30, 100.0, 110.0, 1.0);
        let symbol = ramp("AAA", 30, 100.0, 120.0, 1.0);
        assert!(beta(&symbol, &bench, 60).is_none());
    }
}
