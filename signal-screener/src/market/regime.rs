//! Market regime classification and market context.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use signal_common::config::RegimeThresholds;

use super::ReferenceData;
use crate::data::BarSeries;
use crate::indicators::sma;

/// Overall market regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    BullTrend,
    RiskOn,
    RiskOff,
    Uncertain,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BullTrend => "BULL_TREND",
            Self::RiskOn => "RISK_ON",
            Self::RiskOff => "RISK_OFF",
            Self::Uncertain => "UNCERTAIN",
        }
    }
}

/// Benchmark trend, volatility and sector breadth inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreadthMetrics {
    pub benchmark_symbol: String,
    pub benchmark_price: Option<f64>,
    pub benchmark_sma20: Option<f64>,
    pub benchmark_sma50: Option<f64>,
    pub price_vs_sma20_pct: Option<f64>,
    pub price_vs_sma50_pct: Option<f64>,
    pub volatility_index: Option<f64>,
    pub sectors_advancing: usize,
    pub sectors_tracked: usize,
    /// Fraction of tracked sectors with a positive 20-day return
    pub breadth: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorPerformance {
    pub etf: String,
    pub change_1d: Option<f64>,
    pub change_5d: Option<f64>,
    pub change_20d: Option<f64>,
    /// 20-day return minus the benchmark's 20-day return
    pub relative_strength: Option<f64>,
}

impl SectorPerformance {
    fn from_series(etf: &str, series: &BarSeries, benchmark_20d: Option<f64>) -> Self {
        let change_20d = series.return_pct(20);
        Self {
            etf: etf.to_string(),
            change_1d: series.return_pct(1),
            change_5d: series.return_pct(5),
            change_20d,
            relative_strength: change_20d.zip(benchmark_20d).map(|(s, b)| s - b),
        }
    }
}

/// Market-wide context for one trading date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub as_of: NaiveDate,
    pub regime: MarketRegime,
    /// Sub-conditions that fired, in evaluation order
    pub signals: Vec<String>,
    pub breadth: BreadthMetrics,
    pub sectors: BTreeMap<String, SectorPerformance>,
}

impl MarketContext {
    pub fn from_reference(
        reference: &ReferenceData,
        as_of: NaiveDate,
        thresholds: &RegimeThresholds,
    ) -> Self {
        let benchmark = reference.benchmark.as_deref();
        let benchmark_20d = benchmark.and_then(|b| b.return_pct(20));

        let sectors: BTreeMap<String, SectorPerformance> = reference
            .sectors
            .iter()
            .map(|(sector, (etf, series))| {
                (
                    sector.clone(),
                    SectorPerformance::from_series(etf, series, benchmark_20d),
                )
            })
            .collect();

        let breadth = breadth_metrics(reference, &sectors);
        let (regime, signals) = classify_regime(&breadth, thresholds);

        Self {
            as_of,
            regime,
            signals,
            breadth,
            sectors,
        }
    }
}

fn breadth_metrics(
    reference: &ReferenceData,
    sectors: &BTreeMap<String, SectorPerformance>,
) -> BreadthMetrics {
    let (price, sma20, sma50) = match reference.benchmark.as_deref() {
        Some(series) => {
            let closes = series.closes();
            let latest = |v: Vec<Option<f64>>| v.last().copied().flatten();
            (
                series.last().map(|b| b.close),
                latest(sma(&closes, 20)),
                latest(sma(&closes, 50)),
            )
        }
        None => (None, None, None),
    };
    let vs = |avg: Option<f64>| match (price, avg) {
        (Some(p), Some(a)) if a > 0.0 => Some((p - a) / a * 100.0),
        _ => None,
    };

    let tracked: Vec<f64> = sectors.values().filter_map(|s| s.change_20d).collect();
    let advancing = tracked.iter().filter(|c| **c > 0.0).count();
    let breadth = (!tracked.is_empty()).then(|| advancing as f64 / tracked.len() as f64);

    BreadthMetrics {
        benchmark_symbol: reference.benchmark_symbol.clone(),
        benchmark_price: price,
        benchmark_sma20: sma20,
        benchmark_sma50: sma50,
        price_vs_sma20_pct: vs(sma20),
        price_vs_sma50_pct: vs(sma50),
        volatility_index: reference.volatility_level(),
        sectors_advancing: advancing,
        sectors_tracked: tracked.len(),
        breadth,
    }
}

/// Classify the regime. Conditions are evaluated in order and the first
/// match wins; a condition whose inputs are missing is false.
pub fn classify_regime(
    metrics: &BreadthMetrics,
    thresholds: &RegimeThresholds,
) -> (MarketRegime, Vec<String>) {
    let mut signals = Vec::new();

    let uptrend = match (metrics.benchmark_price, metrics.benchmark_sma20, metrics.benchmark_sma50) {
        (Some(p), Some(s20), Some(s50)) => p > s20 && s20 > s50,
        _ => false,
    };
    if uptrend {
        signals.push("price above short and medium trend".to_string());
    }

    let below_medium = match (metrics.benchmark_price, metrics.benchmark_sma50) {
        (Some(p), Some(s50)) => p < s50,
        _ => false,
    };
    if below_medium {
        signals.push("price below medium trend".to_string());
    }

    let calm = metrics
        .volatility_index
        .is_some_and(|v| v < thresholds.calm_volatility);
    let stressed = metrics
        .volatility_index
        .is_some_and(|v| v > thresholds.stress_volatility);
    if let Some(vix) = metrics.volatility_index {
        if calm {
            signals.push(format!(
                "volatility calm (VIX {:.1} < {:.1})",
                vix, thresholds.calm_volatility
            ));
        }
        if stressed {
            signals.push(format!(
                "volatility elevated (VIX {:.1} > {:.1})",
                vix, thresholds.stress_volatility
            ));
        }
    }

    let broad = metrics
        .breadth
        .is_some_and(|b| b > thresholds.breadth_majority);
    if broad {
        signals.push(format!(
            "breadth positive ({}/{} sectors advancing)",
            metrics.sectors_advancing, metrics.sectors_tracked
        ));
    }

    let regime = if uptrend && calm {
        MarketRegime::BullTrend
    } else if stressed || below_medium {
        MarketRegime::RiskOff
    } else if broad {
        MarketRegime::RiskOn
    } else {
        MarketRegime::Uncertain
    };

    (regime, signals)
}
