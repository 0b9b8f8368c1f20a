//! Per-symbol analysis pipeline and the single-symbol analysis report.
//!
//! [`SymbolAnalysis`] is the pure composition of indicators, Fibonacci levels,
//! patterns, relative strength and scoring that both the screener and the
//! `analyze` operation run. [`AnalysisReport`] adds the narrative insights, a
//! Fibonacci-based trade setup and recent indicator history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use signal_common::config::AnalysisConfig;

use crate::data::{BarSeries, SymbolMeta};
use crate::error::{Result, ScreenerError};
use crate::indicators::{fibonacci_levels, FibonacciLevels, IndicatorSeries, IndicatorSet, KeyLevels};
use crate::market::{ReferenceData, RelativeStrength};
use crate::patterns::{detect, PatternContext, PatternMatch};
use crate::scoring::insights::Insights;
use crate::scoring::{score, Score};

/// Bars of indicator history included in an analysis report.
const TIMESERIES_BARS: usize = 120;

/// Stop placed this far below the 61.8% retracement.
const SETUP_STOP_BUFFER: f64 = 0.95;

// ============================================================================
// Symbol Analysis
// ============================================================================

/// Everything computed for one symbol at one as-of date.
#[derive(Debug, Clone)]
pub struct SymbolAnalysis {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub price: f64,
    pub volume: f64,
    pub indicators: IndicatorSet,
    pub fibonacci: Option<FibonacciLevels>,
    pub patterns: PatternMatch,
    pub relative_strength: RelativeStrength,
    pub score: Score,
    pub key_levels: KeyLevels,
}

impl SymbolAnalysis {
    /// Run the full pipeline over `series`. Fails only on an empty series.
    pub fn run(
        series: &BarSeries,
        sector: Option<&str>,
        reference: &ReferenceData,
        config: &AnalysisConfig,
    ) -> Result<Self> {
        let indicator_series = IndicatorSeries::compute(series);
        Self::with_indicators(series, &indicator_series, sector, reference, config)
    }

    fn with_indicators(
        series: &BarSeries,
        indicator_series: &IndicatorSeries,
        sector: Option<&str>,
        reference: &ReferenceData,
        config: &AnalysisConfig,
    ) -> Result<Self> {
        let Some(last) = series.last() else {
            return Err(ScreenerError::data_unavailable(series.symbol(), "no bars"));
        };

        let indicators = indicator_series.latest(series, &config.indicators);
        let fibonacci = fibonacci_levels(series, config.indicators.fibonacci_lookback);
        let patterns = detect(&PatternContext {
            series,
            indicators: &indicators,
            thresholds: &config.patterns,
        });
        let relative_strength =
            reference.relative_strength(series, sector, &config.relative_strength);
        let score = score(&indicators, &patterns, &relative_strength, &config.scoring);
        let key_levels = KeyLevels::around(last.close, &indicators, fibonacci.as_ref());

        Ok(Self {
            symbol: series.symbol().to_string(),
            as_of: last.date,
            price: last.close,
            volume: last.volume,
            indicators,
            fibonacci,
            patterns,
            relative_strength,
            score,
            key_levels,
        })
    }
}

// ============================================================================
// Analysis Report
// ============================================================================

/// Price target with the share of the position to sell there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupTarget {
    pub label: String,
    pub price: f64,
    pub allocation_pct: f64,
}

/// Trade setup derived from the retracement of the latest swing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub entry_zone_low: f64,
    pub entry_zone_high: f64,
    pub stop_loss: f64,
    pub targets: Vec<SetupTarget>,
    /// Price at which the trailing stop activates
    pub trailing_trigger: f64,
    pub trailing_distance: f64,
    /// Reward to the first target over risk from the top of the entry zone
    pub risk_reward: Option<f64>,
}

impl TradeSetup {
    /// Entry between the 61.8% and 50% retracements, stop 5% under the
    /// 61.8% level, targets at the 38.2% and 23.6% retracements and the
    /// swing high.
    pub fn from_fibonacci(fib: &FibonacciLevels, price: f64, trailing_stop_pct: f64) -> Self {
        let range = fib.swing_high - fib.swing_low;
        let retrace = |ratio: f64| fib.swing_high - ratio * range;

        let entry_zone_low = retrace(0.618);
        let entry_zone_high = retrace(0.5);
        let stop_loss = entry_zone_low * SETUP_STOP_BUFFER;
        let targets = vec![
            SetupTarget {
                label: "38.2% retracement".to_string(),
                price: retrace(0.382),
                allocation_pct: 30.0,
            },
            SetupTarget {
                label: "23.6% retracement".to_string(),
                price: retrace(0.236),
                allocation_pct: 40.0,
            },
            SetupTarget {
                label: "swing high".to_string(),
                price: fib.swing_high,
                allocation_pct: 30.0,
            },
        ];

        let risk = entry_zone_high - stop_loss;
        let risk_reward = (risk > 0.0).then(|| (targets[0].price - entry_zone_high) / risk);

        Self {
            entry_zone_low,
            entry_zone_high,
            stop_loss,
            targets,
            trailing_trigger: retrace(0.236),
            trailing_distance: price * trailing_stop_pct / 100.0,
            risk_reward,
        }
    }
}

/// Recent indicator history, one entry per bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeseries {
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
    pub rsi: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
    pub adx: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
}

impl Timeseries {
    fn tail(series: &BarSeries, indicators: &IndicatorSeries, bars: usize) -> Self {
        let start = series.len().saturating_sub(bars);
        let tail = |v: &[Option<f64>]| v.get(start..).map(<[_]>::to_vec).unwrap_or_default();
        let recent = &series.bars()[start..];
        let bands = indicators.bollinger.get(start..).unwrap_or_default();

        Self {
            dates: recent.iter().map(|b| b.date).collect(),
            closes: recent.iter().map(|b| b.close).collect(),
            volumes: recent.iter().map(|b| b.volume).collect(),
            rsi: tail(&indicators.rsi),
            macd: tail(&indicators.macd_line),
            macd_signal: tail(&indicators.macd_signal),
            atr: tail(&indicators.atr),
            adx: tail(&indicators.adx),
            bb_upper: bands.iter().map(|b| b.map(|b| b.upper)).collect(),
            bb_lower: bands.iter().map(|b| b.map(|b| b.lower)).collect(),
        }
    }
}

/// Full single-symbol analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<f64>,
    pub as_of: NaiveDate,
    pub price: f64,
    pub change_1d_pct: Option<f64>,
    pub indicators: IndicatorSet,
    pub fibonacci: Option<FibonacciLevels>,
    pub patterns: PatternMatch,
    pub relative_strength: RelativeStrength,
    pub score: Score,
    pub key_levels: KeyLevels,
    /// Absent when no swing range exists in the Fibonacci window
    pub setup: Option<TradeSetup>,
    pub insights: Insights,
    pub timeseries: Timeseries,
}

impl AnalysisReport {
    pub fn build(
        meta: &SymbolMeta,
        series: &BarSeries,
        reference: &ReferenceData,
        config: &AnalysisConfig,
    ) -> Result<Self> {
        let indicator_series = IndicatorSeries::compute(series);
        let analysis = SymbolAnalysis::with_indicators(
            series,
            &indicator_series,
            meta.sector.as_deref(),
            reference,
            config,
        )?;

        let setup = analysis
            .fibonacci
            .as_ref()
            .map(|fib| TradeSetup::from_fibonacci(fib, analysis.price, config.plan.trailing_stop_pct));
        let insights = Insights::generate(
            &analysis.symbol,
            analysis.price,
            &analysis.indicators,
            analysis.fibonacci.as_ref(),
            &analysis.score,
        );

        Ok(Self {
            symbol: analysis.symbol,
            name: meta.name.clone(),
            sector: meta.sector.clone(),
            market_cap: meta.market_cap,
            as_of: analysis.as_of,
            price: analysis.price,
            change_1d_pct: series.return_pct(1),
            indicators: analysis.indicators,
            fibonacci: analysis.fibonacci,
            patterns: analysis.patterns,
            relative_strength: analysis.relative_strength,
            score: analysis.score,
            key_levels: analysis.key_levels,
            setup,
            insights,
            timeseries: Timeseries::tail(series, &indicator_series, TIMESERIES_BARS),
        })
    }
}
