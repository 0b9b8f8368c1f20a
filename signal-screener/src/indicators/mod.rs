//! Technical indicator engine.
//!
//! Every indicator is computed as a full series (`Vec<Option<f64>>`, `None`
//! until enough history exists) and the latest values are collected into an
//! [`IndicatorSet`]. Insufficient history yields absent fields, never errors
//! and never zeros.
//!
//! | Indicator        | Bars required |
//! |------------------|---------------|
//! | RSI(14)          | 15            |
//! | MACD line        | 26            |
//! | MACD signal      | 34            |
//! | ATR(14)          | 15            |
//! | ADX(14)          | 28            |
//! | Bollinger(20,2)  | 20            |
//! | SMA20 / SMA50    | 20 / 50       |
//! | Volume avg(20)   | 21            |

mod fibonacci;

pub use fibonacci::{fibonacci_levels, FibLevel, FibonacciLevels, TrendDirection, FIB_RATIOS};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use signal_common::config::IndicatorConfig;

use crate::data::{Bar, BarSeries};

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const ATR_PERIOD: usize = 14;
pub const ADX_PERIOD: usize = 14;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_STD_DEVS: f64 = 2.0;
pub const VOLUME_AVG_PERIOD: usize = 20;

// ============================================================================
// Indicator Values
// ============================================================================

/// Bollinger band values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bollinger {
    /// Position of `price` within the bands, 0 at the lower band and 100 at the upper.
    pub fn position_pct(&self, price: f64) -> Option<f64> {
        let width = self.upper - self.lower;
        (width > 0.0).then(|| (price - self.lower) / width * 100.0)
    }
}

/// Volume relative to its 20-bar average (today excluded from the average).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetrics {
    pub current: f64,
    pub avg20: f64,
    pub ratio: f64,
    pub spike: bool,
}

/// Latest indicator values for one symbol at one as-of date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub as_of: Option<NaiveDate>,
    pub close: Option<f64>,
    pub rsi: Option<f64>,
    /// RSI one and two bars earlier
    pub rsi_prev: Option<f64>,
    pub rsi_prev2: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub macd_histogram_prev: Option<f64>,
    pub adx: Option<f64>,
    pub atr: Option<f64>,
    pub bollinger: Option<Bollinger>,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub sma50_prev: Option<f64>,
    pub volume: Option<VolumeMetrics>,
}

/// Full indicator series aligned with the bars of a [`BarSeries`].
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    pub rsi: Vec<Option<f64>>,
    pub macd_line: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_histogram: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
    pub adx: Vec<Option<f64>>,
    pub bollinger: Vec<Option<Bollinger>>,
    pub sma20: Vec<Option<f64>>,
    pub sma50: Vec<Option<f64>>,
    pub volume_avg: Vec<Option<f64>>,
}

impl IndicatorSeries {
    pub fn compute(series: &BarSeries) -> Self {
        let bars = series.bars();
        let closes = series.closes();
        let volumes = series.volumes();
        let (macd_line, macd_signal, macd_histogram) =
            macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);

        Self {
            rsi: rsi(&closes, RSI_PERIOD),
            macd_line,
            macd_signal,
            macd_histogram,
            atr: atr(bars, ATR_PERIOD),
            adx: adx(bars, ADX_PERIOD),
            bollinger: bollinger(&closes, BOLLINGER_PERIOD, BOLLINGER_STD_DEVS),
            sma20: sma(&closes, 20),
            sma50: sma(&closes, 50),
            volume_avg: trailing_average(&volumes, VOLUME_AVG_PERIOD),
        }
    }

    /// Latest values, given the bars the series was computed from.
    pub fn latest(&self, series: &BarSeries, config: &IndicatorConfig) -> IndicatorSet {
        let n = series.len();
        let Some(last) = series.last() else {
            return IndicatorSet::default();
        };

        let at = |v: &[Option<f64>], back: usize| -> Option<f64> {
            n.checked_sub(1 + back).and_then(|i| v.get(i).copied().flatten())
        };

        let volume = at(&self.volume_avg, 0)
            .filter(|avg| *avg > 0.0)
            .map(|avg20| {
                let ratio = last.volume / avg20;
                VolumeMetrics {
                    current: last.volume,
                    avg20,
                    ratio,
                    spike: ratio >= config.volume_spike_ratio,
                }
            });

        IndicatorSet {
            as_of: Some(last.date),
            close: Some(last.close),
            rsi: at(&self.rsi, 0),
            rsi_prev: at(&self.rsi, 1),
            rsi_prev2: at(&self.rsi, 2),
            macd_line: at(&self.macd_line, 0),
            macd_signal: at(&self.macd_signal, 0),
            macd_histogram: at(&self.macd_histogram, 0),
            macd_histogram_prev: at(&self.macd_histogram, 1),
            adx: at(&self.adx, 0),
            atr: at(&self.atr, 0),
            bollinger: self.bollinger.get(n - 1).copied().flatten(),
            sma20: at(&self.sma20, 0),
            sma50: at(&self.sma50, 0),
            sma50_prev: at(&self.sma50, 1),
            volume,
        }
    }
}

/// Compute the latest indicator values for `series`.
pub fn compute(series: &BarSeries, config: &IndicatorConfig) -> IndicatorSet {
    IndicatorSeries::compute(series).latest(series, config)
}

// ============================================================================
// Key Levels
// ============================================================================

/// Support and resistance levels around a price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyLevels {
    /// Levels below the price, nearest first
    pub supports: Vec<f64>,
    /// Levels above the price, nearest first
    pub resistances: Vec<f64>,
}

impl KeyLevels {
    /// Collect Fibonacci levels, moving averages and the Bollinger band edges
    /// around `price`.
    pub fn around(price: f64, indicators: &IndicatorSet, fib: Option<&FibonacciLevels>) -> Self {
        let mut candidates: Vec<f64> = fib
            .map(|f| f.levels.iter().map(|l| l.price).collect())
            .unwrap_or_default();
        candidates.extend(indicators.sma20);
        candidates.extend(indicators.sma50);
        if let Some(bands) = indicators.bollinger {
            candidates.push(bands.lower);
            candidates.push(bands.upper);
        }

        let mut supports: Vec<f64> = candidates
            .iter()
            .copied()
            .filter(|l| l.is_finite() && *l < price)
            .collect();
        let mut resistances: Vec<f64> = candidates
            .into_iter()
            .filter(|l| l.is_finite() && *l > price)
            .collect();

        supports.sort_by(|a, b| b.total_cmp(a));
        supports.dedup();
        resistances.sort_by(|a, b| a.total_cmp(b));
        resistances.dedup();

        Self {
            supports,
            resistances,
        }
    }

    /// Highest support strictly below `price`.
    pub fn support_below(&self, price: f64) -> Option<f64> {
        self.supports.iter().copied().find(|s| *s < price)
    }

    pub fn nearest_support(&self) -> Option<f64> {
        self.supports.first().copied()
    }

    pub fn nearest_resistance(&self) -> Option<f64> {
        self.resistances.first().copied()
    }
}

// ============================================================================
// Indicator Functions
// ============================================================================

/// Simple moving average.
pub fn sma(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    let mut sum: f64 = data[..period].iter().sum();
    result[period - 1] = Some(sum / period as f64);

    for i in period..data.len() {
        sum += data[i] - data[i - period];
        result[i] = Some(sum / period as f64);
    }
    result
}

/// Exponential moving average seeded with the SMA of the first `period` values.
pub fn ema(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut prev = data[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(prev);

    for i in period..data.len() {
        prev = (data[i] - prev) * multiplier + prev;
        result[i] = Some(prev);
    }
    result
}

/// Average of the `period` values before each index (the value itself excluded).
pub fn trailing_average(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 {
        return result;
    }
    for i in period..data.len() {
        result[i] = Some(data[i - period..i].iter().sum::<f64>() / period as f64);
    }
    result
}

/// Wilder RSI.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = Some(rsi_value(avg_gain, avg_loss));

    let p = period as f64;
    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        result[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= f64::EPSILON {
        if avg_gain <= f64::EPSILON {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// MACD line, signal line and histogram.
pub fn macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = closes.len();
    let ema_fast = ema(closes, fast);
    let ema_slow = ema(closes, slow);

    let line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    // Signal is an EMA over the defined part of the line
    let first = line.iter().position(Option::is_some);
    let mut signal_line = vec![None; n];
    if let Some(first) = first {
        let defined: Vec<f64> = line[first..].iter().flatten().copied().collect();
        for (offset, value) in ema(&defined, signal).into_iter().enumerate() {
            signal_line[first + offset] = value;
        }
    }

    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(l, s)| match (l, s) {
            (Some(l), Some(s)) => Some(l - s),
            _ => None,
        })
        .collect();

    (line, signal_line, histogram)
}

/// Wilder-smoothed series over values starting at index 1 (index 0 has no
/// previous bar). The first value lands at index `period`.
fn wilder_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];
    if period == 0 || values.len() < period + 1 {
        return result;
    }

    let mut prev = values[1..=period].iter().sum::<f64>() / period as f64;
    result[period] = Some(prev);
    let p = period as f64;
    for i in (period + 1)..values.len() {
        prev = (prev * (p - 1.0) + values[i]) / p;
        result[i] = Some(prev);
    }
    result
}

fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.range()
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

/// Wilder ATR.
pub fn atr(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    wilder_smooth(&true_ranges(bars), period)
}

/// Wilder ADX.
pub fn adx(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let n = bars.len();
    let mut result = vec![None; n];
    if period == 0 || n < 2 * period {
        return result;
    }

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let tr = wilder_smooth(&true_ranges(bars), period);
    let plus = wilder_smooth(&plus_dm, period);
    let minus = wilder_smooth(&minus_dm, period);

    let dx: Vec<Option<f64>> = (0..n)
        .map(|i| match (tr[i], plus[i], minus[i]) {
            (Some(tr), Some(p), Some(m)) if tr > 0.0 => {
                let plus_di = 100.0 * p / tr;
                let minus_di = 100.0 * m / tr;
                let sum = plus_di + minus_di;
                Some(if sum > 0.0 {
                    100.0 * (plus_di - minus_di).abs() / sum
                } else {
                    0.0
                })
            }
            (Some(_), Some(_), Some(_)) => Some(0.0),
            _ => None,
        })
        .collect();

    // First ADX is the mean of the first `period` DX values
    let first = 2 * period - 1;
    let mut prev = dx[period..=first].iter().flatten().sum::<f64>() / period as f64;
    result[first] = Some(prev);
    let p = period as f64;
    for i in (first + 1)..n {
        if let Some(dx) = dx[i] {
            prev = (prev * (p - 1.0) + dx) / p;
            result[i] = Some(prev);
        }
    }
    result
}

/// Bollinger bands over an SMA with population standard deviation.
pub fn bollinger(closes: &[f64], period: usize, std_devs: f64) -> Vec<Option<Bollinger>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    for i in (period - 1)..closes.len() {
        let window = &closes[i + 1 - period..=i];
        let middle = window.mean();
        let sigma = window.population_std_dev();
        result[i] = Some(Bollinger {
            upper: middle + std_devs * sigma,
            middle,
            lower: middle - std_devs * sigma,
        });
    }
    result
}

/// Least-squares slope of `values` against their index.
pub fn slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.mean();
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });
    (den > 0.0).then(|| num / den)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::{ramp, series_from};
    use proptest::prelude::*;

    fn config() -> IndicatorConfig {
        IndicatorConfig::default()
    }

    #[test]
    fn test_sma() {
        let v = sma(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(v, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let v = ema(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_eq!(v[1], None);
        assert_eq!(v[2], Some(4.0));
        assert!((v[3].unwrap() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        let v = rsi(&closes, 14);
        assert!(v[13].is_none());
        assert_eq!(v[14], Some(100.0));
    }

    #[test]
    fn test_rsi_flat_is_neutral() {
        let v = rsi(&[5.0; 20], 14);
        assert_eq!(v[19], Some(50.0));
    }

    #[test]
    fn test_rsi_bounded() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 50.0 + (i as f64 * 0.7).sin() * 5.0)
            .collect();
        for value in rsi(&closes, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_macd_lookbacks() {
        let closes: Vec<f64> = (0..40).map(|i| 10.0 + i as f64 * 0.5).collect();
        let (line, signal, hist) = macd(&closes, 12, 26, 9);
        assert!(line[24].is_none());
        assert!(line[25].is_some());
        assert!(signal[32].is_none());
        assert!(signal[33].is_some());
        assert!(hist[33].is_some());
        // Rising series: fast EMA above slow EMA
        assert!(line[39].unwrap() > 0.0);
    }

    #[test]
    fn test_atr_constant_range() {
        let series = ramp("X", 20, 100.0, 100.0, 1.0);
        let v = atr(series.bars(), 14);
        assert!(v[13].is_none());
        // high = 101, low = 99 on every bar
        assert!((v[14].unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_adx_strong_trend() {
        let series = ramp("X", 60, 10.0, 40.0, 1.0);
        let v = adx(series.bars(), 14);
        assert!(v[26].is_none());
        assert!(v[27].is_some());
        assert!(v[59].unwrap() > 25.0);
    }

    #[test]
    fn test_bollinger_flat_collapses() {
        let v = bollinger(&[10.0; 25], 20, 2.0);
        let b = v[24].unwrap();
        assert_eq!(b.upper, 10.0);
        assert_eq!(b.lower, 10.0);
        assert!(b.position_pct(10.0).is_none());
    }

    #[test]
    fn test_volume_metrics_exclude_today() {
        let mut volumes = vec![100.0; 21];
        volumes[20] = 250.0;
        let closes = vec![10.0; 21];
        let series = series_from("X", &closes, &volumes);
        let set = compute(&series, &config());
        let vm = set.volume.unwrap();
        assert_eq!(vm.avg20, 100.0);
        assert_eq!(vm.ratio, 2.5);
        assert!(vm.spike);
    }

    #[test]
    fn test_short_history_yields_absent_fields() {
        let series = ramp("X", 10, 10.0, 12.0, 1000.0);
        let set = compute(&series, &config());
        assert!(set.close.is_some());
        assert!(set.rsi.is_none());
        assert!(set.macd_line.is_none());
        assert!(set.atr.is_none());
        assert!(set.adx.is_none());
        assert!(set.bollinger.is_none());
        assert!(set.sma20.is_none());
        assert!(set.volume.is_none());
    }

    #[test]
    fn test_empty_series() {
        let series = BarSeries::new("X", vec![]);
        assert_eq!(compute(&series, &config()), IndicatorSet::default());
    }

    #[test]
    fn test_slope() {
        assert!((slope(&[1.0, 2.0, 3.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!(slope(&[5.0]).is_none());
    }

    #[test]
    fn test_key_levels_ordering() {
        let set = IndicatorSet {
            sma20: Some(95.0),
            sma50: Some(90.0),
            ..Default::default()
        };
        let levels = KeyLevels::around(100.0, &set, None);
        assert_eq!(levels.supports, vec![95.0, 90.0]);
        assert!(levels.resistances.is_empty());
        assert_eq!(levels.support_below(92.0), Some(90.0));
    }

    fn arb_closes(min: usize, max: usize) -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(1.0f64..500.0, min..max)
    }

    proptest! {
        #[test]
        fn prop_lookback_presence(closes in arb_closes(1, 80)) {
            let volumes: Vec<f64> = closes.iter().map(|c| c * 1000.0).collect();
            let series = series_from("P", &closes, &volumes);
            let set = compute(&series, &IndicatorConfig::default());
            let n = closes.len();

            let checks = [
                (set.rsi, 15),
                (set.macd_line, 26),
                (set.macd_signal, 34),
                (set.atr, 15),
                (set.adx, 28),
                (set.sma20, 20),
                (set.sma50, 50),
            ];
            for (value, required) in checks {
                if n >= required {
                    prop_assert!(value.map_or(false, f64::is_finite));
                } else {
                    prop_assert!(value.is_none());
                }
            }
            prop_assert_eq!(set.bollinger.is_some(), n >= 20);
            prop_assert_eq!(set.volume.is_some(), n >= 21);
        }
    }
}
