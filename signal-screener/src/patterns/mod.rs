//! Pattern detector.
//!
//! Each pattern is a named boolean predicate over the bar series and the
//! latest indicator values. Predicates live in [`CATALOG`]; adding a pattern
//! means adding a [`PatternKey`] variant and one table entry.

mod swings;

pub use swings::{swing_highs, swing_lows, SwingPoint};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use signal_common::config::PatternThresholds;

use crate::data::{Bar, BarSeries};
use crate::indicators::{slope, IndicatorSet};

/// Catalog keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKey {
    GapUp,
    Breakout,
    Momentum,
    OversoldBounce,
    PullbackSupport,
    VolumeAccumulation,
    BaseBuilding,
    CupHandle,
    AscendingTriangle,
}

impl PatternKey {
    pub const ALL: [PatternKey; 9] = [
        Self::GapUp,
        Self::Breakout,
        Self::Momentum,
        Self::OversoldBounce,
        Self::PullbackSupport,
        Self::VolumeAccumulation,
        Self::BaseBuilding,
        Self::CupHandle,
        Self::AscendingTriangle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GapUp => "gap_up",
            Self::Breakout => "breakout",
            Self::Momentum => "momentum",
            Self::OversoldBounce => "oversold_bounce",
            Self::PullbackSupport => "pullback_support",
            Self::VolumeAccumulation => "volume_accumulation",
            Self::BaseBuilding => "base_building",
            Self::CupHandle => "cup_handle",
            Self::AscendingTriangle => "ascending_triangle",
        }
    }

    /// Short human description used in rationale and reports.
    pub fn description(&self) -> &'static str {
        match self {
            Self::GapUp => "gapped up from the previous close",
            Self::Breakout => "closed above the recent range high",
            Self::Momentum => "consecutive higher closes on supportive volume",
            Self::OversoldBounce => "RSI turning up from oversold territory",
            Self::PullbackSupport => "pulled back to a rising 20-day average",
            Self::VolumeAccumulation => "rising volume with steady price",
            Self::BaseBuilding => "tight consolidation base",
            Self::CupHandle => "cup with handle breakout",
            Self::AscendingTriangle => "ascending triangle near resistance",
        }
    }
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown pattern '{}'", s))
    }
}

/// Ordered set of matched patterns. Empty is a valid match result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternMatch(BTreeSet<PatternKey>);

impl PatternMatch {
    pub fn contains(&self, key: PatternKey) -> bool {
        self.0.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = PatternKey> + '_ {
        self.0.iter().copied()
    }

    /// Whether any of `wanted` matched. An empty `wanted` set always passes.
    pub fn matches_any(&self, wanted: &BTreeSet<PatternKey>) -> bool {
        wanted.is_empty() || wanted.iter().any(|k| self.0.contains(k))
    }
}

impl FromIterator<PatternKey> for PatternMatch {
    fn from_iter<I: IntoIterator<Item = PatternKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Inputs available to every predicate.
pub struct PatternContext<'a> {
    pub series: &'a BarSeries,
    pub indicators: &'a IndicatorSet,
    pub thresholds: &'a PatternThresholds,
}

impl<'a> PatternContext<'a> {
    fn bars(&self) -> &'a [Bar] {
        self.series.bars()
    }

    /// Last bar and the one before it.
    fn last_two(&self) -> Option<(&'a Bar, &'a Bar)> {
        let bars = self.bars();
        let n = bars.len();
        (n >= 2).then(|| (&bars[n - 1], &bars[n - 2]))
    }
}

pub type Detector = fn(&PatternContext) -> bool;

/// Pattern registry, evaluated in order.
pub const CATALOG: &[(PatternKey, Detector)] = &[
    (PatternKey::GapUp, gap_up),
    (PatternKey::Breakout, breakout),
    (PatternKey::Momentum, momentum),
    (PatternKey::OversoldBounce, oversold_bounce),
    (PatternKey::PullbackSupport, pullback_support),
    (PatternKey::VolumeAccumulation, volume_accumulation),
    (PatternKey::BaseBuilding, base_building),
    (PatternKey::CupHandle, cup_handle),
    (PatternKey::AscendingTriangle, ascending_triangle),
];

/// Evaluate every catalog entry.
pub fn detect(ctx: &PatternContext) -> PatternMatch {
    CATALOG
        .iter()
        .filter(|(_, detector)| detector(ctx))
        .map(|(key, _)| *key)
        .collect()
}

// ============================================================================
// Predicates
// ============================================================================

fn gap_up(ctx: &PatternContext) -> bool {
    let Some((today, prev)) = ctx.last_two() else {
        return false;
    };
    prev.close > 0.0 && today.open >= prev.close * (1.0 + ctx.thresholds.gap_up_pct / 100.0)
}

fn breakout(ctx: &PatternContext) -> bool {
    let bars = ctx.bars();
    let lookback = ctx.thresholds.breakout_lookback;
    let n = bars.len();
    if lookback == 0 || n < lookback + 1 {
        return false;
    }
    let prior_high = bars[n - 1 - lookback..n - 1]
        .iter()
        .map(|b| b.high)
        .fold(f64::NEG_INFINITY, f64::max);
    bars[n - 1].close > prior_high
}

fn momentum(ctx: &PatternContext) -> bool {
    let bars = ctx.bars();
    let streak = ctx.thresholds.momentum_streak;
    let n = bars.len();
    if streak == 0 || n < streak + 1 {
        return false;
    }

    let rising = bars[n - 1 - streak..]
        .windows(2)
        .all(|w| w[1].close > w[0].close);
    if !rising {
        return false;
    }

    let lookback = ctx.thresholds.momentum_volume_lookback.min(n - 1);
    if lookback == 0 {
        return false;
    }
    let prior = &bars[n - 1 - lookback..n - 1];
    let avg = prior.iter().map(|b| b.volume).sum::<f64>() / lookback as f64;
    bars[n - 1].volume >= avg
}

fn oversold_bounce(ctx: &PatternContext) -> bool {
    let t = ctx.thresholds;
    let ind = ctx.indicators;
    let (Some(rsi), Some(prev), Some(prev2)) = (ind.rsi, ind.rsi_prev, ind.rsi_prev2) else {
        return false;
    };
    let Some((today, yesterday)) = ctx.last_two() else {
        return false;
    };

    (t.oversold_rsi_low..=t.oversold_rsi_high).contains(&rsi)
        && rsi > prev
        && prev > prev2
        && today.low >= yesterday.low
}

fn pullback_support(ctx: &PatternContext) -> bool {
    let ind = ctx.indicators;
    let (Some(close), Some(sma20), Some(sma50), Some(sma50_prev)) =
        (ind.close, ind.sma20, ind.sma50, ind.sma50_prev)
    else {
        return false;
    };
    sma20 > 0.0
        && ((close - sma20).abs() / sma20 * 100.0) <= ctx.thresholds.pullback_tolerance_pct
        && sma50 > sma50_prev
}

fn volume_accumulation(ctx: &PatternContext) -> bool {
    let bars = ctx.bars();
    let window = ctx.thresholds.accumulation_window;
    if window < 2 || bars.len() < window {
        return false;
    }
    let recent = &bars[bars.len() - window..];
    let volumes: Vec<f64> = recent.iter().map(|b| b.volume).collect();
    let (first, last) = (recent[0], recent[window - 1]);

    let volume_rising =
        slope(&volumes).is_some_and(|s| s > 0.0) && last.volume > first.volume;
    let price_change_pct = if first.close > 0.0 {
        (last.close - first.close) / first.close * 100.0
    } else {
        return false;
    };

    volume_rising && price_change_pct >= -ctx.thresholds.accumulation_flat_pct
}

fn base_building(ctx: &PatternContext) -> bool {
    let bars = ctx.bars();
    let lookback = ctx.thresholds.base_lookback;
    if lookback == 0 || bars.len() < lookback {
        return false;
    }
    let recent = &bars[bars.len() - lookback..];
    let high = recent.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = recent.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    low > 0.0 && (high - low) / low * 100.0 < ctx.thresholds.base_max_range_pct
}

/// Minimum bars between a rim and the cup trough.
const CUP_MIN_RIM_DISTANCE: usize = 5;

fn cup_handle(ctx: &PatternContext) -> bool {
    let t = ctx.thresholds;
    let bars = ctx.bars();
    let n = bars.len();
    if n < 2 * CUP_MIN_RIM_DISTANCE + 2 * t.swing_radius + 2 {
        return false;
    }
    let start = n.saturating_sub(t.cup_lookback);
    let window = &bars[start..];
    let Some(today) = window.last() else {
        return false;
    };
    let highs = swing_highs(window, t.swing_radius);

    // Most recent right rim first
    for (ri, right) in highs.iter().enumerate().rev() {
        if today.close <= right.price {
            continue;
        }
        for left in highs[..ri].iter().rev() {
            if cup_between(window, left, right, today.close, t) {
                return true;
            }
        }
    }
    false
}

fn cup_between(
    window: &[Bar],
    left: &SwingPoint,
    right: &SwingPoint,
    close: f64,
    t: &PatternThresholds,
) -> bool {
    let span = right.index - left.index;
    if span < 2 * CUP_MIN_RIM_DISTANCE || left.price <= 0.0 {
        return false;
    }

    let rim_gap_pct = (right.price - left.price).abs() / left.price * 100.0;
    if rim_gap_pct > t.cup_rim_tolerance_pct {
        return false;
    }

    let Some((trough_idx, trough)) = window[left.index + 1..right.index]
        .iter()
        .enumerate()
        .map(|(i, b)| (left.index + 1 + i, b.low))
        .min_by(|a, b| a.1.total_cmp(&b.1))
    else {
        return false;
    };

    let depth_pct = (left.price - trough) / left.price * 100.0;
    if depth_pct < t.cup_min_depth_pct || depth_pct > t.cup_max_depth_pct {
        return false;
    }

    let position = (trough_idx - left.index) as f64 / span as f64;
    if !(0.2..=0.8).contains(&position)
        || trough_idx - left.index < CUP_MIN_RIM_DISTANCE
        || right.index - trough_idx < CUP_MIN_RIM_DISTANCE
    {
        return false;
    }

    // Handle: bars after the right rim, today excluded
    if right.index + 2 > window.len() {
        return false;
    }
    let handle = &window[right.index + 1..window.len() - 1];
    if handle.is_empty() {
        return false;
    }
    let handle_low = handle.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let pullback = right.price - handle_low;
    let cup_depth = right.price - trough;

    pullback > 0.0
        && cup_depth > 0.0
        && pullback <= t.cup_handle_max_retrace * cup_depth
        && close > right.price
}

fn ascending_triangle(ctx: &PatternContext) -> bool {
    let t = ctx.thresholds;
    let bars = ctx.bars();
    let n = bars.len();
    if n < 4 * t.swing_radius + 3 {
        return false;
    }
    let window = &bars[n.saturating_sub(t.triangle_lookback)..];
    let Some(today) = window.last() else {
        return false;
    };

    let highs = swing_highs(window, t.swing_radius);
    let lows = swing_lows(window, t.swing_radius);
    if highs.len() < 2 || lows.len() < 2 {
        return false;
    }

    let resistance = highs
        .iter()
        .map(|p| p.price)
        .fold(f64::NEG_INFINITY, f64::max);
    if resistance <= 0.0 {
        return false;
    }
    let touches = highs
        .iter()
        .filter(|p| (resistance - p.price) / resistance * 100.0 <= t.triangle_resistance_tolerance_pct)
        .count();
    let rising_lows = lows.windows(2).all(|w| w[1].price > w[0].price);
    let near_resistance =
        today.close >= resistance * (1.0 - t.triangle_proximity_pct / 100.0);

    touches >= 2 && rising_lows && near_resistance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::{ramp, series_from};
    use crate::indicators;
    use chrono::{Duration, NaiveDate};
    use signal_common::config::IndicatorConfig;

    fn thresholds() -> PatternThresholds {
        PatternThresholds::default()
    }

    fn detect_series(series: &BarSeries) -> PatternMatch {
        let ind = indicators::compute(series, &IndicatorConfig::default());
        let t = thresholds();
        detect(&PatternContext {
            series,
            indicators: &ind,
            thresholds: &t,
        })
    }

    fn bars_from(points: &[(f64, f64, f64, f64)]) -> BarSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = points
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                date: start + Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 1_000.0,
            })
            .collect();
        BarSeries::new("T", bars)
    }

    #[test]
    fn test_catalog_covers_every_key() {
        let keys: Vec<PatternKey> = CATALOG.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, PatternKey::ALL.to_vec());
    }

    #[test]
    fn test_pattern_key_roundtrip() {
        for key in PatternKey::ALL {
            assert_eq!(key.as_str().parse::<PatternKey>().unwrap(), key);
        }
        assert!("head_and_shoulders".parse::<PatternKey>().is_err());
    }

    #[test]
    fn test_rising_closes_with_volume_spike() {
        let closes: Vec<f64> = (0..25).map(|i| 10.0 + 5.0 * i as f64 / 24.0).collect();
        let mut volumes = vec![1_000_000.0; 25];
        volumes[24] = 2_000_000.0;
        let series = series_from("RISE", &closes, &volumes);

        let matched = detect_series(&series);
        assert!(matched.contains(PatternKey::Momentum));
        assert!(matched.contains(PatternKey::VolumeAccumulation));
    }

    #[test]
    fn test_momentum_requires_volume() {
        let closes: Vec<f64> = (0..10).map(|i| 10.0 + i as f64).collect();
        let mut volumes = vec![1_000.0; 10];
        volumes[9] = 10.0;
        let series = series_from("X", &closes, &volumes);
        assert!(!detect_series(&series).contains(PatternKey::Momentum));
    }

    #[test]
    fn test_gap_up() {
        let series = bars_from(&[(10.0, 10.2, 9.8, 10.0), (10.3, 10.6, 10.25, 10.5)]);
        assert!(detect_series(&series).contains(PatternKey::GapUp));

        let series = bars_from(&[(10.0, 10.2, 9.8, 10.0), (10.1, 10.6, 10.0, 10.5)]);
        assert!(!detect_series(&series).contains(PatternKey::GapUp));
    }

    #[test]
    fn test_breakout_excludes_today() {
        let mut points = vec![(10.0, 10.5, 9.5, 10.0); 20];
        points.push((10.4, 11.0, 10.3, 10.8));
        let series = bars_from(&points);
        assert!(detect_series(&series).contains(PatternKey::Breakout));

        let mut points = vec![(10.0, 10.5, 9.5, 10.0); 20];
        points.push((10.4, 11.0, 10.3, 10.4));
        let series = bars_from(&points);
        assert!(!detect_series(&series).contains(PatternKey::Breakout));
    }

    #[test]
    fn test_base_building() {
        let closes: Vec<f64> = (0..15).map(|i| 20.0 + (i % 3) as f64 * 0.1).collect();
        let series = series_from("B", &closes, &vec![1.0; 15]);
        assert!(detect_series(&series).contains(PatternKey::BaseBuilding));

        let series = ramp("B", 15, 10.0, 15.0, 1.0);
        assert!(!detect_series(&series).contains(PatternKey::BaseBuilding));
    }

    #[test]
    fn test_oversold_bounce_from_indicators() {
        let series = bars_from(&[(10.0, 10.2, 9.8, 10.0), (10.0, 10.3, 9.9, 10.1)]);
        let ind = IndicatorSet {
            rsi: Some(33.0),
            rsi_prev: Some(30.0),
            rsi_prev2: Some(27.0),
            ..Default::default()
        };
        let t = thresholds();
        let ctx = PatternContext {
            series: &series,
            indicators: &ind,
            thresholds: &t,
        };
        assert!(oversold_bounce(&ctx));

        let falling = IndicatorSet {
            rsi_prev2: Some(31.0),
            ..ind.clone()
        };
        let ctx = PatternContext {
            indicators: &falling,
            ..ctx
        };
        assert!(!oversold_bounce(&ctx));
    }

    #[test]
    fn test_pullback_support_needs_rising_sma50() {
        let series = bars_from(&[(10.0, 10.2, 9.8, 10.0), (10.0, 10.3, 9.9, 10.1)]);
        let ind = IndicatorSet {
            close: Some(10.1),
            sma20: Some(10.0),
            sma50: Some(9.5),
            sma50_prev: Some(9.4),
            ..Default::default()
        };
        let t = thresholds();
        let ctx = PatternContext {
            series: &series,
            indicators: &ind,
            thresholds: &t,
        };
        assert!(pullback_support(&ctx));

        let flat = IndicatorSet {
            sma50_prev: Some(9.5),
            ..ind.clone()
        };
        assert!(!pullback_support(&PatternContext {
            indicators: &flat,
            ..ctx
        }));
    }

    /// Close path: rim at 100, trough at 80, right rim at 99, shallow handle, breakout.
    fn cup_closes() -> Vec<f64> {
        let mut closes = vec![90.0, 93.0, 96.0, 98.0, 100.0];
        // Decline to 80 over 10 bars, rise back to 99 over 10 bars
        closes.extend((1..=10).map(|i| 100.0 - 2.0 * i as f64));
        closes.extend((1..=10).map(|i| 80.0 + 1.9 * i as f64));
        // Handle drifts down to 95
        closes.extend([97.5, 96.0, 95.0, 96.0]);
        // Breakout
        closes.push(101.0);
        closes
    }

    #[test]
    fn test_cup_handle() {
        let closes = cup_closes();
        let points: Vec<_> = closes.iter().map(|&c| (c, c, c, c)).collect();
        let series = bars_from(&points);
        assert!(detect_series(&series).contains(PatternKey::CupHandle));
    }

    #[test]
    fn test_cup_without_breakout() {
        let mut closes = cup_closes();
        let last = closes.len() - 1;
        closes[last] = 97.0;
        let points: Vec<_> = closes.iter().map(|&c| (c, c, c, c)).collect();
        let series = bars_from(&points);
        assert!(!detect_series(&series).contains(PatternKey::CupHandle));
    }

    #[test]
    fn test_ascending_triangle() {
        // Flat tops near 50, rising bottoms 44 -> 46 -> 48
        let cycle = |low: f64| -> Vec<f64> {
            let mut v: Vec<f64> = (0..4).map(|i| 50.0 - (50.0 - low) * i as f64 / 4.0).collect();
            v.push(low);
            v.extend((1..=4).map(|i| low + (50.0 - low) * i as f64 / 4.0));
            v
        };
        let mut closes = vec![48.0, 49.0];
        closes.extend(cycle(44.0));
        closes.extend(cycle(46.0));
        closes.extend(cycle(48.0));
        closes.extend([49.5, 49.2, 49.0, 49.4]);
        let points: Vec<_> = closes.iter().map(|&c| (c, c, c, c)).collect();
        let series = bars_from(&points);

        assert!(detect_series(&series).contains(PatternKey::AscendingTriangle));
    }

    #[test]
    fn test_matches_any() {
        let matched: PatternMatch = [PatternKey::Breakout].into_iter().collect();
        assert!(matched.matches_any(&BTreeSet::new()));
        assert!(matched.matches_any(&[PatternKey::Breakout, PatternKey::GapUp].into()));
        assert!(!matched.matches_any(&[PatternKey::GapUp].into()));
    }
}
