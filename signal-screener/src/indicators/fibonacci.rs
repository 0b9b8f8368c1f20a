//! Fibonacci retracement levels over a swing window.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::BarSeries;

pub const FIB_RATIOS: [f64; 7] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];

/// Which swing came first within the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Swing low precedes the swing high
    UptrendRetracement,
    /// Swing high precedes (or coincides with) the swing low
    DowntrendRetracement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibLevel {
    pub ratio: f64,
    pub label: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevels {
    pub swing_high: f64,
    pub swing_high_date: NaiveDate,
    pub swing_low: f64,
    pub swing_low_date: NaiveDate,
    pub direction: TrendDirection,
    /// One entry per ratio in [`FIB_RATIOS`], in ratio order
    pub levels: Vec<FibLevel>,
}

impl FibonacciLevels {
    pub fn level(&self, ratio: f64) -> Option<f64> {
        self.levels
            .iter()
            .find(|l| (l.ratio - ratio).abs() < 1e-9)
            .map(|l| l.price)
    }

    /// Nearest level strictly below `price`.
    pub fn support_below(&self, price: f64) -> Option<&FibLevel> {
        self.levels
            .iter()
            .filter(|l| l.price < price)
            .max_by(|a, b| a.price.total_cmp(&b.price))
    }

    /// Nearest level strictly above `price`.
    pub fn resistance_above(&self, price: f64) -> Option<&FibLevel> {
        self.levels
            .iter()
            .filter(|l| l.price > price)
            .min_by(|a, b| a.price.total_cmp(&b.price))
    }

    /// Position of `price` within the swing range, 0 at the low and 100 at the high.
    pub fn range_position_pct(&self, price: f64) -> f64 {
        (price - self.swing_low) / (self.swing_high - self.swing_low) * 100.0
    }
}

/// Levels from the highest high and lowest low of the last `lookback` bars.
///
/// Returns `None` for fewer than two bars or a flat window.
pub fn fibonacci_levels(series: &BarSeries, lookback: usize) -> Option<FibonacciLevels> {
    let bars = series.bars();
    if bars.len() < 2 || lookback < 2 {
        return None;
    }
    let window = &bars[bars.len().saturating_sub(lookback)..];

    let (high_idx, high_bar) = window
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.high.total_cmp(&b.high))?;
    let (low_idx, low_bar) = window
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.low.total_cmp(&b.low))?;

    let (high, low) = (high_bar.high, low_bar.low);
    let diff = high - low;
    if diff.is_nan() || diff <= 0.0 {
        return None;
    }

    let direction = if low_idx < high_idx {
        TrendDirection::UptrendRetracement
    } else {
        TrendDirection::DowntrendRetracement
    };

    let levels = FIB_RATIOS
        .iter()
        .map(|&ratio| {
            let price = match direction {
                TrendDirection::UptrendRetracement => low + ratio * diff,
                TrendDirection::DowntrendRetracement => high - ratio * diff,
            };
            FibLevel {
                ratio,
                label: format!("{:.1}%", ratio * 100.0),
                price,
            }
        })
        .collect();

    Some(FibonacciLevels {
        swing_high: high,
        swing_high_date: high_bar.date,
        swing_low: low,
        swing_low_date: low_bar.date,
        direction,
        levels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::{ramp, series_from};
    use proptest::prelude::*;

    #[test]
    fn test_uptrend_levels_ascend() {
        let series = ramp("X", 30, 10.0, 20.0, 100.0);
        let fib = fibonacci_levels(&series, 60).unwrap();

        assert_eq!(fib.direction, TrendDirection::UptrendRetracement);
        assert_eq!(fib.level(0.0), Some(fib.swing_low));
        assert!((fib.level(1.0).unwrap() - fib.swing_high).abs() < 1e-9);
        assert_eq!(fib.levels[3].label, "50.0%");
    }

    #[test]
    fn test_downtrend_levels_descend() {
        let series = ramp("X", 30, 20.0, 10.0, 100.0);
        let fib = fibonacci_levels(&series, 60).unwrap();

        assert_eq!(fib.direction, TrendDirection::DowntrendRetracement);
        assert_eq!(fib.level(0.0), Some(fib.swing_high));
        assert!(fib.levels[1].price < fib.levels[0].price);
    }

    #[test]
    fn test_flat_window_has_no_levels() {
        let closes = vec![10.0; 10];
        let mut series = series_from("X", &closes, &[1.0; 10]);
        series = BarSeries::new(
            "X",
            series
                .bars()
                .iter()
                .map(|b| crate::data::Bar {
                    high: 10.0,
                    low: 10.0,
                    ..*b
                })
                .collect(),
        );
        assert!(fibonacci_levels(&series, 60).is_none());
    }

    #[test]
    fn test_window_limited_to_lookback() {
        // Early spike outside a 10-bar window is ignored
        let mut closes = vec![50.0];
        closes.extend(std::iter::repeat(10.0).take(4));
        closes.extend((0..10).map(|i| 10.0 + i as f64));
        let volumes = vec![1.0; closes.len()];
        let series = series_from("X", &closes, &volumes);

        let fib = fibonacci_levels(&series, 10).unwrap();
        assert!(fib.swing_high < 20.0);
    }

    #[test]
    fn test_support_and_resistance() {
        let series = ramp("X", 30, 10.0, 20.0, 100.0);
        let fib = fibonacci_levels(&series, 60).unwrap();
        let mid = fib.level(0.5).unwrap();

        assert_eq!(fib.support_below(mid + 0.01).unwrap().ratio, 0.5);
        assert_eq!(fib.resistance_above(mid + 0.01).unwrap().ratio, 0.618);
    }

    proptest! {
        #[test]
        fn prop_levels_strictly_monotonic(closes in prop::collection::vec(1.0f64..1000.0, 2..120)) {
            let volumes = vec![1.0; closes.len()];
            let series = series_from("P", &closes, &volumes);
            if let Some(fib) = fibonacci_levels(&series, 60) {
                for pair in fib.levels.windows(2) {
                    match fib.direction {
                        TrendDirection::UptrendRetracement => prop_assert!(pair[1].price > pair[0].price),
                        TrendDirection::DowntrendRetracement => prop_assert!(pair[1].price < pair[0].price),
                    }
                }
            }
        }
    }
}
