//! Confirmed swing highs and lows.
//!
//! A bar at index `i` is a swing high when its high is at least every high in
//! the `radius` bars before it and strictly above every high in the `radius`
//! bars after it (so a plateau yields its last bar). Swing lows mirror this.
//! Bars without `radius` neighbours on both sides are never pivots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    /// Index into the slice the pivots were computed from
    pub index: usize,
    pub date: NaiveDate,
    pub price: f64,
}

pub fn swing_highs(bars: &[Bar], radius: usize) -> Vec<SwingPoint> {
    pivots(bars, radius, |b| b.high, |candidate, other| candidate > other)
}

pub fn swing_lows(bars: &[Bar], radius: usize) -> Vec<SwingPoint> {
    pivots(bars, radius, |b| b.low, |candidate, other| candidate < other)
}

fn pivots(
    bars: &[Bar],
    radius: usize,
    value: impl Fn(&Bar) -> f64,
    beats: impl Fn(f64, f64) -> bool,
) -> Vec<SwingPoint> {
    let n = bars.len();
    if radius == 0 || n < 2 * radius + 1 {
        return Vec::new();
    }

    (radius..n - radius)
        .filter_map(|i| {
            let v = value(&bars[i]);
            let left_ok = bars[i - radius..i].iter().all(|b| !beats(value(b), v));
            let right_ok = bars[i + 1..=i + radius].iter().all(|b| beats(v, value(b)));
            (left_ok && right_ok).then(|| SwingPoint {
                index: i,
                date: bars[i].date,
                price: v,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::series_from;

    #[test]
    fn test_single_peak() {
        let closes = [1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0];
        let series = series_from("X", &closes, &[1.0; 7]);
        let highs = swing_highs(series.bars(), 3);
        assert_eq!(highs.len(), 1);
        assert_eq!(highs[0].index, 3);
        assert!(swing_lows(series.bars(), 3).is_empty());
    }

    #[test]
    fn test_plateau_yields_last_bar() {
        let closes = [1.0, 2.0, 5.0, 5.0, 2.0, 1.0];
        let series = series_from("X", &closes, &[1.0; 6]);
        let highs = swing_highs(series.bars(), 2);
        assert_eq!(highs.iter().map(|p| p.index).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_unconfirmed_edge_is_ignored() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        let series = series_from("X", &closes, &[1.0; 5]);
        assert!(swing_highs(series.bars(), 2).is_empty());
    }

    #[test]
    fn test_valley() {
        let closes = [5.0, 4.0, 3.0, 4.0, 5.0];
        let series = series_from("X", &closes, &[1.0; 5]);
        let lows = swing_lows(series.bars(), 2);
        assert_eq!(lows.len(), 1);
        assert_eq!(lows[0].index, 2);
    }
}
