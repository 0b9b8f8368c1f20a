//! Composite scoring.
//!
//! A score starts at zero and accumulates one term per contributing signal:
//! matched patterns, indicator zones, trend position, volume and relative
//! strength. Absent indicators contribute nothing. Each term leaves a
//! rationale string.

pub mod insights;

use serde::{Deserialize, Serialize};

use signal_common::config::ScoringWeights;

use crate::indicators::IndicatorSet;
use crate::market::RelativeStrength;
use crate::patterns::PatternMatch;

/// Conviction tier derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConvictionTier {
    Low,
    Moderate,
    High,
}

impl ConvictionTier {
    pub fn from_score(value: f64, weights: &ScoringWeights) -> Self {
        if value >= weights.high_tier {
            Self::High
        } else if value >= weights.moderate_tier {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::High => {
                "Strong technical setup with multiple confirming signals. Favorable risk/reward."
            }
            Self::Moderate => "Mixed signals. Proceed with caution and tight risk management.",
            Self::Low => "Poor technical alignment. Wait for a better setup.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub value: f64,
    pub tier: ConvictionTier,
    /// One entry per contributing term, in evaluation order
    pub rationale: Vec<String>,
}

struct ScoreBuilder {
    value: f64,
    rationale: Vec<String>,
}

impl ScoreBuilder {
    fn add(&mut self, points: f64, reason: String) {
        if points == 0.0 {
            return;
        }
        self.value += points;
        self.rationale.push(format!("{} ({:+.1})", reason, points));
    }
}

/// Score one symbol.
pub fn score(
    indicators: &IndicatorSet,
    patterns: &PatternMatch,
    rs: &RelativeStrength,
    weights: &ScoringWeights,
) -> Score {
    let mut b = ScoreBuilder {
        value: 0.0,
        rationale: Vec::new(),
    };

    for key in patterns.iter() {
        let weight = weights.patterns.get(key.as_str()).copied().unwrap_or(0.0);
        b.add(weight, format!("{}: {}", key, key.description()));
    }

    if let Some(rsi) = indicators.rsi {
        if (weights.rsi_favorable_low..=weights.rsi_favorable_high).contains(&rsi) {
            b.add(
                weights.rsi_favorable_points,
                format!("RSI {:.1} in favorable zone", rsi),
            );
        } else if rsi >= weights.rsi_overbought {
            b.add(-weights.rsi_overbought_penalty, format!("RSI {:.1} overbought", rsi));
        }
    }

    if let Some(hist) = indicators.macd_histogram {
        if hist > 0.0 {
            b.add(weights.macd_positive_points, "MACD histogram positive".to_string());
            if indicators.macd_histogram_prev.is_some_and(|prev| hist > prev) {
                b.add(weights.macd_rising_points, "MACD momentum rising".to_string());
            }
        }
    }

    if let Some(adx) = indicators.adx {
        if adx > weights.adx_trend_threshold {
            b.add(weights.adx_points, format!("ADX {:.1} confirms trend strength", adx));
        }
    }

    if let (Some(close), Some(sma50)) = (indicators.close, indicators.sma50) {
        if close > sma50 {
            b.add(weights.above_sma50_points, "price above 50-day average".to_string());
        }
    }

    if let Some(volume) = indicators.volume {
        if volume.spike {
            b.add(
                weights.volume_spike_points,
                format!("volume spike ({:.1}x average)", volume.ratio),
            );
        }
    }

    if rs.outperforms_benchmark() {
        match rs.outperforms_sector() {
            Some(true) => b.add(
                weights.relative_strength_points,
                "outperforming benchmark and sector".to_string(),
            ),
            None => b.add(
                weights.relative_strength_points / 2.0,
                "outperforming benchmark".to_string(),
            ),
            Some(false) => {}
        }
    }

    Score {
        value: b.value,
        tier: ConvictionTier::from_score(b.value, weights),
        rationale: b.rationale,
    }
}
