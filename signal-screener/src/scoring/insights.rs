//! Narrative interpretation of indicator state for analysis reports.

use serde::{Deserialize, Serialize};

use crate::indicators::{FibonacciLevels, IndicatorSet};

use super::{ConvictionTier, Score};

/// ATR above which a symbol is flagged as highly volatile.
const HIGH_VOLATILITY_ATR: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendBias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub conviction: ConvictionTier,
    pub recommendation: String,
    pub current_trend: TrendBias,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub rsi: String,
    pub macd: String,
    pub adx: String,
    pub bollinger: String,
    pub fibonacci: String,
    pub volume: String,
    pub risk_factors: Vec<String>,
    pub summary: Summary,
}

impl Insights {
    pub fn generate(
        symbol: &str,
        price: f64,
        indicators: &IndicatorSet,
        fib: Option<&FibonacciLevels>,
        score: &Score,
    ) -> Self {
        let current_trend = match indicators.macd_line {
            Some(m) if m > 0.0 => TrendBias::Bullish,
            Some(m) if m < 0.0 => TrendBias::Bearish,
            _ => TrendBias::Neutral,
        };

        Self {
            rsi: interpret_rsi(indicators.rsi),
            macd: interpret_macd(indicators.macd_line, indicators.macd_signal),
            adx: interpret_adx(indicators.adx),
            bollinger: interpret_bollinger(price, indicators),
            fibonacci: interpret_fibonacci(price, fib),
            volume: interpret_volume(indicators),
            risk_factors: risk_factors(symbol, indicators, score),
            summary: Summary {
                conviction: score.tier,
                recommendation: score.tier.recommendation().to_string(),
                current_trend,
            },
        }
    }
}

fn interpret_rsi(rsi: Option<f64>) -> String {
    let Some(rsi) = rsi else {
        return "RSI unavailable (insufficient history)".to_string();
    };
    let reading = match rsi {
        r if r >= 70.0 => "OVERBOUGHT: strong selling pressure likely; consider taking profits or waiting for a pullback",
        r if r >= 60.0 => "BULLISH: strong upward momentum approaching overbought territory",
        r if r >= 40.0 => "NEUTRAL: balanced momentum; wait for a clearer directional signal",
        r if r >= 30.0 => "BEARISH: downward momentum; look for support before entry",
        _ => "OVERSOLD: selling pressure may be exhausted; look for reversal confirmation",
    };
    format!("RSI {:.1} - {}", rsi, reading)
}

fn interpret_macd(line: Option<f64>, signal: Option<f64>) -> String {
    let Some(line) = line else {
        return "MACD unavailable (insufficient history)".to_string();
    };
    let strength = if line.abs() > 1.0 { "strong" } else { "moderate" };
    let cross = match signal {
        Some(s) if line > s => ", above signal line",
        Some(s) if line < s => ", below signal line",
        _ => "",
    };
    if line > 0.0 {
        format!("MACD {:.3} - BULLISH: {} upward momentum{}", line, strength, cross)
    } else if line < 0.0 {
        format!("MACD {:.3} - BEARISH: {} downward momentum{}", line, strength, cross)
    } else {
        format!("MACD {:.3} - NEUTRAL: momentum at equilibrium", line)
    }
}

fn interpret_adx(adx: Option<f64>) -> String {
    let Some(adx) = adx else {
        return "ADX unavailable (insufficient history)".to_string();
    };
    let reading = match adx {
        a if a >= 50.0 => "VERY STRONG TREND: high probability of continuation",
        a if a >= 25.0 => "STRONG TREND: suited to trend-following entries",
        a if a >= 20.0 => "EMERGING TREND: monitor for confirmation",
        _ => "WEAK OR NO TREND: choppy, sideways market",
    };
    format!("ADX {:.1} - {}", adx, reading)
}

fn interpret_bollinger(price: f64, indicators: &IndicatorSet) -> String {
    let Some(position) = indicators.bollinger.and_then(|b| b.position_pct(price)) else {
        return "Bollinger Bands unavailable".to_string();
    };
    let reading = match position {
        p if p >= 80.0 => "near upper band - OVERBOUGHT: pullback to the middle band likely",
        p if p >= 60.0 => "in upper zone - BULLISH: strong momentum, watch for resistance",
        p if p >= 40.0 => "near middle band - NEUTRAL",
        p if p >= 20.0 => "in lower zone - BEARISH: downward pressure with support nearby",
        _ => "near lower band - OVERSOLD: bounce toward the middle band likely",
    };
    format!("Price {} ({:.0}%)", reading, position)
}

fn interpret_fibonacci(price: f64, fib: Option<&FibonacciLevels>) -> String {
    let Some(fib) = fib else {
        return "Fibonacci levels unavailable".to_string();
    };
    let tolerance = (fib.swing_high - fib.swing_low) * 0.05;
    if let Some(level) = fib.levels.iter().find(|l| (price - l.price).abs() < tolerance) {
        return format!(
            "Price near the {} Fibonacci level (${:.2}), often acting as support or resistance",
            level.label, level.price
        );
    }
    match (fib.support_below(price), fib.resistance_above(price)) {
        (Some(below), Some(above)) => format!(
            "Price between the {} (${:.2}) and {} (${:.2}) Fibonacci levels",
            below.label, below.price, above.label, above.price
        ),
        _ => "Price outside the Fibonacci retracement range".to_string(),
    }
}

fn interpret_volume(indicators: &IndicatorSet) -> String {
    match indicators.volume {
        Some(v) => format!(
            "Volume {:.0} shares vs 20-day average {:.0} ({:.1}x){}",
            v.current,
            v.avg20,
            v.ratio,
            if v.spike { " - volume spike" } else { "" }
        ),
        None => "Volume history insufficient for analysis".to_string(),
    }
}

fn risk_factors(symbol: &str, indicators: &IndicatorSet, score: &Score) -> Vec<String> {
    let mut risks = Vec::new();

    if let Some(atr) = indicators.atr.filter(|a| *a > HIGH_VOLATILITY_ATR) {
        risks.push(format!(
            "HIGH VOLATILITY: ATR of {:.2} implies wide daily swings; size positions down",
            atr
        ));
    }
    if indicators.rsi.is_some_and(|r| !(25.0..=75.0).contains(&r)) {
        risks.push(
            "MOMENTUM EXTREME: RSI at an extreme raises reversal risk".to_string(),
        );
    }
    if indicators.adx.is_some_and(|a| a < 20.0) {
        risks.push(
            "WEAK TREND: low ADX suggests a directionless market where trend entries fail"
                .to_string(),
        );
    }
    if score.tier == ConvictionTier::Low {
        risks.push("LOW CONVICTION: poor technical alignment".to_string());
    }

    risks.push(format!(
        "NEWS SENSITIVITY: {} may react sharply to earnings or industry news",
        symbol
    ));
    risks.push(
        "MARKET CONDITIONS: broad market moves and sector rotation can override single-stock technicals"
            .to_string(),
    );
    risks.push(
        "LIQUIDITY: confirm volume supports the planned position size".to_string(),
    );
    risks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::ramp;
    use crate::indicators::{fibonacci_levels, Bollinger};

    fn low_score() -> Score {
        Score {
            value: 0.0,
            tier: ConvictionTier::Low,
            rationale: vec![],
        }
    }

    #[test]
    fn test_absent_indicators_degrade() {
        let insights = Insights::generate("AAA", 10.0, &IndicatorSet::default(), None, &low_score());
        assert!(insights.rsi.contains("unavailable"));
        assert!(insights.macd.contains("unavailable"));
        assert!(insights.fibonacci.contains("unavailable"));
        assert_eq!(insights.summary.current_trend, TrendBias::Neutral);
        assert!(insights.risk_factors.iter().any(|r| r.starts_with("LOW CONVICTION")));
    }

    #[test]
    fn test_rsi_bands() {
        assert!(interpret_rsi(Some(72.0)).contains("OVERBOUGHT"));
        assert!(interpret_rsi(Some(65.0)).contains("BULLISH"));
        assert!(interpret_rsi(Some(50.0)).contains("NEUTRAL"));
        assert!(interpret_rsi(Some(35.0)).contains("BEARISH"));
        assert!(interpret_rsi(Some(20.0)).contains("OVERSOLD"));
    }

    #[test]
    fn test_bollinger_position() {
        let ind = IndicatorSet {
            bollinger: Some(Bollinger {
                upper: 110.0,
                middle: 100.0,
                lower: 90.0,
            }),
            ..Default::default()
        };
        assert!(interpret_bollinger(109.0, &ind).contains("OVERBOUGHT"));
        assert!(interpret_bollinger(91.0, &ind).contains("OVERSOLD"));
    }

    #[test]
    fn test_fibonacci_near_level() {
        let series = ramp("X", 30, 10.0, 20.0, 1.0);
        let fib = fibonacci_levels(&series, 60).unwrap();
        let mid = fib.level(0.5).unwrap();
        assert!(interpret_fibonacci(mid, Some(&fib)).contains("50.0%"));
    }

    #[test]
    fn test_risk_factors() {
        let ind = IndicatorSet {
            atr: Some(7.5),
            rsi: Some(80.0),
            adx: Some(15.0),
            ..Default::default()
        };
        let risks = risk_factors("AAA", &ind, &low_score());
        assert!(risks[0].starts_with("HIGH VOLATILITY"));
        assert!(risks[1].starts_with("MOMENTUM EXTREME"));
        assert!(risks[2].starts_with("WEAK TREND"));
        assert!(risks.iter().any(|r| r.contains("AAA")));
    }
}
