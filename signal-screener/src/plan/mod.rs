//! Trading plan synthesis.
//!
//! Converts ranked screening candidates plus a capital and risk budget into
//! sized positions with stops and a profit-target ladder.
//!
//! Per candidate, in score order:
//!
//! 1. `risk = capital × risk% / 100`
//! 2. `entry = price × (1 + offset% / 100)`
//! 3. `stop = max(nearest support below entry, entry − k × ATR)`, with a fixed
//!    percentage below entry replacing the ATR term when ATR is absent
//! 4. `shares = floor(risk / (entry − stop))`; a candidate whose entry is not
//!    above its stop, or that buys zero shares, is skipped and the next one
//!    is considered
//!
//! When the sized positions together exceed the capital, every share count is
//! scaled by `capital / total` (floored) and risk is recomputed from the
//! actual shares.

mod store;

pub use store::{PlanStore, PlanSummary};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use signal_common::config::{LadderRung, PlanDefaults};

use crate::data::Universe;
use crate::error::{Result, ScreenerError};
use crate::patterns::PatternMatch;
use crate::screener::{ScreenEntry, ScreenFilter, ScreenResult, SkippedSymbol};
use crate::scoring::Score;

// ============================================================================
// Configuration
// ============================================================================

/// Caller-supplied plan parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPlanConfig {
    pub name: String,
    pub total_capital: f64,
    /// Capital risked per position (percent)
    pub risk_percentage: f64,
    pub max_positions: usize,
    /// Entry above (positive) or below (negative) the current price (percent)
    #[serde(default)]
    pub entry_offset_pct: Option<f64>,
    #[serde(default)]
    pub filter: ScreenFilter,
    #[serde(default)]
    pub universe: Universe,
}

impl TradingPlanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ScreenerError::InvalidPlan("name must not be empty".into()));
        }
        if !self.total_capital.is_finite() || self.total_capital <= 0.0 {
            return Err(ScreenerError::InvalidPlan(format!(
                "total_capital must be a positive number (got {})",
                self.total_capital
            )));
        }
        if !self.risk_percentage.is_finite()
            || self.risk_percentage <= 0.0
            || self.risk_percentage > 100.0
        {
            return Err(ScreenerError::InvalidPlan(format!(
                "risk_percentage must be in (0, 100] (got {})",
                self.risk_percentage
            )));
        }
        if self.max_positions == 0 {
            return Err(ScreenerError::InvalidPlan(
                "max_positions must be at least 1".into(),
            ));
        }
        if let Some(offset) = self.entry_offset_pct {
            if !offset.is_finite() || offset <= -100.0 {
                return Err(ScreenerError::InvalidPlan(format!(
                    "entry_offset_pct must be greater than -100 (got {})",
                    offset
                )));
            }
        }
        self.filter.validate()
    }

    /// Capital risked on each position.
    pub fn risk_amount(&self) -> f64 {
        self.total_capital * self.risk_percentage / 100.0
    }
}

// ============================================================================
// Plan Types
// ============================================================================

/// What set the stop price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBasis {
    Support,
    Atr,
    FixedPercent,
}

/// One rung of the profit ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitTarget {
    pub r_multiple: f64,
    pub price: f64,
    pub shares_to_sell: u64,
    pub allocation_pct: f64,
    pub potential_profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPosition {
    pub symbol: String,
    pub name: Option<String>,
    pub current_price: f64,
    pub suggested_entry: f64,
    pub shares: u64,
    pub position_value: f64,
    pub stop_loss: f64,
    pub stop_basis: StopBasis,
    pub risk_amount: f64,
    /// Risk as a percent of total capital
    pub risk_pct: f64,
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
    pub targets: Vec<ProfitTarget>,
    pub trailing_stop_pct: f64,
    pub patterns: PatternMatch,
    pub score: Score,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalSummary {
    pub total: f64,
    pub allocated: f64,
    pub allocation_pct: f64,
    pub cash_remaining: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPlan {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub universe: Universe,
    pub filter: ScreenFilter,
    pub capital: CapitalSummary,
    pub total_risk_amount: f64,
    /// Aggregate risk as a percent of total capital
    pub total_risk_pct: f64,
    pub positions: Vec<PlanPosition>,
    pub skipped: Vec<SkippedSymbol>,
}

// ============================================================================
// Builder
// ============================================================================

struct Sized {
    entry: f64,
    stop: f64,
    basis: StopBasis,
    shares: u64,
}

/// Size one candidate, or explain why it cannot be sized.
fn size_candidate(
    candidate: &ScreenEntry,
    config: &TradingPlanConfig,
    defaults: &PlanDefaults,
) -> std::result::Result<Sized, String> {
    let entry = candidate.price * (1.0 + config.entry_offset_pct.unwrap_or(0.0) / 100.0);
    if !entry.is_finite() || entry <= 0.0 {
        return Err(format!("invalid entry price {:.2}", entry));
    }

    let (volatility_stop, volatility_basis) = match candidate.atr {
        Some(atr) => (entry - defaults.atr_stop_multiplier * atr, StopBasis::Atr),
        None => (
            entry * (1.0 - defaults.fallback_stop_pct / 100.0),
            StopBasis::FixedPercent,
        ),
    };
    let (stop, basis) = match candidate.key_levels.support_below(entry) {
        Some(support) if support > volatility_stop => (support, StopBasis::Support),
        _ => (volatility_stop, volatility_basis),
    };

    if stop <= 0.0 {
        return Err(format!("stop {:.2} is not a positive price", stop));
    }
    if entry <= stop {
        return Err(format!("entry {:.2} is not above stop {:.2}", entry, stop));
    }

    let shares = (config.risk_amount() / (entry - stop)).floor();
    if shares < 1.0 {
        return Err(format!(
            "risk budget {:.2} buys no shares at {:.2} per share risk",
            config.risk_amount(),
            entry - stop
        ));
    }

    Ok(Sized {
        entry,
        stop,
        basis,
        shares: shares as u64,
    })
}

/// Ladder targets at `entry + r × (entry − stop)`; the last rung sells
/// whatever the earlier rungs left.
pub fn profit_ladder(entry: f64, stop: f64, shares: u64, ladder: &[LadderRung]) -> Vec<ProfitTarget> {
    let risk_per_share = entry - stop;
    let mut remaining = shares;
    ladder
        .iter()
        .enumerate()
        .map(|(i, rung)| {
            let shares_to_sell = if i + 1 == ladder.len() {
                remaining
            } else {
                let n = ((shares as f64) * rung.allocation_pct / 100.0).floor() as u64;
                n.min(remaining)
            };
            remaining -= shares_to_sell;
            let price = entry + rung.r_multiple * risk_per_share;
            ProfitTarget {
                r_multiple: rung.r_multiple,
                price,
                shares_to_sell,
                allocation_pct: rung.allocation_pct,
                potential_profit: shares_to_sell as f64 * (price - entry),
            }
        })
        .collect()
}

fn position(
    candidate: &ScreenEntry,
    sized: &Sized,
    shares: u64,
    config: &TradingPlanConfig,
    defaults: &PlanDefaults,
) -> PlanPosition {
    let risk_amount = shares as f64 * (sized.entry - sized.stop);
    PlanPosition {
        symbol: candidate.symbol.clone(),
        name: candidate.name.clone(),
        current_price: candidate.price,
        suggested_entry: sized.entry,
        shares,
        position_value: shares as f64 * sized.entry,
        stop_loss: sized.stop,
        stop_basis: sized.basis,
        risk_amount,
        risk_pct: risk_amount / config.total_capital * 100.0,
        support_levels: candidate.key_levels.supports.clone(),
        resistance_levels: candidate.key_levels.resistances.clone(),
        targets: profit_ladder(sized.entry, sized.stop, shares, &defaults.ladder),
        trailing_stop_pct: defaults.trailing_stop_pct,
        patterns: candidate.patterns.clone(),
        score: candidate.score.clone(),
    }
}

/// Build a plan from screened candidates (already in score order).
///
/// Fails with `NoCandidates` when the screen is empty or no candidate could
/// be sized.
pub fn build_plan(
    config: &TradingPlanConfig,
    screen: &ScreenResult,
    defaults: &PlanDefaults,
) -> Result<TradingPlan> {
    config.validate()?;
    if defaults.ladder.is_empty() {
        return Err(ScreenerError::InvalidPlan("profit ladder is empty".into()));
    }
    if screen.entries.is_empty() {
        return Err(ScreenerError::NoCandidates);
    }

    let mut accepted: Vec<(&ScreenEntry, Sized)> = Vec::new();
    let mut skipped = Vec::new();
    for candidate in &screen.entries {
        if accepted.len() == config.max_positions {
            break;
        }
        match size_candidate(candidate, config, defaults) {
            Ok(sized) => accepted.push((candidate, sized)),
            Err(reason) => {
                debug!(symbol = %candidate.symbol, reason = %reason, "Candidate skipped");
                skipped.push(SkippedSymbol {
                    symbol: candidate.symbol.clone(),
                    reason,
                });
            }
        }
    }

    let total_value: f64 = accepted
        .iter()
        .map(|(_, s)| s.shares as f64 * s.entry)
        .sum();
    let scale = (total_value > config.total_capital).then(|| config.total_capital / total_value);

    let mut positions = Vec::with_capacity(accepted.len());
    for (candidate, sized) in &accepted {
        let shares = match scale {
            Some(factor) => ((sized.shares as f64) * factor).floor() as u64,
            None => sized.shares,
        };
        if shares == 0 {
            skipped.push(SkippedSymbol {
                symbol: candidate.symbol.clone(),
                reason: "scaled to zero shares to fit capital".to_string(),
            });
            continue;
        }
        positions.push(position(candidate, sized, shares, config, defaults));
    }

    if positions.is_empty() {
        return Err(ScreenerError::NoCandidates);
    }

    let allocated: f64 = positions.iter().map(|p| p.position_value).sum();
    let total_risk_amount: f64 = positions.iter().map(|p| p.risk_amount).sum();
    let plan = TradingPlan {
        id: Uuid::new_v4().to_string(),
        name: config.name.clone(),
        created_at: Utc::now(),
        as_of: screen.as_of,
        universe: config.universe.clone(),
        filter: config.filter.clone(),
        capital: CapitalSummary {
            total: config.total_capital,
            allocated,
            allocation_pct: allocated / config.total_capital * 100.0,
            cash_remaining: config.total_capital - allocated,
        },
        total_risk_amount,
        total_risk_pct: total_risk_amount / config.total_capital * 100.0,
        positions,
        skipped,
    };

    info!(
        plan_id = %plan.id,
        positions = plan.positions.len(),
        skipped = plan.skipped.len(),
        allocated = plan.capital.allocated,
        scaled = scale.is_some(),
        "Trading plan built"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::KeyLevels;
    use crate::market::RelativeStrength;
    use crate::scoring::ConvictionTier;
    use proptest::prelude::*;

    fn candidate(symbol: &str, price: f64, atr: Option<f64>, supports: Vec<f64>) -> ScreenEntry {
        ScreenEntry {
            symbol: symbol.to_string(),
            name: None,
            sector: None,
            price,
            volume: 1_000_000.0,
            market_cap: None,
            patterns: PatternMatch::default(),
            score: Score {
                value: 20.0,
                tier: ConvictionTier::High,
                rationale: vec![],
            },
            volume_metrics: None,
            atr,
            sma20: None,
            sma50: None,
            nearest_support: supports.first().copied(),
            nearest_resistance: None,
            key_levels: KeyLevels {
                supports,
                resistances: vec![],
            },
            relative_strength: RelativeStrength::default(),
        }
    }

    fn screen(entries: Vec<ScreenEntry>) -> ScreenResult {
        ScreenResult {
            scan_id: "scan_test".into(),
            entries,
            as_of: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            universe: Universe::All,
            filter: ScreenFilter::default(),
            served_from_cache: false,
            scanned: 0,
            filtered_out: 0,
            skipped_count: 0,
            skipped: vec![],
            computed_at: Utc::now(),
            duration_ms: 0,
        }
    }

    fn config(capital: f64, risk: f64, max_positions: usize) -> TradingPlanConfig {
        TradingPlanConfig {
            name: "test".into(),
            total_capital: capital,
            risk_percentage: risk,
            max_positions,
            entry_offset_pct: None,
            filter: ScreenFilter::default(),
            universe: Universe::All,
        }
    }

    #[test]
    fn test_atr_stop_and_sizing() {
        // risk 1000, entry 100, stop 100 - 2*2.5 = 95 → 200 shares
        let plan = build_plan(
            &config(100_000.0, 1.0, 1),
            &screen(vec![candidate("AAA", 100.0, Some(2.5), vec![])]),
            &PlanDefaults::default(),
        )
        .unwrap();

        let p = &plan.positions[0];
        assert_eq!(p.stop_loss, 95.0);
        assert_eq!(p.stop_basis, StopBasis::Atr);
        assert_eq!(p.shares, 200);
        assert_eq!(p.position_value, 20_000.0);
        assert_eq!(p.risk_amount, 1_000.0);
    }

    #[test]
    fn test_support_above_atr_stop_wins() {
        let plan = build_plan(
            &config(100_000.0, 1.0, 1),
            &screen(vec![candidate("AAA", 100.0, Some(2.5), vec![98.0, 90.0])]),
            &PlanDefaults::default(),
        )
        .unwrap();
        assert_eq!(plan.positions[0].stop_loss, 98.0);
        assert_eq!(plan.positions[0].stop_basis, StopBasis::Support);
    }

    #[test]
    fn test_fallback_stop_without_atr() {
        let plan = build_plan(
            &config(100_000.0, 1.0, 1),
            &screen(vec![candidate("AAA", 50.0, None, vec![])]),
            &PlanDefaults::default(),
        )
        .unwrap();
        let p = &plan.positions[0];
        assert!((p.stop_loss - 46.0).abs() < 1e-9);
        assert_eq!(p.stop_basis, StopBasis::FixedPercent);
    }

    #[test]
    fn test_unsizable_candidate_skipped_for_next() {
        // ATR so large the stop goes negative
        let plan = build_plan(
            &config(100_000.0, 1.0, 1),
            &screen(vec![
                candidate("BAD", 10.0, Some(20.0), vec![]),
                candidate("GOOD", 100.0, Some(2.5), vec![]),
            ]),
            &PlanDefaults::default(),
        )
        .unwrap();
        assert_eq!(plan.positions.len(), 1);
        assert_eq!(plan.positions[0].symbol, "GOOD");
        assert_eq!(plan.skipped[0].symbol, "BAD");
    }

    #[test]
    fn test_zero_shares_skipped() {
        // risk budget 10, per-share risk 40 → zero shares
        let err = build_plan(
            &config(1_000.0, 1.0, 1),
            &screen(vec![candidate("PRICEY", 500.0, Some(20.0), vec![])]),
            &PlanDefaults::default(),
        )
        .unwrap_err();
        assert_eq!(err, ScreenerError::NoCandidates);
    }

    #[test]
    fn test_scaled_to_fit_capital() {
        // Each sizes to 200 shares × 100 = 20,000; three of them exceed 30,000
        let entries = vec![
            candidate("AAA", 100.0, Some(2.5), vec![]),
            candidate("BBB", 100.0, Some(2.5), vec![]),
            candidate("CCC", 100.0, Some(2.5), vec![]),
        ];
        let plan = build_plan(&config(30_000.0, 1.0 / 0.3, 3), &screen(entries), &PlanDefaults::default())
            .unwrap();

        assert_eq!(plan.positions.len(), 3);
        assert!(plan.capital.allocated <= 30_000.0 + 1e-6);
        for p in &plan.positions {
            assert_eq!(p.shares, 100);
            assert!((p.risk_amount - 500.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ladder_sums_to_position() {
        let targets = profit_ladder(100.0, 95.0, 101, &PlanDefaults::default().ladder);
        assert_eq!(targets.iter().map(|t| t.shares_to_sell).sum::<u64>(), 101);
        assert_eq!(targets[0].shares_to_sell, 30);
        assert_eq!(targets[1].shares_to_sell, 40);
        assert_eq!(targets[2].shares_to_sell, 31);
        assert_eq!(targets[0].price, 105.0);
        assert_eq!(targets[2].price, 115.0);
        assert_eq!(targets[1].potential_profit, 400.0);
    }

    #[test]
    fn test_empty_screen_is_no_candidates() {
        let err = build_plan(&config(10_000.0, 1.0, 5), &screen(vec![]), &PlanDefaults::default())
            .unwrap_err();
        assert_eq!(err, ScreenerError::NoCandidates);
        assert_eq!(err.kind(), "no_candidates");
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(config(0.0, 1.0, 1).validate(), Err(ScreenerError::InvalidPlan(_))));
        assert!(matches!(config(1_000.0, 0.0, 1).validate(), Err(ScreenerError::InvalidPlan(_))));
        assert!(matches!(config(1_000.0, 101.0, 1).validate(), Err(ScreenerError::InvalidPlan(_))));
        assert!(matches!(config(1_000.0, 1.0, 0).validate(), Err(ScreenerError::InvalidPlan(_))));

        let mut bad_filter = config(1_000.0, 1.0, 1);
        bad_filter.filter.min_price = Some(10.0);
        bad_filter.filter.max_price = Some(5.0);
        assert!(matches!(bad_filter.validate(), Err(ScreenerError::InvalidFilter(_))));
    }

    proptest! {
        #[test]
        fn prop_plan_respects_capital_and_risk(
            capital in 1_000.0f64..1_000_000.0,
            risk in 0.1f64..10.0,
            max_positions in 1usize..8,
            specs in prop::collection::vec((1.0f64..500.0, prop::option::of(0.01f64..20.0)), 1..12),
        ) {
            let entries: Vec<ScreenEntry> = specs
                .iter()
                .enumerate()
                .map(|(i, (price, atr))| candidate(&format!("S{:02}", i), *price, *atr, vec![]))
                .collect();
            let cfg = config(capital, risk, max_positions);
            if let Ok(plan) = build_plan(&cfg, &screen(entries), &PlanDefaults::default()) {
                let value: f64 = plan.positions.iter().map(|p| p.position_value).sum();
                let total_risk: f64 = plan.positions.iter().map(|p| p.risk_amount).sum();
                prop_assert!(value <= capital + 1e-6);
                prop_assert!(total_risk <= cfg.risk_amount() * max_positions as f64 + 1e-6);
                prop_assert!(plan.positions.len() <= max_positions);
                for p in &plan.positions {
                    prop_assert!(p.suggested_entry > p.stop_loss);
                    prop_assert_eq!(p.targets.iter().map(|t| t.shares_to_sell).sum::<u64>(), p.shares);
                }
            }
        }
    }
}
