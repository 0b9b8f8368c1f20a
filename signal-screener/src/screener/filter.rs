//! Screening filter: validation, predicates and the canonical cache key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

use crate::data::Universe;
use crate::error::{Result, ScreenerError};
use crate::patterns::{PatternKey, PatternMatch};

/// Numeric and pattern predicates applied to every symbol in a scan.
///
/// Unset bounds do not filter. A symbol passes the pattern predicate when it
/// matches at least one requested pattern (or none are requested).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenFilter {
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Minimum volume of the latest bar
    #[serde(default)]
    pub min_volume: Option<f64>,
    #[serde(default)]
    pub min_market_cap: Option<f64>,
    #[serde(default)]
    pub max_market_cap: Option<f64>,
    #[serde(default)]
    pub patterns: BTreeSet<PatternKey>,
}

impl ScreenFilter {
    /// Reject non-finite, negative or inverted bounds. Values are never clamped.
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("min_price", self.min_price),
            ("max_price", self.max_price),
            ("min_volume", self.min_volume),
            ("min_market_cap", self.min_market_cap),
            ("max_market_cap", self.max_market_cap),
        ];
        for (name, value) in bounds {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ScreenerError::InvalidFilter(format!(
                        "{} must be a finite number",
                        name
                    )));
                }
                if v < 0.0 {
                    return Err(ScreenerError::InvalidFilter(format!(
                        "{} must not be negative (got {})",
                        name, v
                    )));
                }
            }
        }

        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(ScreenerError::InvalidFilter(format!(
                    "min_price {} exceeds max_price {}",
                    min, max
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_market_cap, self.max_market_cap) {
            if min > max {
                return Err(ScreenerError::InvalidFilter(format!(
                    "min_market_cap {} exceeds max_market_cap {}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    /// Market cap predicate. An unknown market cap fails any cap bound.
    pub fn passes_market_cap(&self, market_cap: Option<f64>) -> bool {
        if self.min_market_cap.is_none() && self.max_market_cap.is_none() {
            return true;
        }
        let Some(cap) = market_cap else {
            return false;
        };
        self.min_market_cap.map_or(true, |min| cap >= min)
            && self.max_market_cap.map_or(true, |max| cap <= max)
    }

    pub fn passes_price_volume(&self, price: f64, volume: f64) -> bool {
        self.min_price.map_or(true, |min| price >= min)
            && self.max_price.map_or(true, |max| price <= max)
            && self.min_volume.map_or(true, |min| volume >= min)
    }

    pub fn passes_patterns(&self, matched: &PatternMatch) -> bool {
        matched.matches_any(&self.patterns)
    }

    /// Hex SHA-256 over the universe and a fixed-order rendering of every
    /// field. Equal filters always hash equally; `-0.0` is normalized.
    pub fn canonical_hash(&self, universe: &Universe) -> String {
        let num = |v: Option<f64>| match v {
            Some(x) if x == 0.0 => "0".to_string(),
            Some(x) => format!("{:?}", x),
            None => "-".to_string(),
        };
        let patterns: Vec<&str> = self.patterns.iter().map(|p| p.as_str()).collect();
        let canonical = format!(
            "universe={};min_price={};max_price={};min_volume={};min_market_cap={};max_market_cap={};patterns={}",
            universe,
            num(self.min_price),
            num(self.max_price),
            num(self.min_volume),
            num(self.min_market_cap),
            num(self.max_market_cap),
            patterns.join(",")
        );
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

/// Screening cache key: canonical filter hash plus trading date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub filter_hash: String,
    pub trading_date: NaiveDate,
}

impl CacheKey {
    pub fn new(universe: &Universe, filter: &ScreenFilter, trading_date: NaiveDate) -> Self {
        Self {
            filter_hash: filter.canonical_hash(universe),
            trading_date,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.trading_date, self.filter_hash)
    }
}
