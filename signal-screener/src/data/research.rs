//! Provider research documents.
//!
//! Fundamentals, earnings, the earnings calendar, news and options open
//! interest are passed through from the provider as JSON. They take no part
//! in scoring and are not cached, since news and open interest change during
//! the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchKind {
    Fundamentals,
    Earnings,
    EarningsCalendar,
    News,
    OptionsOpenInterest,
}

impl ResearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fundamentals => "fundamentals",
            Self::Earnings => "earnings",
            Self::EarningsCalendar => "earnings_calendar",
            Self::News => "news",
            Self::OptionsOpenInterest => "options_open_interest",
        }
    }

    /// Whether the document belongs to one symbol rather than the market.
    pub fn is_per_symbol(&self) -> bool {
        !matches!(self, Self::EarningsCalendar)
    }
}

impl fmt::Display for ResearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider document with where and when it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchDocument {
    pub kind: ResearchKind,
    pub symbol: Option<String>,
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_calendar_is_market_wide() {
        assert!(ResearchKind::Fundamentals.is_per_symbol());
        assert!(ResearchKind::OptionsOpenInterest.is_per_symbol());
        assert!(!ResearchKind::EarningsCalendar.is_per_symbol());
    }

    #[test]
    fn test_kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ResearchKind::OptionsOpenInterest).unwrap();
        assert_eq!(json, format!("\"{}\"", ResearchKind::OptionsOpenInterest));
    }
}
