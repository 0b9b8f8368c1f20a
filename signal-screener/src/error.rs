//! Error taxonomy for the screening pipeline.
//!
//! `ScreenerError` is `Clone` because a single failed scan is delivered to
//! every caller coalesced onto it.

use thiserror::Error;

/// Result type alias for screening operations.
pub type Result<T> = std::result::Result<T, ScreenerError>;

/// Errors surfaced by screening, analysis and planning operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScreenerError {
    /// Missing or insufficient history for a symbol
    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Provider could not be reached after retries
    #[error("Market data provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider throttled the request after retries
    #[error("Rate limited by market data provider")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Filter rejected before orchestration
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Malformed ticker
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Plan configuration rejected before orchestration
    #[error("Invalid plan configuration: {0}")]
    InvalidPlan(String),

    /// The filtered universe produced no usable candidates
    #[error("No candidates matched the screening filter")]
    NoCandidates,

    /// Unknown plan, universe or watchlist entry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Scan aborted by an administrative cancel
    #[error("Scan cancelled")]
    ScanCancelled,

    /// Operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScreenerError {
    pub fn data_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited { .. } | Self::Timeout(_)
        )
    }

    /// Stable machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::InvalidSymbol(_) => "invalid_symbol",
            Self::InvalidPlan(_) => "invalid_plan",
            Self::NoCandidates => "no_candidates",
            Self::NotFound(_) => "not_found",
            Self::ScanCancelled => "scan_cancelled",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidFilter(_) | Self::InvalidSymbol(_) | Self::InvalidPlan(_) => 400,
            Self::DataUnavailable { .. } | Self::NotFound(_) => 404,
            Self::ScanCancelled => 409,
            Self::NoCandidates => 422,
            Self::RateLimited { .. } => 429,
            Self::ProviderUnavailable(_) => 503,
            Self::Timeout(_) => 504,
            Self::Internal(_) => 500,
        }
    }
}

impl From<signal_common::Error> for ScreenerError {
    fn from(err: signal_common::Error) -> Self {
        match err.status_code() {
            404 => Self::NotFound(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ScreenerError::InvalidFilter("x".into()).status_code(), 400);
        assert_eq!(ScreenerError::NoCandidates.status_code(), 422);
        assert_eq!(
            ScreenerError::RateLimited {
                retry_after_secs: None
            }
            .status_code(),
            429
        );
        assert_eq!(ScreenerError::ProviderUnavailable("down".into()).status_code(), 503);
        assert_eq!(ScreenerError::data_unavailable("AAPL", "no bars").status_code(), 404);
    }

    #[test]
    fn test_no_candidates_is_distinct() {
        let err = ScreenerError::NoCandidates;
        assert_eq!(err.kind(), "no_candidates");
        assert!(!err.is_retryable());
        assert_ne!(err, ScreenerError::Internal("no candidates".into()));
    }

    #[test]
    fn test_retryable() {
        assert!(ScreenerError::ProviderUnavailable("x".into()).is_retryable());
        assert!(ScreenerError::Timeout("AAPL".into()).is_retryable());
        assert!(!ScreenerError::InvalidFilter("x".into()).is_retryable());
    }
}
