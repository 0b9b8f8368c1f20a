//! Market data provider abstraction.
//!
//! Defines the `MarketDataProvider` trait that every data source implements.
//! Providers are thin: throttling, retries and caching live in the fetcher.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

use super::{Bar, ResearchKind, SymbolMeta};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Authentication error (invalid or missing API key)
    Auth(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Data not available for the requested symbol or range
    DataNotAvailable(String),
    /// Provider is temporarily unavailable (5xx, maintenance)
    Unavailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Malformed response or other provider-side failure
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is transient (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }

    /// Map an HTTP status to a provider error.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Auth(format!("HTTP {}", status)),
            404 => Self::DataNotAvailable(format!("HTTP 404: {}", body)),
            429 => Self::RateLimited {
                retry_after_secs: None,
            },
            400 | 422 => Self::InvalidRequest(format!("HTTP {}: {}", status, body)),
            500..=599 => Self::Unavailable(format!("HTTP {}", status)),
            _ => Self::Internal(format!("HTTP {}: {}", status, body)),
        }
    }
}

// ============================================================================
// Market Data Provider Trait
// ============================================================================

/// Source of daily bars, symbol metadata and index membership.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Get the provider name (e.g., "polygon", "memory")
    fn name(&self) -> &'static str;

    /// Fetch daily bars for `symbol` between `from` and `to` (inclusive),
    /// ascending by date. An unknown symbol yields `DataNotAvailable`.
    async fn daily_bars(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError>;

    /// Fetch static metadata (name, sector, market cap).
    async fn symbol_meta(&self, symbol: &str) -> Result<SymbolMeta, ProviderError>;

    /// Fetch the constituent tickers of an index (provider index ticker, e.g. "NDX").
    async fn constituents(&self, index: &str) -> Result<Vec<String>, ProviderError>;

    /// Fetch a research document as raw JSON. `symbol` is `None` for
    /// market-wide documents. Providers without research data keep the default.
    async fn research(
        &self,
        kind: ResearchKind,
        _symbol: Option<&str>,
    ) -> Result<serde_json::Value, ProviderError> {
        Err(ProviderError::DataNotAvailable(format!(
            "{} is not offered by {}",
            kind,
            self.name()
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::Network("timeout".into()).is_recoverable());
        assert!(ProviderError::RateLimited {
            retry_after_secs: Some(60)
        }
        .is_recoverable());
        assert!(ProviderError::Unavailable("maintenance".into()).is_recoverable());
        assert!(!ProviderError::Auth("invalid key".into()).is_recoverable());
        assert!(!ProviderError::DataNotAvailable("no data".into()).is_recoverable());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(ProviderError::from_status(401, ""), ProviderError::Auth(_)));
        assert!(matches!(
            ProviderError::from_status(429, ""),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(503, ""),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            ProviderError::from_status(404, "unknown ticker"),
            ProviderError::DataNotAvailable(_)
        ));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert!(err.to_string().contains("30 seconds"));

        let err = ProviderError::Network("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }
}
