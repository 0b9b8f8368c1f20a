//! Polygon.io REST adapter.
//!
//! Endpoints used:
//! - `/v2/aggs/ticker/{symbol}/range/1/day/{from}/{to}` for daily bars
//! - `/v3/reference/tickers/{symbol}` for name, market cap and SIC code
//! - `/v3/reference/index_constituents?symbol={index}` for index membership
//!   (paginated through `next_url`)
//!
//! Research documents are returned as the raw response body:
//! - fundamentals: `/v3/reference/tickers/{symbol}`
//! - earnings: `/vX/reference/financials?ticker={symbol}` (quarterly)
//! - earnings calendar: `/v1/calendar/earnings`
//! - news: `/v2/reference/news?ticker={symbol}`
//! - options open interest: `/v3/snapshot/options/{symbol}`

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use signal_common::config::MarketDataConfig;

use super::{Bar, MarketDataProvider, ProviderError, ResearchKind, SymbolMeta};

/// Upper bound on constituent pages followed for a single index.
const MAX_CONSTITUENT_PAGES: usize = 50;

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Vec<AggregateBar>,
}

#[derive(Debug, Deserialize)]
struct AggregateBar {
    /// Session start, Unix milliseconds
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: Option<TickerDetails>,
}

#[derive(Debug, Deserialize)]
struct TickerDetails {
    ticker: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    sic_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConstituentsResponse {
    #[serde(default)]
    results: Vec<Constituent>,
    #[serde(default)]
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Constituent {
    ticker: String,
}

// ============================================================================
// Adapter
// ============================================================================

/// Polygon.io market data adapter.
pub struct PolygonProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl PolygonProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Create from config. Returns `None` when no API key is configured.
    pub fn from_config(config: &MarketDataConfig) -> Option<Self> {
        let api_key = config.api_key.as_deref().filter(|k| !k.is_empty())?;
        Some(Self::new(
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        ))
    }

    fn with_key(&self, url: &str) -> String {
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{}{}apiKey={}", url, sep, self.api_key)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        debug!(url = %url, "Fetching from Polygon");

        let response = self
            .client
            .get(self.with_key(url))
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network("Request timeout".into())
                } else if e.is_connect() {
                    ProviderError::Network("Connection failed".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl MarketDataProvider for PolygonProvider {
    fn name(&self) -> &'static str {
        "polygon"
    }

    async fn daily_bars(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?adjusted=true&sort=asc&limit=5000",
            self.base_url, symbol, from, to
        );
        let response: AggregatesResponse = self.get_json(&url).await?;
        parse_aggregates(response)
    }

    async fn symbol_meta(&self, symbol: &str) -> Result<SymbolMeta, ProviderError> {
        let url = format!("{}/v3/reference/tickers/{}", self.base_url, symbol);
        let response: TickerDetailsResponse = self.get_json(&url).await?;
        let details = response
            .results
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no details for {}", symbol)))?;

        let sector = details
            .sic_code
            .as_deref()
            .and_then(|code| code.parse::<u32>().ok())
            .and_then(sector_from_sic)
            .map(String::from);

        Ok(SymbolMeta {
            symbol: details.ticker,
            name: details.name,
            sector,
            market_cap: details.market_cap,
        })
    }

    async fn constituents(&self, index: &str) -> Result<Vec<String>, ProviderError> {
        let mut url = format!(
            "{}/v3/reference/index_constituents?symbol={}",
            self.base_url, index
        );
        let mut tickers = Vec::new();

        for _ in 0..MAX_CONSTITUENT_PAGES {
            let page: ConstituentsResponse = self.get_json(&url).await?;
            tickers.extend(page.results.into_iter().map(|c| c.ticker));
            match page.next_url {
                Some(next) => url = next,
                None => break,
            }
        }

        if tickers.is_empty() {
            return Err(ProviderError::DataNotAvailable(format!(
                "no constituents for {}",
                index
            )));
        }
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }

    async fn research(
        &self,
        kind: ResearchKind,
        symbol: Option<&str>,
    ) -> Result<serde_json::Value, ProviderError> {
        let url = research_url(&self.base_url, kind, symbol)?;
        self.get_json(&url).await
    }
}

fn research_url(
    base_url: &str,
    kind: ResearchKind,
    symbol: Option<&str>,
) -> Result<String, ProviderError> {
    let require = || {
        symbol.ok_or_else(|| ProviderError::InvalidRequest(format!("{} requires a symbol", kind)))
    };
    let url = match kind {
        ResearchKind::Fundamentals => format!("{}/v3/reference/tickers/{}", base_url, require()?),
        ResearchKind::Earnings => format!(
            "{}/vX/reference/financials?ticker={}&timeframe=quarterly&limit=8",
            base_url,
            require()?
        ),
        ResearchKind::EarningsCalendar => format!("{}/v1/calendar/earnings", base_url),
        ResearchKind::News => format!(
            "{}/v2/reference/news?ticker={}&order=desc&limit=50",
            base_url,
            require()?
        ),
        ResearchKind::OptionsOpenInterest => {
            format!("{}/v3/snapshot/options/{}?limit=250", base_url, require()?)
        }
    };
    Ok(url)
}

fn parse_aggregates(response: AggregatesResponse) -> Result<Vec<Bar>, ProviderError> {
    response
        .results
        .into_iter()
        .map(|agg| {
            let date = DateTime::from_timestamp_millis(agg.t)
                .ok_or_else(|| ProviderError::Internal(format!("Invalid timestamp: {}", agg.t)))?
                .date_naive();
            Ok(Bar {
                date,
                open: agg.o,
                high: agg.h,
                low: agg.l,
                close: agg.c,
                volume: agg.v,
            })
        })
        .collect()
}

/// Map an SEC SIC code to a GICS-style sector name.
fn sector_from_sic(code: u32) -> Option<&'static str> {
    let sector = match code {
        1000..=1299 | 1400..=1499 => "Materials",
        1300..=1399 | 2900..=2999 => "Energy",
        1500..=1799 => "Industrials",
        2000..=2199 => "Consumer Staples",
        2830..=2836 => "Health Care",
        2800..=2829 | 2837..=2899 | 3300..=3399 => "Materials",
        3570..=3579 | 3600..=3699 | 7370..=7379 => "Technology",
        3710..=3716 | 5200..=5399 | 5500..=5999 => "Consumer Discretionary",
        3840..=3851 | 8000..=8099 => "Health Care",
        3400..=3569 | 3580..=3599 | 3700..=3799 | 4000..=4799 => "Industrials",
        4800..=4899 => "Communication Services",
        4900..=4999 => "Utilities",
        5400..=5499 => "Consumer Staples",
        6500..=6553 | 6798 => "Real Estate",
        6000..=6799 => "Financials",
        _ => return None,
    };
    Some(sector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aggregates() {
        let json = r#"{
            "ticker": "AAPL",
            "status": "OK",
            "results": [
                {"v": 1000, "o": 10, "c": 10.5, "h": 11, "l": 9.5, "t": 1704171600000},
                {"v": 1200, "o": 10.5, "c": 11, "h": 11.2, "l": 10.1, "t": 1704258000000}
            ]
        }"#;
        let response: AggregatesResponse = serde_json::from_str(json).unwrap();
        let bars = parse_aggregates(response).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[1].close, 11.0);
    }

    #[test]
    fn test_empty_results() {
        let response: AggregatesResponse =
            serde_json::from_str(r#"{"status": "OK", "resultsCount": 0}"#).unwrap();
        assert!(parse_aggregates(response).unwrap().is_empty());
    }

    #[test]
    fn test_sector_from_sic() {
        assert_eq!(sector_from_sic(3571), Some("Technology"));
        assert_eq!(sector_from_sic(2834), Some("Health Care"));
        assert_eq!(sector_from_sic(6022), Some("Financials"));
        assert_eq!(sector_from_sic(6798), Some("Real Estate"));
        assert_eq!(sector_from_sic(4911), Some("Utilities"));
        assert_eq!(sector_from_sic(9999), None);
    }

    #[test]
    fn test_api_key_appended() {
        let provider = PolygonProvider::new("k", "https://api.polygon.io/", Duration::from_secs(1));
        assert_eq!(provider.base_url, "https://api.polygon.io");
        assert_eq!(provider.with_key("https://x/a?b=1"), "https://x/a?b=1&apiKey=k");
        assert_eq!(provider.with_key("https://x/a"), "https://x/a?apiKey=k");
    }

    #[test]
    fn test_research_urls() {
        let base = "https://api.polygon.io";
        assert_eq!(
            research_url(base, ResearchKind::Fundamentals, Some("AAPL")).unwrap(),
            "https://api.polygon.io/v3/reference/tickers/AAPL"
        );
        assert!(research_url(base, ResearchKind::News, Some("AAPL"))
            .unwrap()
            .contains("/v2/reference/news?ticker=AAPL"));
        assert_eq!(
            research_url(base, ResearchKind::EarningsCalendar, None).unwrap(),
            "https://api.polygon.io/v1/calendar/earnings"
        );
        assert!(matches!(
            research_url(base, ResearchKind::OptionsOpenInterest, None),
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = MarketDataConfig::default();
        assert!(PolygonProvider::from_config(&config).is_none());
        config.api_key = Some("abc".into());
        assert!(PolygonProvider::from_config(&config).is_some());
    }
}
