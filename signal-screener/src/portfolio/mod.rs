//! Portfolio performance over a read-only broker position snapshot.
//!
//! Positions come from a [`PositionFeed`]; the service ships a static feed
//! built from configuration. Each holding is priced at its latest close.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use signal_common::config::PortfolioConfig;

use crate::data::MarketDataFetcher;
use crate::error::Result;
use crate::screener::SkippedSymbol;

/// A held position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
}

/// Read-only source of held positions.
#[async_trait]
pub trait PositionFeed: Send + Sync {
    fn name(&self) -> &'static str;

    async fn positions(&self) -> Result<Vec<PortfolioPosition>>;
}

/// Fixed snapshot of positions.
#[derive(Debug, Clone, Default)]
pub struct StaticPositionFeed {
    positions: Vec<PortfolioPosition>,
}

impl StaticPositionFeed {
    pub fn new(positions: Vec<PortfolioPosition>) -> Self {
        Self { positions }
    }

    pub fn from_config(config: &PortfolioConfig) -> Self {
        Self::new(
            config
                .positions
                .iter()
                .map(|p| PortfolioPosition {
                    symbol: p.symbol.to_uppercase(),
                    entry_price: p.entry_price,
                    quantity: p.quantity,
                })
                .collect(),
        )
    }
}

#[async_trait]
impl PositionFeed for StaticPositionFeed {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn positions(&self) -> Result<Vec<PortfolioPosition>> {
        Ok(self.positions.clone())
    }
}

/// One priced holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub cost_basis: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_pct: Option<f64>,
}

impl Holding {
    fn priced(position: &PortfolioPosition, current_price: f64) -> Self {
        let cost_basis = position.entry_price * position.quantity;
        let market_value = current_price * position.quantity;
        let unrealized_pnl = market_value - cost_basis;
        Self {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            entry_price: position.entry_price,
            current_price,
            cost_basis,
            market_value,
            unrealized_pnl,
            unrealized_pnl_pct: (cost_basis > 0.0).then(|| unrealized_pnl / cost_basis * 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    pub as_of: NaiveDate,
    pub source: String,
    /// Ordered by symbol
    pub holdings: Vec<Holding>,
    pub total_cost_basis: f64,
    pub total_market_value: f64,
    pub total_unrealized_pnl: f64,
    pub total_unrealized_pnl_pct: Option<f64>,
    /// Holdings without a current price, excluded from the totals
    pub unpriced: Vec<SkippedSymbol>,
}

/// Price every position at its latest close on or before `as_of`.
pub async fn performance(
    feed: &dyn PositionFeed,
    fetcher: &MarketDataFetcher,
    as_of: NaiveDate,
) -> Result<PortfolioPerformance> {
    let positions = feed.positions().await?;
    debug!(source = feed.name(), positions = positions.len(), "Pricing portfolio");

    let priced = join_all(positions.iter().map(|position| async move {
        let price = fetcher
            .bars(&position.symbol, as_of)
            .await
            .and_then(|series| {
                series.last().map(|b| b.close).ok_or_else(|| {
                    crate::error::ScreenerError::data_unavailable(&position.symbol, "no bars")
                })
            });
        (position, price)
    }))
    .await;

    let mut holdings = Vec::new();
    let mut unpriced = Vec::new();
    for (position, price) in priced {
        match price {
            Ok(price) => holdings.push(Holding::priced(position, price)),
            Err(e) => {
                warn!(symbol = %position.symbol, error = %e, "Holding could not be priced");
                unpriced.push(SkippedSymbol {
                    symbol: position.symbol.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    holdings.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    unpriced.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let total_cost_basis: f64 = holdings.iter().map(|h| h.cost_basis).sum();
    let total_market_value: f64 = holdings.iter().map(|h| h.market_value).sum();
    let total_unrealized_pnl = total_market_value - total_cost_basis;

    Ok(PortfolioPerformance {
        as_of,
        source: feed.name().to_string(),
        holdings,
        total_cost_basis,
        total_market_value,
        total_unrealized_pnl,
        total_unrealized_pnl_pct: (total_cost_basis > 0.0)
            .then(|| total_unrealized_pnl / total_cost_basis * 100.0),
        unpriced,
    })
}
