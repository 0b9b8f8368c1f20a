//! Signal Screener
//!
//! Equity analysis and screening service. Runs technical indicators, chart
//! pattern detection, relative strength and market regime over daily bars,
//! scores each symbol, screens whole universes through a single-flight cache
//! and turns ranked candidates into sized trading plans.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Provider   │──▶│   Fetcher    │──▶│   Analysis   │──▶│   Screener   │
//! │ (Polygon /   │   │ (rate limit, │   │ (indicators, │   │ (pool, cache,│
//! │  in-memory)  │   │  retry, bars)│   │  patterns,   │   │  scheduler)  │
//! └──────────────┘   └──────────────┘   │  RS, score)  │   └──────┬───────┘
//!                                       └──────────────┘          │
//!                                              plans ◀────────────┘
//! ```

pub mod analysis;
pub mod data;
pub mod error;
pub mod indicators;
pub mod market;
pub mod patterns;
pub mod plan;
pub mod portfolio;
pub mod routes;
pub mod scoring;
pub mod screener;
pub mod watchlist;

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    routing::{delete, get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use signal_common::Config;

use crate::analysis::AnalysisReport;
use crate::data::{
    BarCacheStats, InMemoryProvider, MarketDataFetcher, MarketDataProvider, PolygonProvider,
    ResearchDocument, ResearchKind, SharedClock, SystemClock, Universe,
};
use crate::error::Result;
use crate::market::{MarketContext, ReferenceData};
use crate::plan::{build_plan, PlanStore, PlanSummary, TradingPlan, TradingPlanConfig};
use crate::portfolio::{PortfolioPerformance, PositionFeed, StaticPositionFeed};
use crate::screener::{
    CacheKey, CacheStats, RecommendationHistory, RecommendationScheduler, RecommendationSnapshot,
    RefreshJob, ScreenFilter, ScreenResult, ScreenerEngine, SchedulerStatus, ScreeningCache,
};
use crate::watchlist::{normalize_symbol, Watchlist, WatchlistEntry};

pub use error::ScreenerError;

/// A named universe the service can screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub ticker: String,
    pub universe: String,
}

/// Screening cache and bar cache counters.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceCacheStats {
    pub screening: CacheStats,
    pub bars: BarCacheStats,
    pub scheduler: Option<SchedulerStatus>,
}

/// Shared state behind every operation.
pub struct ScreenerState {
    pub config: Arc<Config>,
    pub fetcher: Arc<MarketDataFetcher>,
    pub engine: ScreenerEngine,
    pub cache: ScreeningCache,
    pub clock: SharedClock,
    pub plans: PlanStore,
    pub watchlist: Watchlist,
    pub history: RecommendationHistory,
    pub positions: Arc<dyn PositionFeed>,
    scheduler: RwLock<Option<Arc<RecommendationScheduler>>>,
}

impl ScreenerState {
    pub fn new(config: Config, provider: Arc<dyn MarketDataProvider>, clock: SharedClock) -> Self {
        let fetcher = Arc::new(MarketDataFetcher::new(provider, &config.market_data));
        let positions: Arc<dyn PositionFeed> =
            Arc::new(StaticPositionFeed::from_config(&config.portfolio));
        let cache = ScreeningCache::new(config.screener.snapshot_dir.clone());
        let history = RecommendationHistory::new(config.screener.history_limit);
        let config = Arc::new(config);
        let engine = ScreenerEngine::new(Arc::clone(&fetcher), Arc::clone(&config));

        Self {
            config,
            fetcher,
            engine,
            cache,
            clock,
            plans: PlanStore::new(),
            watchlist: Watchlist::new(),
            history,
            positions,
            scheduler: RwLock::new(None),
        }
    }

    /// Build state with the provider named in `market_data.provider`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let provider = select_provider(&config)?;
        Ok(Self::new(config, provider, Arc::new(SystemClock)))
    }

    /// Override the per-symbol and whole-scan deadlines.
    pub fn with_timeouts(mut self, symbol_timeout: Duration, scan_timeout: Duration) -> Self {
        self.engine = self.engine.with_timeouts(symbol_timeout, scan_timeout);
        self
    }

    pub fn with_position_feed(mut self, feed: Arc<dyn PositionFeed>) -> Self {
        self.positions = feed;
        self
    }

    /// Trading date according to the service clock.
    pub fn trading_date(&self) -> NaiveDate {
        self.clock.trading_date()
    }

    /// Full single-symbol report.
    pub async fn analyze(&self, symbol: &str) -> Result<AnalysisReport> {
        let symbol = normalize_symbol(symbol)?;
        let as_of = self.trading_date();

        let series = self.fetcher.bars(&symbol, as_of).await?;
        let meta = self.fetcher.meta(&symbol, as_of).await?;
        let reference = ReferenceData::load(&self.fetcher, &self.config.market_data, as_of).await;

        AnalysisReport::build(&meta, &series, &reference, &self.config.analysis)
    }

    /// Screen `universe`, served from the cache when the same filter already
    /// ran for the current trading date.
    pub async fn screen(&self, universe: Universe, filter: ScreenFilter) -> Result<ScreenResult> {
        filter.validate()?;
        let as_of = self.trading_date();
        let key = CacheKey::new(&universe, &filter, as_of);
        let engine = self.engine.clone();

        self.cache
            .get_or_compute(key, move || async move {
                engine.run(&universe, &filter, as_of).await
            })
            .await
    }

    /// Top-N positively scored entries of the all-universe screen with the
    /// default filter. A day's snapshot is recorded when the scan is fresh or
    /// nothing was recorded for that date yet, so cache hits keep the
    /// original `recorded_at`.
    pub async fn recommendations(&self) -> Result<ScreenResult> {
        let mut result = self.screen(Universe::All, ScreenFilter::default()).await?;
        result.entries.retain(|e| e.score.value > 0.0);
        let result = result.top(self.config.screener.recommendations_top_n);

        if !result.served_from_cache || !self.history.contains(result.as_of).await {
            self.history.record(result.as_of, result.entries.clone()).await;
        }
        Ok(result)
    }

    /// Recorded recommendation snapshots, newest first.
    pub async fn recommendation_history(&self) -> Vec<RecommendationSnapshot> {
        self.history.list().await
    }

    /// Provider research document. Per-symbol kinds require `symbol`;
    /// market-wide kinds ignore it.
    pub async fn research(
        &self,
        kind: ResearchKind,
        symbol: Option<&str>,
    ) -> Result<ResearchDocument> {
        let symbol = match (kind.is_per_symbol(), symbol) {
            (true, Some(symbol)) => Some(normalize_symbol(symbol)?),
            (true, None) => {
                return Err(ScreenerError::InvalidSymbol(format!("{} requires a symbol", kind)))
            }
            (false, _) => None,
        };
        let data = self.fetcher.research(kind, symbol.as_deref()).await?;

        Ok(ResearchDocument {
            kind,
            symbol,
            provider: self.fetcher.provider_name().to_string(),
            fetched_at: Utc::now(),
            data,
        })
    }

    pub async fn market_context(&self) -> MarketContext {
        let as_of = self.trading_date();
        let reference = ReferenceData::load(&self.fetcher, &self.config.market_data, as_of).await;
        MarketContext::from_reference(&reference, as_of, &self.config.analysis.regime)
    }

    /// Screen, size and store a trading plan.
    pub async fn create_plan(&self, plan_config: TradingPlanConfig) -> Result<TradingPlan> {
        plan_config.validate()?;
        let screen = self
            .screen(plan_config.universe.clone(), plan_config.filter.clone())
            .await?;
        let plan = build_plan(&plan_config, &screen, &self.config.analysis.plan)?;
        self.plans.insert(plan.clone()).await;
        Ok(plan)
    }

    pub async fn get_plan(&self, id: &str) -> Result<TradingPlan> {
        self.plans.get(id).await
    }

    pub async fn list_plans(&self) -> Vec<PlanSummary> {
        self.plans.list().await
    }

    pub async fn delete_plan(&self, id: &str) -> Result<()> {
        self.plans.delete(id).await
    }

    pub async fn portfolio_performance(&self) -> Result<PortfolioPerformance> {
        portfolio::performance(self.positions.as_ref(), &self.fetcher, self.trading_date()).await
    }

    pub async fn watchlist_add(&self, symbol: &str) -> Result<WatchlistEntry> {
        self.watchlist.add(symbol).await
    }

    pub async fn watchlist_list(&self) -> Vec<WatchlistEntry> {
        self.watchlist.list().await
    }

    pub async fn watchlist_remove(&self, symbol: &str) -> Result<()> {
        self.watchlist.remove(symbol).await
    }

    /// Configured named universes, plus `all`.
    pub fn indices(&self) -> Vec<IndexInfo> {
        self.config
            .screener
            .indices
            .iter()
            .map(|(name, ticker)| IndexInfo {
                name: name.clone(),
                ticker: ticker.clone(),
                universe: Universe::Index(name.clone()).to_string(),
            })
            .collect()
    }

    pub async fn cache_stats(&self) -> ServiceCacheStats {
        let scheduler = match self.scheduler.read().await.as_ref() {
            Some(scheduler) => Some(scheduler.status().await),
            None => None,
        };
        ServiceCacheStats {
            screening: self.cache.stats(),
            bars: self.fetcher.cache_stats(),
            scheduler,
        }
    }

    /// Abort every in-flight scan.
    pub fn cancel_scans(&self) -> Result<usize> {
        self.cache.cancel_all()
    }
}

/// Pick the market data provider from configuration.
fn select_provider(config: &Config) -> anyhow::Result<Arc<dyn MarketDataProvider>> {
    let market_data = &config.market_data;
    match market_data.provider.as_str() {
        "memory" => {
            let provider = match market_data.fixture_path.as_deref() {
                Some(path) => InMemoryProvider::from_fixture(path)
                    .with_context(|| format!("Failed to load fixture {}", path.display()))?,
                None => {
                    warn!("In-memory provider without a fixture, every symbol will be unavailable");
                    InMemoryProvider::new()
                }
            };
            Ok(Arc::new(provider))
        }
        "polygon" => {
            let provider = PolygonProvider::from_config(market_data)
                .context("Polygon provider requires market_data.api_key or POLYGON_API_KEY")?;
            Ok(Arc::new(provider))
        }
        other => anyhow::bail!("Unknown market data provider '{}'", other),
    }
}

/// Scheduled warm-up of the recommendation cache.
struct RecommendationRefresh {
    state: Arc<ScreenerState>,
}

#[async_trait]
impl RefreshJob for RecommendationRefresh {
    async fn refresh(&self) -> Result<ScreenResult> {
        self.state.recommendations().await
    }
}

/// HTTP service.
pub struct ScreenerService {
    state: Arc<ScreenerState>,
}

impl ScreenerService {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(Self::with_state(Arc::new(ScreenerState::from_config(config)?)))
    }

    pub fn with_state(state: Arc<ScreenerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ScreenerState> {
        &self.state
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/api/v1/indices", get(routes::indices))
            .route("/api/v1/analyze/:symbol", get(routes::analyze))
            .route("/api/v1/screen", post(routes::screen))
            .route("/api/v1/recommendations", get(routes::recommendations))
            .route("/api/v1/alerts/latest", get(routes::recommendations))
            .route(
                "/api/v1/recommendations/history",
                get(routes::recommendation_history),
            )
            .route("/api/v1/market/context", get(routes::market_context))
            .route("/api/v1/fundamentals/:symbol", get(routes::fundamentals))
            .route("/api/v1/earnings/calendar", get(routes::earnings_calendar))
            .route("/api/v1/earnings/:symbol", get(routes::earnings))
            .route("/api/v1/news/:symbol", get(routes::news))
            .route(
                "/api/v1/options/:symbol/open_interest",
                get(routes::options_open_interest),
            )
            .route(
                "/api/v1/plans",
                post(routes::create_plan).get(routes::list_plans),
            )
            .route(
                "/api/v1/plans/:id",
                get(routes::get_plan).delete(routes::delete_plan),
            )
            .route(
                "/api/v1/portfolio/performance",
                get(routes::portfolio_performance),
            )
            .route(
                "/api/v1/watchlist",
                get(routes::watchlist_list).post(routes::watchlist_add),
            )
            .route("/api/v1/watchlist/:symbol", delete(routes::watchlist_remove))
            .route("/api/v1/admin/cache", get(routes::cache_stats))
            .route("/api/v1/admin/cancel", post(routes::cancel_scans))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.state.config.screener.scan_timeout_secs + 5,
            )))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.state))
    }

    /// Start the refresh scheduler (when enabled) and serve HTTP.
    pub async fn start(&self) -> anyhow::Result<()> {
        let config = &self.state.config;

        if config.screener.refresh_enabled {
            let job = Arc::new(RecommendationRefresh {
                state: Arc::clone(&self.state),
            });
            let scheduler = Arc::new(
                RecommendationScheduler::new(&config.screener.refresh_cron, job)
                    .context("Invalid screener.refresh_cron")?,
            );
            info!(
                cron = %config.screener.refresh_cron,
                next_run = ?scheduler.next_run(),
                "Recommendation refresh enabled"
            );
            *self.state.scheduler.write().await = Some(Arc::clone(&scheduler));
            scheduler.spawn();
        }

        let app = self.router();
        let addr: SocketAddr = format!("{}:{}", config.bind_address(), config.screener_port())
            .parse()
            .context("Invalid bind address")?;

        info!(
            %addr,
            provider = self.state.fetcher.provider_name(),
            indices = config.screener.indices.len(),
            "Signal screener listening"
        );

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
