//! HTTP routes for the screening service.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::analysis::AnalysisReport;
use crate::data::{ResearchDocument, ResearchKind, Universe};
use crate::error::ScreenerError;
use crate::market::MarketContext;
use crate::plan::{PlanSummary, TradingPlan, TradingPlanConfig};
use crate::portfolio::PortfolioPerformance;
use crate::screener::{RecommendationSnapshot, ScreenFilter, ScreenResult};
use crate::watchlist::WatchlistEntry;
use crate::{IndexInfo, ScreenerState, ServiceCacheStats};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

/// `ScreenerError` rendered as `{error, kind}` with its status code.
#[derive(Debug)]
pub struct ApiError(pub ScreenerError);

impl From<ScreenerError> for ApiError {
    fn from(err: ScreenerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(kind = self.0.kind(), error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Unwrap a JSON body, reporting malformed input as a bad request.
fn body<T>(
    payload: Result<Json<T>, JsonRejection>,
    invalid: fn(String) -> ScreenerError,
) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError(invalid(rejection.body_text())))
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenRequest {
    #[serde(default)]
    pub universe: Universe,
    #[serde(default)]
    pub filter: ScreenFilter,
}

#[derive(Debug, Deserialize)]
pub struct WatchlistRequest {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct IndicesResponse {
    pub indices: Vec<IndexInfo>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<PlanSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct WatchlistResponse {
    pub entries: Vec<WatchlistEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub snapshots: Vec<RecommendationSnapshot>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: usize,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "signal-screener".to_string(),
    })
}

pub async fn indices(State(state): State<Arc<ScreenerState>>) -> Json<IndicesResponse> {
    let indices = state.indices();
    Json(IndicesResponse {
        count: indices.len(),
        indices,
    })
}

pub async fn analyze(
    State(state): State<Arc<ScreenerState>>,
    Path(symbol): Path<String>,
) -> ApiResult<AnalysisReport> {
    Ok(Json(state.analyze(&symbol).await?))
}

pub async fn screen(
    State(state): State<Arc<ScreenerState>>,
    payload: Result<Json<ScreenRequest>, JsonRejection>,
) -> ApiResult<ScreenResult> {
    let request = body(payload, ScreenerError::InvalidFilter)?;
    Ok(Json(state.screen(request.universe, request.filter).await?))
}

pub async fn recommendations(State(state): State<Arc<ScreenerState>>) -> ApiResult<ScreenResult> {
    Ok(Json(state.recommendations().await?))
}

pub async fn recommendation_history(
    State(state): State<Arc<ScreenerState>>,
) -> Json<HistoryResponse> {
    let snapshots = state.recommendation_history().await;
    Json(HistoryResponse {
        count: snapshots.len(),
        snapshots,
    })
}

pub async fn market_context(State(state): State<Arc<ScreenerState>>) -> Json<MarketContext> {
    Json(state.market_context().await)
}

async fn research(
    state: &ScreenerState,
    kind: ResearchKind,
    symbol: Option<&str>,
) -> ApiResult<ResearchDocument> {
    Ok(Json(state.research(kind, symbol).await?))
}

pub async fn fundamentals(
    State(state): State<Arc<ScreenerState>>,
    Path(symbol): Path<String>,
) -> ApiResult<ResearchDocument> {
    research(&state, ResearchKind::Fundamentals, Some(&symbol)).await
}

pub async fn earnings(
    State(state): State<Arc<ScreenerState>>,
    Path(symbol): Path<String>,
) -> ApiResult<ResearchDocument> {
    research(&state, ResearchKind::Earnings, Some(&symbol)).await
}

pub async fn earnings_calendar(
    State(state): State<Arc<ScreenerState>>,
) -> ApiResult<ResearchDocument> {
    research(&state, ResearchKind::EarningsCalendar, None).await
}

pub async fn news(
    State(state): State<Arc<ScreenerState>>,
    Path(symbol): Path<String>,
) -> ApiResult<ResearchDocument> {
    research(&state, ResearchKind::News, Some(&symbol)).await
}

pub async fn options_open_interest(
    State(state): State<Arc<ScreenerState>>,
    Path(symbol): Path<String>,
) -> ApiResult<ResearchDocument> {
    research(&state, ResearchKind::OptionsOpenInterest, Some(&symbol)).await
}

pub async fn create_plan(
    State(state): State<Arc<ScreenerState>>,
    payload: Result<Json<TradingPlanConfig>, JsonRejection>,
) -> Result<(StatusCode, Json<TradingPlan>), ApiError> {
    let config = body(payload, ScreenerError::InvalidPlan)?;
    let plan = state.create_plan(config).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn list_plans(State(state): State<Arc<ScreenerState>>) -> Json<PlansResponse> {
    let plans = state.list_plans().await;
    Json(PlansResponse {
        count: plans.len(),
        plans,
    })
}

pub async fn get_plan(
    State(state): State<Arc<ScreenerState>>,
    Path(id): Path<String>,
) -> ApiResult<TradingPlan> {
    Ok(Json(state.get_plan(&id).await?))
}

pub async fn delete_plan(
    State(state): State<Arc<ScreenerState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.delete_plan(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn portfolio_performance(
    State(state): State<Arc<ScreenerState>>,
) -> ApiResult<PortfolioPerformance> {
    Ok(Json(state.portfolio_performance().await?))
}

pub async fn watchlist_list(State(state): State<Arc<ScreenerState>>) -> Json<WatchlistResponse> {
    let entries = state.watchlist_list().await;
    Json(WatchlistResponse {
        count: entries.len(),
        entries,
    })
}

pub async fn watchlist_add(
    State(state): State<Arc<ScreenerState>>,
    payload: Result<Json<WatchlistRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WatchlistEntry>), ApiError> {
    let request = body(payload, ScreenerError::InvalidSymbol)?;
    let entry = state.watchlist_add(&request.symbol).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn watchlist_remove(
    State(state): State<Arc<ScreenerState>>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.watchlist_remove(&symbol).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cache_stats(State(state): State<Arc<ScreenerState>>) -> Json<ServiceCacheStats> {
    Json(state.cache_stats().await)
}

pub async fn cancel_scans(State(state): State<Arc<ScreenerState>>) -> ApiResult<CancelResponse> {
    let cancelled = state.cancel_scans()?;
    Ok(Json(CancelResponse { cancelled }))
}
