//! Configuration management for the signal screener service.
//!
//! The service reads a single configuration file at
//! `~/.signal-screener/config.json`. Every section is optional and falls back
//! to defaults, so an empty file (or no file at all) yields a runnable setup.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (see below)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SIGNAL_SCREENER_CONFIG_DIR` → directory holding `config.json`
//! - `SIGNAL_SCREENER_PORT` → services.screener.port
//! - `SIGNAL_SCREENER_BIND` → network.bind
//! - `SIGNAL_SCREENER_LOG_LEVEL` → observability.log_level
//! - `POLYGON_API_KEY` → market_data.api_key

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SIGNAL_SCREENER_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".signal-screener"),
        |dirs| dirs.home_dir().join(".signal-screener"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Global network configuration (bind address)
    #[serde(default)]
    pub network: NetworkConfig,

    /// Service port configuration
    #[serde(default)]
    pub services: ServicesConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Market data provider configuration
    #[serde(default)]
    pub market_data: MarketDataConfig,

    /// Screening runtime configuration (concurrency, timeouts, schedule)
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Analysis parameters (thresholds, weights, plan defaults)
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Static portfolio snapshot used for performance reports
    #[serde(default)]
    pub portfolio: PortfolioConfig,
}

impl Config {
    /// Load configuration from the default path, then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("SIGNAL_SCREENER_PORT") {
            if let Ok(p) = port.parse() {
                self.services.screener.port = Some(p);
            }
        }

        if let Ok(bind) = std::env::var("SIGNAL_SCREENER_BIND") {
            self.network.bind = bind;
        }

        if let Ok(level) = std::env::var("SIGNAL_SCREENER_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(key) = std::env::var("POLYGON_API_KEY") {
            if !key.is_empty() {
                self.market_data.api_key = Some(key);
            }
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.network.bind
    }

    pub fn screener_port(&self) -> u16 {
        self.services.screener.port.unwrap_or(4434)
    }
}

// ============================================================================
// Network & Services
// ============================================================================

/// Global network configuration.
///
/// Default bind address is `127.0.0.1` (local only).
/// Set to `0.0.0.0` to allow remote access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

/// Service port configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServicesConfig {
    #[serde(default)]
    pub screener: ServicePortConfig,
}

/// Individual service port configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServicePortConfig {
    #[serde(default)]
    pub port: Option<u16>,
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets forced to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Market Data
// ============================================================================

/// Market data provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// Provider name: "polygon" or "memory"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Provider API key (Polygon)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Provider REST base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// JSON fixture loaded by the in-memory provider
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,

    /// Request budget per minute (token bucket)
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Total attempts per request, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Calendar days of daily history requested per symbol
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Benchmark symbol for relative strength and regime
    #[serde(default = "default_benchmark_symbol")]
    pub benchmark_symbol: String,

    /// Volatility index symbol (VIX level is its latest close)
    #[serde(default = "default_volatility_symbol")]
    pub volatility_symbol: String,

    /// Sector name → sector ETF symbol
    #[serde(default = "default_sector_etfs")]
    pub sector_etfs: BTreeMap<String, String>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: default_base_url(),
            fixture_path: None,
            requests_per_minute: default_requests_per_minute(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            history_days: default_history_days(),
            benchmark_symbol: default_benchmark_symbol(),
            volatility_symbol: default_volatility_symbol(),
            sector_etfs: default_sector_etfs(),
        }
    }
}

fn default_provider() -> String {
    "polygon".into()
}

fn default_base_url() -> String {
    "https://api.polygon.io".into()
}

fn default_requests_per_minute() -> u32 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_history_days() -> u32 {
    400
}

fn default_benchmark_symbol() -> String {
    "SPY".into()
}

fn default_volatility_symbol() -> String {
    "I:VIX".into()
}

fn default_sector_etfs() -> BTreeMap<String, String> {
    [
        ("Technology", "XLK"),
        ("Financials", "XLF"),
        ("Health Care", "XLV"),
        ("Energy", "XLE"),
        ("Consumer Discretionary", "XLY"),
        ("Consumer Staples", "XLP"),
        ("Industrials", "XLI"),
        ("Utilities", "XLU"),
        ("Materials", "XLB"),
        ("Real Estate", "XLRE"),
        ("Communication Services", "XLC"),
    ]
    .into_iter()
    .map(|(sector, etf)| (sector.to_string(), etf.to_string()))
    .collect()
}

// ============================================================================
// Screener Runtime
// ============================================================================

/// Screening runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Worker pool size for per-symbol analysis
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-symbol analysis timeout
    #[serde(default = "default_symbol_timeout_secs")]
    pub symbol_timeout_secs: u64,

    /// Whole-scan timeout
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Entries kept in the recommendations list
    #[serde(default = "default_recommendations_top_n")]
    pub recommendations_top_n: usize,

    /// Whether the scheduled recommendations refresh runs
    #[serde(default = "default_true")]
    pub refresh_enabled: bool,

    /// Cron expression (with seconds, UTC) for the recommendations refresh
    #[serde(default = "default_refresh_cron")]
    pub refresh_cron: String,

    /// Recommendation snapshots kept in history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Directory for on-disk scan snapshots (disabled when unset)
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,

    /// Named universe → provider index ticker
    #[serde(default = "default_indices")]
    pub indices: BTreeMap<String, String>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            symbol_timeout_secs: default_symbol_timeout_secs(),
            scan_timeout_secs: default_scan_timeout_secs(),
            recommendations_top_n: default_recommendations_top_n(),
            refresh_enabled: true,
            refresh_cron: default_refresh_cron(),
            history_limit: default_history_limit(),
            snapshot_dir: None,
            indices: default_indices(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    8
}

fn default_symbol_timeout_secs() -> u64 {
    30
}

fn default_scan_timeout_secs() -> u64 {
    4 * 60 * 60
}

fn default_recommendations_top_n() -> usize {
    20
}

fn default_refresh_cron() -> String {
    // 21:30 UTC on weekdays, after the US close
    "0 30 21 * * Mon-Fri".into()
}

fn default_history_limit() -> usize {
    30
}

fn default_indices() -> BTreeMap<String, String> {
    [("nasdaq", "NDX"), ("sp500", "SPX"), ("dow", "DJI")]
        .into_iter()
        .map(|(name, ticker)| (name.to_string(), ticker.to_string()))
        .collect()
}

// ============================================================================
// Analysis Parameters
// ============================================================================

/// Analysis parameters. All fields are calibratable defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub indicators: IndicatorConfig,

    #[serde(default)]
    pub patterns: PatternThresholds,

    #[serde(default)]
    pub scoring: ScoringWeights,

    #[serde(default)]
    pub regime: RegimeThresholds,

    #[serde(default)]
    pub relative_strength: RelativeStrengthConfig,

    #[serde(default)]
    pub plan: PlanDefaults,
}

/// Indicator engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Bars scanned for the Fibonacci swing high/low
    #[serde(default = "default_fibonacci_lookback")]
    pub fibonacci_lookback: usize,

    /// Volume ratio at or above which today's volume counts as a spike
    #[serde(default = "default_volume_spike_ratio")]
    pub volume_spike_ratio: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            fibonacci_lookback: default_fibonacci_lookback(),
            volume_spike_ratio: default_volume_spike_ratio(),
        }
    }
}

fn default_fibonacci_lookback() -> usize {
    60
}

fn default_volume_spike_ratio() -> f64 {
    2.0
}

/// Pattern detector thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternThresholds {
    /// Minimum gap above the previous close (percent)
    #[serde(default = "default_gap_up_pct")]
    pub gap_up_pct: f64,

    /// Prior bars whose highs the close must exceed
    #[serde(default = "default_breakout_lookback")]
    pub breakout_lookback: usize,

    /// Consecutive higher closes for momentum
    #[serde(default = "default_momentum_streak")]
    pub momentum_streak: usize,

    /// Prior bars in the momentum volume average
    #[serde(default = "default_momentum_volume_lookback")]
    pub momentum_volume_lookback: usize,

    #[serde(default = "default_oversold_rsi_low")]
    pub oversold_rsi_low: f64,

    #[serde(default = "default_oversold_rsi_high")]
    pub oversold_rsi_high: f64,

    /// Distance from SMA20 that still counts as support (percent)
    #[serde(default = "default_pullback_tolerance_pct")]
    pub pullback_tolerance_pct: f64,

    /// Bars in the volume trend window
    #[serde(default = "default_accumulation_window")]
    pub accumulation_window: usize,

    /// Largest price decline over the window still treated as flat (percent)
    #[serde(default = "default_accumulation_flat_pct")]
    pub accumulation_flat_pct: f64,

    #[serde(default = "default_base_lookback")]
    pub base_lookback: usize,

    /// Maximum high/low range of a base (percent of the low)
    #[serde(default = "default_base_max_range_pct")]
    pub base_max_range_pct: f64,

    /// Bars on each side a swing high/low must dominate
    #[serde(default = "default_swing_radius")]
    pub swing_radius: usize,

    #[serde(default = "default_cup_lookback")]
    pub cup_lookback: usize,

    #[serde(default = "default_cup_min_depth_pct")]
    pub cup_min_depth_pct: f64,

    #[serde(default = "default_cup_max_depth_pct")]
    pub cup_max_depth_pct: f64,

    /// Maximum difference between the two rims (percent)
    #[serde(default = "default_cup_rim_tolerance_pct")]
    pub cup_rim_tolerance_pct: f64,

    /// Largest handle pullback as a fraction of cup depth
    #[serde(default = "default_cup_handle_max_retrace")]
    pub cup_handle_max_retrace: f64,

    #[serde(default = "default_triangle_lookback")]
    pub triangle_lookback: usize,

    /// Maximum spread between swing highs forming resistance (percent)
    #[serde(default = "default_triangle_resistance_tolerance_pct")]
    pub triangle_resistance_tolerance_pct: f64,

    /// Maximum distance of the close below resistance (percent)
    #[serde(default = "default_triangle_proximity_pct")]
    pub triangle_proximity_pct: f64,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            gap_up_pct: default_gap_up_pct(),
            breakout_lookback: default_breakout_lookback(),
            momentum_streak: default_momentum_streak(),
            momentum_volume_lookback: default_momentum_volume_lookback(),
            oversold_rsi_low: default_oversold_rsi_low(),
            oversold_rsi_high: default_oversold_rsi_high(),
            pullback_tolerance_pct: default_pullback_tolerance_pct(),
            accumulation_window: default_accumulation_window(),
            accumulation_flat_pct: default_accumulation_flat_pct(),
            base_lookback: default_base_lookback(),
            base_max_range_pct: default_base_max_range_pct(),
            swing_radius: default_swing_radius(),
            cup_lookback: default_cup_lookback(),
            cup_min_depth_pct: default_cup_min_depth_pct(),
            cup_max_depth_pct: default_cup_max_depth_pct(),
            cup_rim_tolerance_pct: default_cup_rim_tolerance_pct(),
            cup_handle_max_retrace: default_cup_handle_max_retrace(),
            triangle_lookback: default_triangle_lookback(),
            triangle_resistance_tolerance_pct: default_triangle_resistance_tolerance_pct(),
            triangle_proximity_pct: default_triangle_proximity_pct(),
        }
    }
}

fn default_gap_up_pct() -> f64 {
    2.0
}
fn default_breakout_lookback() -> usize {
    20
}
fn default_momentum_streak() -> usize {
    3
}
fn default_momentum_volume_lookback() -> usize {
    20
}
fn default_oversold_rsi_low() -> f64 {
    25.0
}
fn default_oversold_rsi_high() -> f64 {
    40.0
}
fn default_pullback_tolerance_pct() -> f64 {
    2.0
}
fn default_accumulation_window() -> usize {
    10
}
fn default_accumulation_flat_pct() -> f64 {
    1.0
}
fn default_base_lookback() -> usize {
    15
}
fn default_base_max_range_pct() -> f64 {
    8.0
}
fn default_swing_radius() -> usize {
    3
}
fn default_cup_lookback() -> usize {
    60
}
fn default_cup_min_depth_pct() -> f64 {
    12.0
}
fn default_cup_max_depth_pct() -> f64 {
    35.0
}
fn default_cup_rim_tolerance_pct() -> f64 {
    5.0
}
fn default_cup_handle_max_retrace() -> f64 {
    0.5
}
fn default_triangle_lookback() -> usize {
    40
}
fn default_triangle_resistance_tolerance_pct() -> f64 {
    1.5
}
fn default_triangle_proximity_pct() -> f64 {
    3.0
}

/// Scorer weights and tier thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Pattern key → points when matched
    #[serde(default = "default_pattern_weights")]
    pub patterns: BTreeMap<String, f64>,

    #[serde(default = "default_rsi_favorable_low")]
    pub rsi_favorable_low: f64,

    #[serde(default = "default_rsi_favorable_high")]
    pub rsi_favorable_high: f64,

    #[serde(default = "default_rsi_favorable_points")]
    pub rsi_favorable_points: f64,

    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,

    #[serde(default = "default_rsi_overbought_penalty")]
    pub rsi_overbought_penalty: f64,

    #[serde(default = "default_macd_positive_points")]
    pub macd_positive_points: f64,

    #[serde(default = "default_macd_rising_points")]
    pub macd_rising_points: f64,

    #[serde(default = "default_adx_trend_threshold")]
    pub adx_trend_threshold: f64,

    #[serde(default = "default_adx_points")]
    pub adx_points: f64,

    #[serde(default = "default_above_sma50_points")]
    pub above_sma50_points: f64,

    #[serde(default = "default_volume_spike_points")]
    pub volume_spike_points: f64,

    /// Bonus when outperforming benchmark and sector
    #[serde(default = "default_relative_strength_points")]
    pub relative_strength_points: f64,

    #[serde(default = "default_high_tier")]
    pub high_tier: f64,

    #[serde(default = "default_moderate_tier")]
    pub moderate_tier: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            patterns: default_pattern_weights(),
            rsi_favorable_low: default_rsi_favorable_low(),
            rsi_favorable_high: default_rsi_favorable_high(),
            rsi_favorable_points: default_rsi_favorable_points(),
            rsi_overbought: default_rsi_overbought(),
            rsi_overbought_penalty: default_rsi_overbought_penalty(),
            macd_positive_points: default_macd_positive_points(),
            macd_rising_points: default_macd_rising_points(),
            adx_trend_threshold: default_adx_trend_threshold(),
            adx_points: default_adx_points(),
            above_sma50_points: default_above_sma50_points(),
            volume_spike_points: default_volume_spike_points(),
            relative_strength_points: default_relative_strength_points(),
            high_tier: default_high_tier(),
            moderate_tier: default_moderate_tier(),
        }
    }
}

fn default_pattern_weights() -> BTreeMap<String, f64> {
    [
        ("gap_up", 4.0),
        ("breakout", 6.0),
        ("momentum", 5.0),
        ("oversold_bounce", 4.0),
        ("pullback_support", 4.0),
        ("volume_accumulation", 4.0),
        ("base_building", 3.0),
        ("cup_handle", 7.0),
        ("ascending_triangle", 6.0),
    ]
    .into_iter()
    .map(|(key, weight)| (key.to_string(), weight))
    .collect()
}
fn default_rsi_favorable_low() -> f64 {
    40.0
}
fn default_rsi_favorable_high() -> f64 {
    65.0
}
fn default_rsi_favorable_points() -> f64 {
    3.0
}
fn default_rsi_overbought() -> f64 {
    70.0
}
fn default_rsi_overbought_penalty() -> f64 {
    3.0
}
fn default_macd_positive_points() -> f64 {
    3.0
}
fn default_macd_rising_points() -> f64 {
    2.0
}
fn default_adx_trend_threshold() -> f64 {
    25.0
}
fn default_adx_points() -> f64 {
    3.0
}
fn default_above_sma50_points() -> f64 {
    3.0
}
fn default_volume_spike_points() -> f64 {
    3.0
}
fn default_relative_strength_points() -> f64 {
    4.0
}
fn default_high_tier() -> f64 {
    20.0
}
fn default_moderate_tier() -> f64 {
    10.0
}

/// Market regime thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeThresholds {
    /// Volatility index level below which markets count as calm
    #[serde(default = "default_calm_volatility")]
    pub calm_volatility: f64,

    /// Volatility index level above which markets count as stressed
    #[serde(default = "default_stress_volatility")]
    pub stress_volatility: f64,

    /// Fraction of sectors that must be up over 20 days for RISK_ON
    #[serde(default = "default_breadth_majority")]
    pub breadth_majority: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            calm_volatility: default_calm_volatility(),
            stress_volatility: default_stress_volatility(),
            breadth_majority: default_breadth_majority(),
        }
    }
}

fn default_calm_volatility() -> f64 {
    18.0
}
fn default_stress_volatility() -> f64 {
    25.0
}
fn default_breadth_majority() -> f64 {
    0.5
}

/// Relative-strength windows (in bars).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativeStrengthConfig {
    #[serde(default = "default_rs_window")]
    pub window: usize,

    #[serde(default = "default_beta_window")]
    pub beta_window: usize,
}

impl Default for RelativeStrengthConfig {
    fn default() -> Self {
        Self {
            window: default_rs_window(),
            beta_window: default_beta_window(),
        }
    }
}

fn default_rs_window() -> usize {
    20
}
fn default_beta_window() -> usize {
    60
}

/// One rung of the profit-target ladder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LadderRung {
    /// Target distance in multiples of the initial risk (entry − stop)
    pub r_multiple: f64,
    /// Share of the position sold at this target (percent)
    pub allocation_pct: f64,
}

/// Trading plan builder defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDefaults {
    /// ATR multiple subtracted from entry for the volatility stop
    #[serde(default = "default_atr_stop_multiplier")]
    pub atr_stop_multiplier: f64,

    /// Stop distance (percent) used when ATR is unavailable
    #[serde(default = "default_fallback_stop_pct")]
    pub fallback_stop_pct: f64,

    /// Profit-target ladder; allocations must sum to 100
    #[serde(default = "default_ladder")]
    pub ladder: Vec<LadderRung>,

    /// Trailing stop distance as a percent of the current price
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: f64,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            atr_stop_multiplier: default_atr_stop_multiplier(),
            fallback_stop_pct: default_fallback_stop_pct(),
            ladder: default_ladder(),
            trailing_stop_pct: default_trailing_stop_pct(),
        }
    }
}

fn default_atr_stop_multiplier() -> f64 {
    2.0
}
fn default_fallback_stop_pct() -> f64 {
    8.0
}
fn default_ladder() -> Vec<LadderRung> {
    vec![
        LadderRung {
            r_multiple: 1.0,
            allocation_pct: 30.0,
        },
        LadderRung {
            r_multiple: 2.0,
            allocation_pct: 40.0,
        },
        LadderRung {
            r_multiple: 3.0,
            allocation_pct: 30.0,
        },
    ]
}
fn default_trailing_stop_pct() -> f64 {
    10.0
}

// ============================================================================
// Portfolio
// ============================================================================

/// Portfolio snapshot configuration (read-only position feed).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PortfolioConfig {
    #[serde(default)]
    pub positions: Vec<PositionEntry>,
}

/// A held position as reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionEntry {
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
}
