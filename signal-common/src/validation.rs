//! Configuration validation.
//!
//! Checks that every configuration section holds values the service can run
//! with. Validation runs once at startup, before any component is built.

use std::str::FromStr;
use thiserror::Error;

use crate::config::{
    AnalysisConfig, Config, MarketDataConfig, ObservabilityConfig, PlanDefaults,
    RegimeThresholds, ScoringWeights, ScreenerConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.screener_port() == 0 {
            errors.push(ValidationError::InvalidPort {
                port: 0,
                field: "services.screener.port".into(),
            });
        }

        let sections: [&dyn Validate; 4] = [
            &self.observability,
            &self.market_data,
            &self.screener,
            &self.analysis,
        ];
        for section in sections {
            if let Err(e) = section.validate() {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Config {
    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load()?;
        Validate::validate(&config).map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}

impl Validate for MarketDataConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.provider.to_lowercase().as_str() {
            "polygon" => {
                if self.api_key.as_deref().map_or(true, str::is_empty) {
                    return Err(ValidationError::MissingField {
                        field: "market_data.api_key (required for polygon)".into(),
                    });
                }
            }
            "memory" => {}
            other => {
                return Err(invalid(
                    "market_data.provider",
                    format!("unknown provider '{other}', expected polygon or memory"),
                ))
            }
        }

        if self.requests_per_minute == 0 {
            return Err(invalid("market_data.requests_per_minute", "must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("market_data.max_attempts", "must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("market_data.request_timeout_secs", "must be greater than 0"));
        }
        if self.benchmark_symbol.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "market_data.benchmark_symbol".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_concurrency == 0 {
            return Err(invalid("screener.max_concurrency", "must be at least 1"));
        }
        if self.symbol_timeout_secs == 0 {
            return Err(invalid("screener.symbol_timeout_secs", "must be greater than 0"));
        }
        if self.scan_timeout_secs < self.symbol_timeout_secs {
            return Err(invalid(
                "screener.scan_timeout_secs",
                "must not be shorter than symbol_timeout_secs",
            ));
        }
        if self.recommendations_top_n == 0 {
            return Err(invalid("screener.recommendations_top_n", "must be at least 1"));
        }
        if self.refresh_enabled && cron::Schedule::from_str(&self.refresh_cron).is_err() {
            return Err(invalid(
                "screener.refresh_cron",
                format!("invalid cron expression: {}", self.refresh_cron),
            ));
        }
        if self.indices.is_empty() {
            return Err(ValidationError::MissingField {
                field: "screener.indices".into(),
            });
        }

        Ok(())
    }
}

impl Validate for AnalysisConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.indicators.fibonacci_lookback < 2 {
            return Err(invalid("analysis.indicators.fibonacci_lookback", "must be at least 2"));
        }
        if self.relative_strength.window == 0 || self.relative_strength.beta_window < 2 {
            return Err(invalid(
                "analysis.relative_strength",
                "window must be at least 1 and beta_window at least 2",
            ));
        }
        let p = &self.patterns;
        if p.oversold_rsi_low > p.oversold_rsi_high {
            return Err(invalid(
                "analysis.patterns.oversold_rsi_low",
                "must not exceed oversold_rsi_high",
            ));
        }
        if p.cup_min_depth_pct > p.cup_max_depth_pct {
            return Err(invalid(
                "analysis.patterns.cup_min_depth_pct",
                "must not exceed cup_max_depth_pct",
            ));
        }

        self.scoring.validate()?;
        self.regime.validate()?;
        self.plan.validate()
    }
}

impl Validate for ScoringWeights {
    fn validate(&self) -> ValidationResult<()> {
        if self.moderate_tier > self.high_tier {
            return Err(invalid(
                "analysis.scoring.moderate_tier",
                "must not exceed high_tier",
            ));
        }
        if self.rsi_favorable_low > self.rsi_favorable_high {
            return Err(invalid(
                "analysis.scoring.rsi_favorable_low",
                "must not exceed rsi_favorable_high",
            ));
        }
        Ok(())
    }
}

impl Validate for RegimeThresholds {
    fn validate(&self) -> ValidationResult<()> {
        if self.calm_volatility > self.stress_volatility {
            return Err(invalid(
                "analysis.regime.calm_volatility",
                "must not exceed stress_volatility",
            ));
        }
        if !(0.0..=1.0).contains(&self.breadth_majority) {
            return Err(invalid(
                "analysis.regime.breadth_majority",
                "must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

impl Validate for PlanDefaults {
    fn validate(&self) -> ValidationResult<()> {
        if self.atr_stop_multiplier <= 0.0 {
            return Err(invalid("analysis.plan.atr_stop_multiplier", "must be positive"));
        }
        if self.fallback_stop_pct <= 0.0 || self.fallback_stop_pct >= 100.0 {
            return Err(invalid(
                "analysis.plan.fallback_stop_pct",
                "must be between 0 and 100 (exclusive)",
            ));
        }
        if self.ladder.is_empty() {
            return Err(ValidationError::MissingField {
                field: "analysis.plan.ladder".into(),
            });
        }
        if self.ladder.iter().any(|r| r.r_multiple <= 0.0 || r.allocation_pct <= 0.0) {
            return Err(invalid(
                "analysis.plan.ladder",
                "r_multiple and allocation_pct must be positive",
            ));
        }
        let total: f64 = self.ladder.iter().map(|r| r.allocation_pct).sum();
        if (total - 100.0).abs() > 1e-6 {
            return Err(invalid(
                "analysis.plan.ladder",
                format!("allocations must sum to 100, got {total}"),
            ));
        }
        Ok(())
    }
}
