//! Trading configuration: sizing, risk limits, execution, decision thresholds.
//!
//! Loaded from TOML. Every section has defaults so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::domain::ExecutionMode;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Which probability derivation the sizer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityModel {
    /// p = price + edge × confidence
    ConfidenceWeighted,
    /// p = price + edge, stake scaled by confidence
    EdgeOverImplied,
}

/// Position sizer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub kelly_fraction: f64,
    pub probability_model: ProbabilityModel,
    /// Hard per-trade ceiling in USDC.
    pub max_trade_usdc: f64,
    /// Total exposure allowed in a single market, in USDC.
    pub per_market_cap_usdc: f64,
    /// Sizes below this are rounded to zero.
    pub min_trade_usdc: f64,
    /// Drawdown at which scaling starts to fade.
    pub drawdown_fade_start: f64,
    /// Drawdown at which size reaches zero.
    pub drawdown_fade_end: f64,
    /// Losses tolerated before the streak step-down kicks in.
    pub streak_grace: u32,
    pub streak_step: f64,
    pub streak_floor: f64,
    /// Volatility at or below which no volatility scaling applies.
    pub reference_volatility: f64,
    pub volatility_floor: f64,
    pub baseline_win_rate: f64,
    pub regime_min: f64,
    pub regime_max: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: 0.25,
            probability_model: ProbabilityModel::ConfidenceWeighted,
            max_trade_usdc: 100.0,
            per_market_cap_usdc: 250.0,
            min_trade_usdc: 1.0,
            drawdown_fade_start: 0.10,
            drawdown_fade_end: 0.30,
            streak_grace: 2,
            streak_step: 0.15,
            streak_floor: 0.25,
            reference_volatility: 0.30,
            volatility_floor: 0.25,
            baseline_win_rate: 0.50,
            regime_min: 0.5,
            regime_max: 1.25,
        }
    }
}

/// Risk gate limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    pub max_daily_loss_usdc: f64,
    pub max_open_positions: usize,
    pub per_market_cap_usdc: f64,
    /// Largest share of resting liquidity a single order may take.
    pub liquidity_fraction: f64,
    pub max_spread: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_loss_usdc: 200.0,
            max_open_positions: 10,
            per_market_cap_usdc: 250.0,
            liquidity_fraction: 0.10,
            max_spread: 0.05,
        }
    }
}

/// Execution controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub default_mode: ExecutionMode,
    /// Standing override: downgrade every live/shadow request to paper.
    pub force_paper: bool,
    pub paper_slippage_pct: f64,
    pub fee_pct: f64,
    /// Slippage assumed by shadow mode when no real quote is available.
    pub shadow_fallback_slippage_pct: f64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub fill_timeout_ms: u64,
    /// Timeout applied to each individual venue call.
    pub request_timeout_ms: u64,
    /// Minimum filled fraction for a timed-out order to count as a success.
    pub min_partial_fill_ratio: f64,
    /// Consecutive live failures that trip the kill-switch.
    pub failure_threshold: u32,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_mode: ExecutionMode::Paper,
            force_paper: false,
            paper_slippage_pct: 0.005,
            fee_pct: 0.001,
            shadow_fallback_slippage_pct: 0.02,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            poll_interval_ms: 2_000,
            fill_timeout_ms: 60_000,
            request_timeout_ms: 10_000,
            min_partial_fill_ratio: 0.5,
            failure_threshold: 3,
        }
    }
}

impl ExecutionSettings {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fill_timeout(&self) -> Duration {
        Duration::from_millis(self.fill_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Edge/confidence thresholds that classify a decision's action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    pub watch_edge: f64,
    pub trade_edge: f64,
    pub trade_confidence: f64,
    pub high_conviction_edge: f64,
    pub high_conviction_confidence: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            watch_edge: 0.02,
            trade_edge: 0.05,
            trade_confidence: 0.6,
            high_conviction_edge: 0.10,
            high_conviction_confidence: 0.8,
        }
    }
}

/// Complete trading configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub sizing: SizingConfig,
    pub risk: RiskLimits,
    pub execution: ExecutionSettings,
    pub decision: DecisionThresholds,
}

impl TradingConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.sizing;
        if !(s.kelly_fraction > 0.0 && s.kelly_fraction <= 1.0) {
            return Err(invalid("sizing.kelly_fraction", "must be in (0, 1]"));
        }
        if s.max_trade_usdc <= 0.0 {
            return Err(invalid("sizing.max_trade_usdc", "must be positive"));
        }
        if s.min_trade_usdc < 0.0 || s.min_trade_usdc > s.max_trade_usdc {
            return Err(invalid(
                "sizing.min_trade_usdc",
                "must be between 0 and max_trade_usdc",
            ));
        }
        if s.drawdown_fade_start >= s.drawdown_fade_end {
            return Err(invalid(
                "sizing.drawdown_fade_start",
                "must be below drawdown_fade_end",
            ));
        }
        if s.regime_min > s.regime_max {
            return Err(invalid("sizing.regime_min", "must not exceed regime_max"));
        }

        let r = &self.risk;
        if r.liquidity_fraction <= 0.0 || r.liquidity_fraction > 1.0 {
            return Err(invalid("risk.liquidity_fraction", "must be in (0, 1]"));
        }
        if r.max_daily_loss_usdc <= 0.0 {
            return Err(invalid("risk.max_daily_loss_usdc", "must be positive"));
        }

        let e = &self.execution;
        if e.max_retries == 0 {
            return Err(invalid("execution.max_retries", "must be at least 1"));
        }
        if e.poll_interval_ms == 0 || e.poll_interval_ms > e.fill_timeout_ms {
            return Err(invalid(
                "execution.poll_interval_ms",
                "must be positive and no longer than fill_timeout_ms",
            ));
        }
        if !(0.0..=1.0).contains(&e.min_partial_fill_ratio) {
            return Err(invalid("execution.min_partial_fill_ratio", "must be in [0, 1]"));
        }
        if e.failure_threshold == 0 {
            return Err(invalid("execution.failure_threshold", "must be at least 1"));
        }
        Ok(())
    }
}
