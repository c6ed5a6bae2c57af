//! Serializable backtest configuration.
//!
//! One TOML file carries the trading sections shared with the live process
//! (`[sizing]`, `[risk]`, `[execution]`, `[decision]`) plus the offline-only
//! `[simulation]`, `[walk_forward]` and `[monte_carlo]` sections.

use serde::{Deserialize, Serialize};
use std::path::Path;

use edgegate_core::config::{DecisionThresholds, ExecutionSettings, RiskLimits, SizingConfig};
use edgegate_core::{ConfigError, TradingConfig};

use crate::monte_carlo::MonteCarloConfig;
use crate::walk_forward::WalkForwardConfig;

/// Content hash of a backtest configuration.
pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_bankroll: f64,
    /// Fee charged on each stake, as a fraction.
    pub fee_pct: f64,
    /// Extra slippage applied on top of the VWAP fill, as a fraction.
    pub slippage_pct: f64,
    /// Candidates with fewer ticks at or before decision time are skipped.
    pub min_feature_ticks: usize,
    /// Ticks strictly after the decision used for the VWAP fill.
    pub vwap_ticks: usize,
    /// Most recent ticks kept in the feature window.
    pub feature_lookback: usize,
    /// Spread assumed when the market record does not carry one.
    pub default_spread: f64,
    /// Settled trades used for the recent win rate fed to regime scaling.
    pub recent_win_window: usize,
    pub walk_forward: bool,
    pub monte_carlo: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_bankroll: 1000.0,
            fee_pct: 0.01,
            slippage_pct: 0.005,
            min_feature_ticks: 5,
            vwap_ticks: 5,
            feature_lookback: 50,
            default_spread: 0.02,
            recent_win_window: 20,
            walk_forward: true,
            monte_carlo: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub sizing: SizingConfig,
    pub risk: RiskLimits,
    pub execution: ExecutionSettings,
    pub decision: DecisionThresholds,
    pub simulation: SimulationConfig,
    pub walk_forward: WalkForwardConfig,
    pub monte_carlo: MonteCarloConfig,
}

impl BacktestConfig {
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

    /// The sections shared with the live decision pipeline.
    pub fn trading(&self) -> TradingConfig {
        TradingConfig {
            sizing: self.sizing.clone(),
            risk: self.risk.clone(),
            execution: self.execution.clone(),
            decision: self.decision.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trading().validate()?;
        let s = &self.simulation;
        if s.initial_bankroll <= 0.0 {
            return Err(invalid("simulation.initial_bankroll", "must be positive"));
        }
        if !(0.0..1.0).contains(&s.fee_pct) {
            return Err(invalid("simulation.fee_pct", "must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&s.slippage_pct) {
            return Err(invalid("simulation.slippage_pct", "must be in [0, 1)"));
        }
        if s.vwap_ticks == 0 {
            return Err(invalid("simulation.vwap_ticks", "must be at least 1"));
        }
        if s.feature_lookback < s.min_feature_ticks.max(1) {
            return Err(invalid(
                "simulation.feature_lookback",
                "must be at least min_feature_ticks",
            ));
        }
        if !(self.walk_forward.train_fraction > 0.0 && self.walk_forward.train_fraction < 1.0) {
            return Err(invalid("walk_forward.train_fraction", "must be in (0, 1)"));
        }
        if !(self.monte_carlo.confidence > 0.0 && self.monte_carlo.confidence < 1.0) {
            return Err(invalid("monte_carlo.confidence", "must be in (0, 1)"));
        }
        Ok(())
    }

    /// Deterministic content hash: two identical configs share a run id.
    pub fn run_id(&self) -> Result<RunId, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
