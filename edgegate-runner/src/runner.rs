//! Backtest runner — wires together simulation, metrics, calibration and validation.
//!
//! Two entry points:
//! - `run_backtest()`: pre-loaded data, no I/O.
//! - `run_backtest_from_dir()`: loads a dataset directory first. Used by the CLI.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use edgegate_core::ConfigError;

use crate::calibration::CalibrationReport;
use crate::config::{BacktestConfig, RunId};
use crate::data_loader::{load_dataset, BacktestData, LoadError};
use crate::metrics::PerformanceMetrics;
use crate::monte_carlo::{run_monte_carlo, MonteCarloResult};
use crate::robustness::{robustness_score, RobustnessScore};
use crate::simulator::{SkippedCandidate, Simulator};
use crate::trade::BacktestTrade;
use crate::walk_forward::{run_walk_forward, WalkForwardResult};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("failed to hash config: {0}")]
    RunId(#[from] serde_json::Error),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub dataset_hash: String,
    pub initial_bankroll: f64,
    pub final_bankroll: f64,
    pub metrics: PerformanceMetrics,
    pub calibration: CalibrationReport,
    pub trades: Vec<BacktestTrade>,
    pub skipped: Vec<SkippedCandidate>,
    /// Walk-forward validation, when enabled and there were enough trades.
    pub validation: Option<WalkForwardResult>,
    pub monte_carlo: Option<MonteCarloResult>,
    pub robustness: Option<RobustnessScore>,
    /// Why an enabled validation step did not run.
    #[serde(default)]
    pub warnings: Vec<String>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    /// Skipped candidates counted by reason label.
    pub fn skip_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.skipped {
            *counts.entry(s.reason.label()).or_insert(0) += 1;
        }
        counts
    }
}

pub fn run_backtest_from_dir(config: &BacktestConfig, dir: &Path) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let data = load_dataset(dir)?;
    run_backtest(config, &data)
}

/// Simulate, then compute metrics, calibration and the enabled validations.
pub fn run_backtest(config: &BacktestConfig, data: &BacktestData) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let run_id = config.run_id()?;
    let sim = Simulator::new(config.clone()).run(data);
    let initial = config.simulation.initial_bankroll;

    let metrics = PerformanceMetrics::compute(&sim.trades, initial);
    let calibration = CalibrationReport::from_trades(&sim.trades);
    let mut warnings = Vec::new();

    let validation = if config.simulation.walk_forward {
        match run_walk_forward(&sim.trades, &config.walk_forward) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "walk-forward skipped");
                warnings.push(format!("walk-forward skipped: {e}"));
                None
            }
        }
    } else {
        None
    };

    let monte_carlo = if config.simulation.monte_carlo {
        match run_monte_carlo(&sim.trades, &config.monte_carlo, &run_id) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "monte carlo skipped");
                warnings.push(format!("monte carlo skipped: {e}"));
                None
            }
        }
    } else {
        None
    };

    let robustness = (validation.is_some() || monte_carlo.is_some())
        .then(|| robustness_score(validation.as_ref(), monte_carlo.as_ref()));

    info!(
        run_id = %&run_id[..12],
        trades = metrics.trade_count,
        total_pnl = metrics.total_pnl,
        brier = calibration.brier_score,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        dataset_hash: data.dataset_hash.clone(),
        initial_bankroll: initial,
        final_bankroll: sim.final_bankroll,
        metrics,
        calibration,
        trades: sim.trades,
        skipped: sim.skipped,
        validation,
        monte_carlo,
        robustness,
        warnings,
    })
}
