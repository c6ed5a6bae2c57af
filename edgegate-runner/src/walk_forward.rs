//! Walk-forward validation — chronological train/test splits over trades.
//!
//! The first `train_fraction` of trades seeds the in-sample (train) window.
//! The remainder is cut into `n_folds` contiguous out-of-sample (test)
//! blocks; each fold trains on everything before its block. A material drop
//! from train to test Sharpe or PnL-per-trade flags overfitting.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{mean_f64, sharpe_ratio, total_pnl};
use crate::trade::BacktestTrade;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub n_folds: usize,
    /// Share of trades in the initial train window.
    pub train_fraction: f64,
    pub min_train_trades: usize,
    pub min_test_trades: usize,
    /// Test metric may fall this far below train (as a fraction) before flagging.
    pub max_divergence: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            n_folds: 3,
            train_fraction: 0.7,
            min_train_trades: 10,
            min_test_trades: 3,
            max_divergence: 0.5,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Trade index ranges for one fold, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    pub fold_index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold_index: usize,
    pub train_sharpe: f64,
    pub test_sharpe: f64,
    pub train_pnl_per_trade: f64,
    pub test_pnl_per_trade: f64,
    pub train_trades: usize,
    pub test_trades: usize,
}

/// How the degradation ratio was computed (or why it wasn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationFlag {
    /// Train Sharpe >= 0.1, ratio computed normally.
    Normal,
    /// Train Sharpe in [0, 0.1), difference (test - train) used instead.
    LowTrainSharpe,
    /// Train Sharpe negative, ratio skipped.
    NegativeTrainSharpe,
    /// Train Sharpe positive but test Sharpe negative: clamped to 0.0.
    FailedTest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub folds: Vec<FoldResult>,
    pub mean_train_sharpe: f64,
    pub mean_test_sharpe: f64,
    pub mean_train_pnl_per_trade: f64,
    pub mean_test_pnl_per_trade: f64,
    /// Mean test Sharpe / mean train Sharpe. None when not computable.
    pub degradation_ratio: Option<f64>,
    pub degradation_flag: DegradationFlag,
    /// Divergence in [0, 1]: 0 when test holds up, 1 when it collapses.
    pub divergence: f64,
    pub overfit: bool,
}

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("insufficient data: {trades} trades < minimum {min_trades}")]
    InsufficientData { trades: usize, min_trades: usize },
    #[error("fold creation failed: cannot fit {n_folds} folds in {trades} trades")]
    FoldCreationFailed { n_folds: usize, trades: usize },
    #[error("invalid walk-forward config: {0}")]
    InvalidConfig(String),
}

// ─── Fold creation ───────────────────────────────────────────────────

/// Expanding-window folds over `total` chronologically ordered trades.
///
/// - Fold 0: train = [0 .. base], test = [base .. base + block]
/// - Fold 1: train = [0 .. base + block], test = next block
///
/// The last fold absorbs the remainder so every trade after `base` is tested.
pub fn create_folds(total: usize, config: &WalkForwardConfig) -> Result<Vec<FoldSpec>, WalkForwardError> {
    if config.n_folds == 0 {
        return Err(WalkForwardError::InvalidConfig("n_folds must be at least 1".into()));
    }
    if !(config.train_fraction > 0.0 && config.train_fraction < 1.0) {
        return Err(WalkForwardError::InvalidConfig(
            "train_fraction must be in (0, 1)".into(),
        ));
    }
    let min_total = config.min_train_trades + config.min_test_trades * config.n_folds;
    if total < min_total {
        return Err(WalkForwardError::InsufficientData {
            trades: total,
            min_trades: min_total,
        });
    }

    let base = ((total as f64 * config.train_fraction).floor() as usize).max(config.min_train_trades);
    let block = total.saturating_sub(base) / config.n_folds;
    if block < config.min_test_trades.max(1) {
        return Err(WalkForwardError::FoldCreationFailed {
            n_folds: config.n_folds,
            trades: total,
        });
    }

    let folds = (0..config.n_folds)
        .map(|i| {
            let train_end = base + i * block;
            let test_end = if i + 1 == config.n_folds {
                total
            } else {
                train_end + block
            };
            FoldSpec {
                fold_index: i,
                train_start: 0,
                train_end,
                test_start: train_end,
                test_end,
            }
        })
        .collect();
    Ok(folds)
}

// ─── Orchestration ───────────────────────────────────────────────────

/// Evaluate every fold and aggregate. `trades` must be in chronological order.
pub fn run_walk_forward(
    trades: &[BacktestTrade],
    config: &WalkForwardConfig,
) -> Result<WalkForwardResult, WalkForwardError> {
    let specs = create_folds(trades.len(), config)?;
    let folds: Vec<FoldResult> = specs
        .iter()
        .map(|f| {
            let train = &trades[f.train_start..f.train_end];
            let test = &trades[f.test_start..f.test_end];
            FoldResult {
                fold_index: f.fold_index,
                train_sharpe: sharpe_ratio(train),
                test_sharpe: sharpe_ratio(test),
                train_pnl_per_trade: pnl_per_trade(train),
                test_pnl_per_trade: pnl_per_trade(test),
                train_trades: train.len(),
                test_trades: test.len(),
            }
        })
        .collect();
    Ok(compute_walk_forward_stats(folds, config.max_divergence))
}

fn pnl_per_trade(trades: &[BacktestTrade]) -> f64 {
    if trades.is_empty() {
        0.0
    } else {
        total_pnl(trades) / trades.len() as f64
    }
}

fn compute_walk_forward_stats(folds: Vec<FoldResult>, max_divergence: f64) -> WalkForwardResult {
    let collect = |f: fn(&FoldResult) -> f64| mean_f64(&folds.iter().map(f).collect::<Vec<_>>());
    let mean_train_sharpe = collect(|f| f.train_sharpe);
    let mean_test_sharpe = collect(|f| f.test_sharpe);
    let mean_train_pnl = collect(|f| f.train_pnl_per_trade);
    let mean_test_pnl = collect(|f| f.test_pnl_per_trade);

    let (degradation_ratio, degradation_flag) =
        compute_degradation_ratio(mean_train_sharpe, mean_test_sharpe);

    let sharpe_divergence = match (degradation_flag, degradation_ratio) {
        (DegradationFlag::Normal | DegradationFlag::FailedTest, Some(r)) => 1.0 - r.clamp(0.0, 1.0),
        (DegradationFlag::LowTrainSharpe, Some(diff)) => (-diff).clamp(0.0, 1.0),
        _ => 1.0,
    };
    let pnl_divergence = if mean_train_pnl > 0.0 {
        (1.0 - mean_test_pnl / mean_train_pnl).clamp(0.0, 1.0)
    } else if mean_test_pnl > 0.0 {
        0.0
    } else {
        1.0
    };

    let pnl_collapsed = mean_train_pnl > 0.0 && pnl_divergence > max_divergence;
    let sharpe_collapsed = match degradation_flag {
        DegradationFlag::FailedTest => true,
        DegradationFlag::Normal => sharpe_divergence > max_divergence,
        DegradationFlag::LowTrainSharpe | DegradationFlag::NegativeTrainSharpe => false,
    };

    WalkForwardResult {
        folds,
        mean_train_sharpe,
        mean_test_sharpe,
        mean_train_pnl_per_trade: mean_train_pnl,
        mean_test_pnl_per_trade: mean_test_pnl,
        degradation_ratio,
        degradation_flag,
        divergence: sharpe_divergence.max(pnl_divergence),
        overfit: sharpe_collapsed || pnl_collapsed,
    }
}

/// Degradation ratio with edge-case handling.
///
/// - train >= 0.1: ratio = test / train (Normal)
/// - train in [0, 0.1): difference = test - train (LowTrainSharpe)
/// - train < 0: skipped (NegativeTrainSharpe)
/// - train >= 0.1 but test < 0: clamped to 0.0 (FailedTest)
fn compute_degradation_ratio(train: f64, test: f64) -> (Option<f64>, DegradationFlag) {
    if train < 0.0 {
        (None, DegradationFlag::NegativeTrainSharpe)
    } else if train < 0.1 {
        (Some(test - train), DegradationFlag::LowTrainSharpe)
    } else if test < 0.0 {
        (Some(0.0), DegradationFlag::FailedTest)
    } else {
        (Some(test / train), DegradationFlag::Normal)
    }
}
