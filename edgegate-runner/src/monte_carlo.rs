//! Monte Carlo validation — resample the trade set with replacement.
//!
//! Each simulation draws `n` trades from the `n` observed, replays them in
//! draw order, and records total PnL, max drawdown and win rate. Simulations
//! run in parallel; simulation `i` seeds its own `StdRng` from the master seed
//! so the distribution is identical for any thread count.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::metrics::{max_drawdown_of, mean_f64, std_dev};
use crate::rng::RngHierarchy;
use crate::trade::BacktestTrade;

const STREAM: &str = "monte_carlo";

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub n_simulations: usize,
    pub seed: u64,
    /// Two-sided confidence level for the reported intervals.
    pub confidence: f64,
    pub min_trades: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_simulations: 1000,
            seed: 42,
            confidence: 0.95,
            min_trades: 5,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Summary of one simulated quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
}

impl Distribution {
    fn from_samples(mut samples: Vec<f64>, confidence: f64) -> Self {
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let tail = (1.0 - confidence) / 2.0 * 100.0;
        Self {
            mean: mean_f64(&samples),
            std_dev: std_dev(&samples),
            median: percentile_sorted(&samples, 50.0),
            ci_lower: percentile_sorted(&samples, tail),
            ci_upper: percentile_sorted(&samples, 100.0 - tail),
            min: samples.first().copied().unwrap_or(0.0),
            max: samples.last().copied().unwrap_or(0.0),
        }
    }

    pub fn ci_width(&self) -> f64 {
        self.ci_upper - self.ci_lower
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub n_simulations: usize,
    pub sample_size: usize,
    pub confidence: f64,
    pub total_pnl: Distribution,
    pub max_drawdown: Distribution,
    pub win_rate: Distribution,
    /// Share of simulations ending with positive total PnL.
    pub probability_of_profit: f64,
}

impl MonteCarloResult {
    /// PnL interval width relative to the magnitude of the mean outcome.
    pub fn relative_ci_width(&self) -> f64 {
        let scale = self.total_pnl.mean.abs().max(self.total_pnl.std_dev).max(1e-9);
        self.total_pnl.ci_width() / scale
    }
}

#[derive(Debug, Error)]
pub enum MonteCarloError {
    #[error("insufficient data: {trades} trades < minimum {min_trades}")]
    InsufficientData { trades: usize, min_trades: usize },
    #[error("invalid monte carlo config: {0}")]
    InvalidConfig(String),
}

// ─── Simulation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Sample {
    total_pnl: f64,
    max_drawdown: f64,
    win_rate: f64,
}

fn simulate_once<R: Rng>(pnls: &[f64], rng: &mut R) -> Sample {
    let n = pnls.len();
    let mut cumulative = Vec::with_capacity(n);
    let mut total = 0.0;
    let mut wins = 0usize;
    for _ in 0..n {
        let pnl = pnls[rng.gen_range(0..n)];
        if pnl > 0.0 {
            wins += 1;
        }
        total += pnl;
        cumulative.push(total);
    }
    Sample {
        total_pnl: total,
        max_drawdown: max_drawdown_of(&cumulative),
        win_rate: wins as f64 / n as f64,
    }
}

/// Run the Monte Carlo resampling. `run_id` namespaces the seed derivation.
pub fn run_monte_carlo(
    trades: &[BacktestTrade],
    config: &MonteCarloConfig,
    run_id: &str,
) -> Result<MonteCarloResult, MonteCarloError> {
    if config.n_simulations == 0 {
        return Err(MonteCarloError::InvalidConfig("n_simulations must be at least 1".into()));
    }
    if !(config.confidence > 0.0 && config.confidence < 1.0) {
        return Err(MonteCarloError::InvalidConfig("confidence must be in (0, 1)".into()));
    }
    let min_trades = config.min_trades.max(1);
    if trades.len() < min_trades {
        return Err(MonteCarloError::InsufficientData {
            trades: trades.len(),
            min_trades,
        });
    }

    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let hierarchy = RngHierarchy::new(config.seed);
    let samples: Vec<Sample> = (0..config.n_simulations as u64)
        .into_par_iter()
        .map(|i| {
            let mut rng = hierarchy.rng_for(run_id, STREAM, i);
            simulate_once(&pnls, &mut rng)
        })
        .collect();

    let profitable = samples.iter().filter(|s| s.total_pnl > 0.0).count();
    let result = MonteCarloResult {
        n_simulations: samples.len(),
        sample_size: pnls.len(),
        confidence: config.confidence,
        total_pnl: Distribution::from_samples(samples.iter().map(|s| s.total_pnl).collect(), config.confidence),
        max_drawdown: Distribution::from_samples(
            samples.iter().map(|s| s.max_drawdown).collect(),
            config.confidence,
        ),
        win_rate: Distribution::from_samples(samples.iter().map(|s| s.win_rate).collect(), config.confidence),
        probability_of_profit: profitable as f64 / samples.len() as f64,
    };
    debug!(
        simulations = result.n_simulations,
        pnl_ci_lower = result.total_pnl.ci_lower,
        pnl_ci_upper = result.total_pnl.ci_upper,
        "monte carlo complete"
    );
    Ok(result)
}

/// Linear-interpolated percentile of an ascending slice, `p` in [0, 100].
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
