//! Performance metrics — pure functions over a chronological trade list.
//!
//! Every metric is a pure function: trades in, scalar out. Ratios are per
//! trade and never annualized; prediction markets have no fixed bar clock.

use serde::{Deserialize, Serialize};

use crate::trade::BacktestTrade;

/// Aggregate performance metrics for a trade set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_pnl: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    /// Peak-to-trough on cumulative PnL, in USDC (non-negative).
    pub max_drawdown: f64,
    /// Max drawdown relative to the bankroll at the peak.
    pub max_drawdown_pct: f64,
    pub sharpe: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub calmar: f64,
    pub expectancy: f64,
    pub max_consecutive_losses: usize,
    pub total_fees: f64,
}

impl PerformanceMetrics {
    /// Compute all metrics. `trades` must be in chronological (close) order.
    pub fn compute(trades: &[BacktestTrade], initial_bankroll: f64) -> Self {
        let total = total_pnl(trades);
        let dd = max_drawdown(trades);
        Self {
            total_pnl: total,
            trade_count: trades.len(),
            win_rate: win_rate(trades),
            max_drawdown: dd,
            max_drawdown_pct: max_drawdown_pct(trades, initial_bankroll),
            sharpe: sharpe_ratio(trades),
            profit_factor: profit_factor(trades),
            avg_win: avg_win(trades),
            avg_loss: avg_loss(trades),
            calmar: calmar_ratio(total, dd),
            expectancy: expectancy(trades),
            max_consecutive_losses: max_consecutive_losses(trades),
            total_fees: trades.iter().map(|t| t.fees).sum(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn total_pnl(trades: &[BacktestTrade]) -> f64 {
    trades.iter().map(|t| t.pnl).sum()
}

/// Win rate: fraction of trades with positive PnL.
pub fn win_rate(trades: &[BacktestTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Cumulative PnL after each trade.
pub fn cumulative_pnl(trades: &[BacktestTrade]) -> Vec<f64> {
    trades
        .iter()
        .scan(0.0, |acc, t| {
            *acc += t.pnl;
            Some(*acc)
        })
        .collect()
}

/// Largest peak-to-trough decline of cumulative PnL, starting from zero.
pub fn max_drawdown(trades: &[BacktestTrade]) -> f64 {
    max_drawdown_of(&cumulative_pnl(trades))
}

/// Max drawdown over an arbitrary cumulative PnL path starting from zero.
pub fn max_drawdown_of(cumulative: &[f64]) -> f64 {
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for &c in cumulative {
        if c > peak {
            peak = c;
        }
        max_dd = max_dd.max(peak - c);
    }
    max_dd
}

/// Max drawdown as a fraction of bankroll at the preceding peak.
pub fn max_drawdown_pct(trades: &[BacktestTrade], initial_bankroll: f64) -> f64 {
    if initial_bankroll <= 0.0 {
        return 0.0;
    }
    let mut peak = initial_bankroll;
    let mut equity = initial_bankroll;
    let mut max_dd = 0.0_f64;
    for t in trades {
        equity += t.pnl;
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd
}

/// Per-trade Sharpe: mean / stdev of return on stake.
///
/// Returns 0.0 with fewer than 2 trades or zero variance.
pub fn sharpe_ratio(trades: &[BacktestTrade]) -> f64 {
    let returns: Vec<f64> = trades.iter().map(|t| t.return_on_stake()).collect();
    sharpe_of(&returns)
}

pub fn sharpe_of(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(returns) / std
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at 100.0 for edge cases (all winners, zero losses).
pub fn profit_factor(trades: &[BacktestTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

pub fn avg_win(trades: &[BacktestTrade]) -> f64 {
    let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
    mean_f64(&wins)
}

/// Average losing trade, reported as a negative number.
pub fn avg_loss(trades: &[BacktestTrade]) -> f64 {
    let losses: Vec<f64> = trades.iter().filter(|t| t.pnl <= 0.0).map(|t| t.pnl).collect();
    mean_f64(&losses)
}

/// Calmar: total PnL / max drawdown. 0.0 without a drawdown.
pub fn calmar_ratio(total_pnl: f64, max_drawdown: f64) -> f64 {
    if max_drawdown < 1e-10 {
        return 0.0;
    }
    total_pnl / max_drawdown
}

/// Expected PnL per trade: win_rate × avg_win + loss_rate × avg_loss.
pub fn expectancy(trades: &[BacktestTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wr = win_rate(trades);
    wr * avg_win(trades) + (1.0 - wr) * avg_loss(trades)
}

pub fn max_consecutive_losses(trades: &[BacktestTrade]) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() {
            current = 0;
        } else {
            current += 1;
            max_streak = max_streak.max(current);
        }
    }
    max_streak
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
