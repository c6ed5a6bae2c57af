//! Risk gate evaluator. The single tradeability authority for live, shadow
//! and backtest paths.
//!
//! Gate failures are ordinary values, not errors.

use serde::{Deserialize, Serialize};

use super::state::RuntimeRiskState;
use crate::config::RiskLimits;
use crate::domain::{MarketQuality, RiskChecks};

/// Result of running all six gates against a proposed stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub passed: bool,
    pub checks: RiskChecks,
    /// One human-readable line per failed gate, in gate order.
    pub failed_reasons: Vec<String>,
}

impl GateReport {
    pub fn failed_gates(&self) -> Vec<&'static str> {
        self.checks.failed_gates()
    }
}

/// Evaluate every gate independently.
///
/// A market that already holds a position does not need a fresh slot, so
/// adding to it is not blocked by `max_open_positions`.
pub fn evaluate_gates(
    size: f64,
    market_id: &str,
    quality: &MarketQuality,
    state: &RuntimeRiskState,
    limits: &RiskLimits,
) -> GateReport {
    let existing = state.market_exposure(market_id);
    let max_liquidity_take = quality.liquidity * limits.liquidity_fraction;

    let checks = RiskChecks {
        daily_loss_ok: state.daily_pnl > -limits.max_daily_loss_usdc,
        max_positions_ok: state.has_position(market_id)
            || state.open_positions() < limits.max_open_positions,
        per_market_cap_ok: existing + size <= limits.per_market_cap_usdc + 1e-9,
        liquidity_ok: size <= max_liquidity_take,
        spread_ok: quality.spread <= limits.max_spread,
        kill_switch_ok: !state.kill_switch_active,
    };

    let mut failed_reasons = Vec::new();
    if !checks.daily_loss_ok {
        failed_reasons.push(format!(
            "daily_loss: daily pnl {:.2} at or below -{:.2}",
            state.daily_pnl, limits.max_daily_loss_usdc
        ));
    }
    if !checks.max_positions_ok {
        failed_reasons.push(format!(
            "max_positions: {} open, limit {}",
            state.open_positions(),
            limits.max_open_positions
        ));
    }
    if !checks.per_market_cap_ok {
        failed_reasons.push(format!(
            "per_market_cap: {:.2} existing + {:.2} new exceeds {:.2} in {market_id}",
            existing, size, limits.per_market_cap_usdc
        ));
    }
    if !checks.liquidity_ok {
        failed_reasons.push(format!(
            "liquidity: size {:.2} exceeds {:.2} ({:.0}% of {:.2})",
            size,
            max_liquidity_take,
            limits.liquidity_fraction * 100.0,
            quality.liquidity
        ));
    }
    if !checks.spread_ok {
        failed_reasons.push(format!(
            "spread: {:.4} exceeds {:.4}",
            quality.spread, limits.max_spread
        ));
    }
    if !checks.kill_switch_ok {
        failed_reasons.push(format!(
            "kill_switch: active ({})",
            state.kill_switch_reason.as_deref().unwrap_or("no reason given")
        ));
    }

    GateReport {
        passed: checks.all_passed(),
        checks,
        failed_reasons,
    }
}
