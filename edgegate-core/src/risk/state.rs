//! Runtime risk ledger.
//!
//! A plain value type: every change goes through a named transition method so
//! the single-writer handle can pair it with an audit entry. The backtest owns
//! its own instance and drives it directly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Direction, ExecutionMode, MarketId};

/// Open exposure in one market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Committed notional in USDC on `direction`.
    pub size: f64,
    /// Size-weighted average entry price.
    pub entry_price: f64,
    pub direction: Direction,
    /// Notional later bought on the other side of the same market.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opposite: Option<Leg>,
}

/// One side of a two-sided position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub size: f64,
    pub entry_price: f64,
}

impl Leg {
    fn add(&mut self, size: f64, price: f64) {
        let total = self.size + size;
        self.entry_price = (self.entry_price * self.size + price * size) / total;
        self.size = total;
    }
}

impl Position {
    /// Notional committed across both sides. Opposite fills do not net out:
    /// each side is capital paid to the venue until settlement.
    pub fn gross_size(&self) -> f64 {
        self.size + self.opposite.map_or(0.0, |leg| leg.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeRiskState {
    pub execution_mode: ExecutionMode,
    pub kill_switch_active: bool,
    pub kill_switch_reason: Option<String>,
    /// True when the breaker (not an operator) tripped the kill-switch.
    pub kill_switch_automatic: bool,
    pub daily_pnl: f64,
    pub daily_trades: u32,
    pub daily_wins: u32,
    pub daily_losses: u32,
    /// UTC day the daily counters belong to.
    pub daily_date: NaiveDate,
    pub consecutive_failures: u32,
    pub positions: BTreeMap<MarketId, Position>,
}

impl RuntimeRiskState {
    pub fn new(execution_mode: ExecutionMode, today: NaiveDate) -> Self {
        Self {
            execution_mode,
            kill_switch_active: false,
            kill_switch_reason: None,
            kill_switch_automatic: false,
            daily_pnl: 0.0,
            daily_trades: 0,
            daily_wins: 0,
            daily_losses: 0,
            daily_date: today,
            consecutive_failures: 0,
            positions: BTreeMap::new(),
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn has_position(&self, market_id: &str) -> bool {
        self.positions.contains_key(market_id)
    }

    /// USDC currently committed to `market_id`.
    pub fn market_exposure(&self, market_id: &str) -> f64 {
        self.positions.get(market_id).map_or(0.0, Position::gross_size)
    }

    pub fn total_exposure(&self) -> f64 {
        self.positions.values().map(Position::gross_size).sum()
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        RiskSnapshot {
            execution_mode: self.execution_mode,
            kill_switch_active: self.kill_switch_active,
            daily_pnl: self.daily_pnl,
            daily_trades: self.daily_trades,
            daily_date: self.daily_date,
            consecutive_failures: self.consecutive_failures,
            open_positions: self.open_positions(),
            total_exposure: self.total_exposure(),
        }
    }

    // ─── Transitions ─────────────────────────────────────────────────

    /// Move the daily counters to `today`.
    ///
    /// Returns `true` if a reset happened. Dates at or before the current
    /// `daily_date` are ignored, so a reset is never applied twice for one
    /// day and never rewinds. Kill-switch and positions carry over.
    pub fn roll_day(&mut self, today: NaiveDate) -> bool {
        if today <= self.daily_date {
            return false;
        }
        self.daily_pnl = 0.0;
        self.daily_trades = 0;
        self.daily_wins = 0;
        self.daily_losses = 0;
        self.daily_date = today;
        true
    }

    /// Add filled exposure. Adding to an existing position re-weights the
    /// entry price; a fill on the opposite side opens (or grows) the
    /// opposite leg and both legs keep counting toward exposure.
    pub fn apply_fill(&mut self, market_id: &str, direction: Direction, size: f64, price: f64) {
        if size <= 0.0 {
            return;
        }
        self.daily_trades += 1;
        let Some(position) = self.positions.get_mut(market_id) else {
            self.positions.insert(
                market_id.to_string(),
                Position {
                    size,
                    entry_price: price,
                    direction,
                    opposite: None,
                },
            );
            return;
        };
        if position.direction == direction {
            let total = position.size + size;
            position.entry_price = (position.entry_price * position.size + price * size) / total;
            position.size = total;
        } else {
            match position.opposite.as_mut() {
                Some(leg) => leg.add(size, price),
                None => {
                    position.opposite = Some(Leg {
                        size,
                        entry_price: price,
                    })
                }
            }
        }
    }

    /// Close the position in `market_id` and book its realized PnL.
    pub fn settle_position(&mut self, market_id: &str, pnl: f64) -> Option<Position> {
        let closed = self.positions.remove(market_id);
        self.daily_pnl += pnl;
        if pnl > 0.0 {
            self.daily_wins += 1;
        } else {
            self.daily_losses += 1;
        }
        closed
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failed execution. Returns the new consecutive count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub fn activate_kill_switch(&mut self, reason: impl Into<String>, automatic: bool) {
        self.kill_switch_active = true;
        self.kill_switch_reason = Some(reason.into());
        self.kill_switch_automatic = automatic;
    }

    pub fn deactivate_kill_switch(&mut self) {
        self.kill_switch_active = false;
        self.kill_switch_reason = None;
        self.kill_switch_automatic = false;
        self.consecutive_failures = 0;
    }

    pub fn set_mode(&mut self, mode: ExecutionMode) {
        self.execution_mode = mode;
    }
}

/// Compact view of the ledger recorded before and after each mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub execution_mode: ExecutionMode,
    pub kill_switch_active: bool,
    pub daily_pnl: f64,
    pub daily_trades: u32,
    pub daily_date: NaiveDate,
    pub consecutive_failures: u32,
    pub open_positions: usize,
    pub total_exposure: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn fills_accumulate_per_market() {
        let mut s = RuntimeRiskState::new(ExecutionMode::Paper, day(1));
        s.apply_fill("m1", Direction::Yes, 50.0, 0.40);
        s.apply_fill("m1", Direction::Yes, 50.0, 0.60);
        s.apply_fill("m2", Direction::No, 20.0, 0.30);
        assert_eq!(s.open_positions(), 2);
        assert_eq!(s.market_exposure("m1"), 100.0);
        assert!((s.positions["m1"].entry_price - 0.50).abs() < 1e-12);
        assert_eq!(s.daily_trades, 3);
        assert_eq!(s.total_exposure(), 120.0);
    }

    #[test]
    fn opposite_side_fill_keeps_both_legs_exposed() {
        let mut s = RuntimeRiskState::new(ExecutionMode::Live, day(1));
        s.apply_fill("m1", Direction::Yes, 60.0, 0.40);
        s.apply_fill("m1", Direction::No, 25.0, 0.55);
        s.apply_fill("m1", Direction::No, 25.0, 0.65);

        assert_eq!(s.open_positions(), 1);
        assert_eq!(s.market_exposure("m1"), 110.0);
        assert_eq!(s.total_exposure(), 110.0);
        let p = s.positions["m1"];
        assert_eq!(p.direction, Direction::Yes);
        assert_eq!(p.size, 60.0);
        let leg = p.opposite.unwrap();
        assert_eq!(leg.size, 50.0);
        assert!((leg.entry_price - 0.60).abs() < 1e-12);

        let closed = s.settle_position("m1", -10.0).unwrap();
        assert_eq!(closed.gross_size(), 110.0);
        assert_eq!(s.total_exposure(), 0.0);
    }

    #[test]
    fn single_sided_position_serializes_without_opposite_leg() {
        let mut s = RuntimeRiskState::new(ExecutionMode::Paper, day(1));
        s.apply_fill("m1", Direction::Yes, 10.0, 0.5);
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("opposite"));
        let back: RuntimeRiskState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn roll_day_resets_counters_but_keeps_kill_switch() {
        let mut s = RuntimeRiskState::new(ExecutionMode::Live, day(1));
        s.apply_fill("m1", Direction::Yes, 10.0, 0.5);
        s.settle_position("m1", -5.0);
        s.activate_kill_switch("manual", false);

        assert!(s.roll_day(day(2)));
        assert_eq!(s.daily_pnl, 0.0);
        assert_eq!(s.daily_trades, 0);
        assert_eq!(s.daily_losses, 0);
        assert!(s.kill_switch_active);
        assert_eq!(s.kill_switch_reason.as_deref(), Some("manual"));
    }

    #[test]
    fn roll_day_is_idempotent_and_never_retroactive() {
        let mut s = RuntimeRiskState::new(ExecutionMode::Paper, day(5));
        s.daily_pnl = -12.0;
        assert!(!s.roll_day(day(5)));
        assert!(!s.roll_day(day(4)));
        assert_eq!(s.daily_pnl, -12.0);
        assert_eq!(s.daily_date, day(5));
    }

    #[test]
    fn settle_books_pnl_and_frees_slot() {
        let mut s = RuntimeRiskState::new(ExecutionMode::Paper, day(1));
        s.apply_fill("m1", Direction::Yes, 40.0, 0.5);
        let closed = s.settle_position("m1", 40.0).unwrap();
        assert_eq!(closed.size, 40.0);
        assert_eq!(s.open_positions(), 0);
        assert_eq!(s.daily_pnl, 40.0);
        assert_eq!(s.daily_wins, 1);
    }

    #[test]
    fn deactivation_clears_failure_streak() {
        let mut s = RuntimeRiskState::new(ExecutionMode::Live, day(1));
        s.record_failure();
        s.record_failure();
        s.activate_kill_switch("breaker", true);
        s.deactivate_kill_switch();
        assert!(!s.kill_switch_active);
        assert!(!s.kill_switch_automatic);
        assert_eq!(s.consecutive_failures, 0);
    }
}
