//! BacktestTrade — the offline analogue of an Execution plus its Outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use edgegate_core::domain::{Direction, MarketId};

/// A simulated trade, immutable once the market resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub signal_id: String,
    pub market_id: MarketId,
    pub direction: Direction,
    /// Fill price of the traded side, after slippage.
    pub entry_price: f64,
    /// 1.0 if the traded side paid out, else 0.0.
    pub exit_price: f64,
    /// Stake in USDC.
    pub size: f64,
    /// Net of fees.
    pub pnl: f64,
    pub predicted_edge: f64,
    /// Realized outcome minus the price paid.
    pub actual_edge: f64,
    /// Fill price minus the decision price.
    pub slippage: f64,
    pub fees: f64,
    /// Win probability of the traded side at decision time.
    pub predicted_probability: f64,
    pub confidence: f64,
    pub won: bool,
    pub entered_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl BacktestTrade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    /// PnL per USDC staked.
    pub fn return_on_stake(&self) -> f64 {
        if self.size > 0.0 {
            self.pnl / self.size
        } else {
            0.0
        }
    }

    pub fn outcome(&self) -> f64 {
        if self.won {
            1.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// A trade closed `day` days after 2024-01-01, won or lost with the given pnl.
    pub fn trade(day: i64, pnl: f64) -> BacktestTrade {
        let entered = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::days(day);
        BacktestTrade {
            signal_id: format!("sig-{day}"),
            market_id: format!("m-{day}"),
            direction: Direction::Yes,
            entry_price: 0.5,
            exit_price: if pnl > 0.0 { 1.0 } else { 0.0 },
            size: 100.0,
            pnl,
            predicted_edge: 0.05,
            actual_edge: if pnl > 0.0 { 0.5 } else { -0.5 },
            slippage: 0.0,
            fees: 0.0,
            predicted_probability: 0.55,
            confidence: 0.7,
            won: pnl > 0.0,
            entered_at: entered,
            closed_at: entered + Duration::hours(6),
        }
    }

    pub fn with_prediction(probability: f64, won: bool) -> BacktestTrade {
        BacktestTrade {
            predicted_probability: probability,
            won,
            ..trade(0, if won { 10.0 } else { -10.0 })
        }
    }
}
