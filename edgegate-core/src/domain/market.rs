//! Market snapshots shared by sizing and the risk gates.

use serde::{Deserialize, Serialize};

/// Read-only snapshot of a market's tradeability at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketQuality {
    /// Resting liquidity in USDC.
    pub liquidity: f64,
    /// Best ask minus best bid, in probability units (0..1).
    pub spread: f64,
    /// 30-day volatility of the implied probability.
    pub volatility_30d: f64,
    pub days_to_expiry: f64,
}

impl MarketQuality {
    pub fn new(liquidity: f64, spread: f64, volatility_30d: f64, days_to_expiry: f64) -> Self {
        Self {
            liquidity,
            spread,
            volatility_30d,
            days_to_expiry,
        }
    }
}

/// Order-book quote from the market-data side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub best_price: f64,
    pub liquidity: f64,
}
