//! Position Sizer — turns edge + confidence into a USDC stake.
//!
//! Sizing is a pure function of its inputs so the same code backs live sizing
//! and backtest replay.
//!
//! # Responsibilities
//! - Derive a win probability from price, edge and confidence (pluggable policy)
//! - Compute the Kelly fraction for a binary contract and scale it down
//! - Apply drawdown, streak, volatility and regime scaling
//! - Respect per-trade and per-market ceilings
//!
//! # Non-Responsibilities
//! - Sizers do NOT decide tradeability (that's the risk gates' job)
//! - Sizers do NOT touch runtime state

pub mod kelly;
pub mod probability;
pub mod scaling;

pub use kelly::KellySizer;
pub use probability::{ConfidenceWeighted, EdgeOverImplied, ProbabilityPolicy};
pub use scaling::ScalingFactors;

use serde::{Deserialize, Serialize};

use crate::domain::MarketQuality;

/// Recent performance used to scale size down after losses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveState {
    pub consecutive_losses: u32,
    /// Current drawdown from peak bankroll, as a fraction (0.15 = 15%).
    pub drawdown_pct: f64,
    pub recent_win_rate: f64,
}

impl Default for AdaptiveState {
    fn default() -> Self {
        Self {
            consecutive_losses: 0,
            drawdown_pct: 0.0,
            recent_win_rate: 0.5,
        }
    }
}

/// Everything the sizer looks at.
#[derive(Debug, Clone, Copy)]
pub struct SizingInput<'a> {
    /// Signed edge over the implied probability (-1..1).
    pub edge: f64,
    pub confidence: f64,
    /// Price of the chosen side (0..1).
    pub price: f64,
    pub bankroll: f64,
    pub quality: &'a MarketQuality,
    /// USDC already committed to this market.
    pub existing_market_exposure: f64,
    pub adaptive: Option<&'a AdaptiveState>,
}

/// Which ceiling, if any, bound the final size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCap {
    PerTrade,
    PerMarket,
}

/// Sizer result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingOutput {
    pub size: f64,
    pub win_probability: f64,
    /// Kelly fraction before any scaling, clipped to [0, 1].
    pub kelly_raw: f64,
    pub scaling: ScalingFactors,
    pub capped_by: Option<SizeCap>,
}

impl SizingOutput {
    pub(crate) fn zero(win_probability: f64, kelly_raw: f64, scaling: ScalingFactors) -> Self {
        Self {
            size: 0.0,
            win_probability,
            kelly_raw,
            scaling,
            capped_by: None,
        }
    }
}
