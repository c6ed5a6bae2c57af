//! Size scaling factors. Each factor is in [0, ~1.25] and independent of edge.

use serde::{Deserialize, Serialize};

use super::AdaptiveState;
use crate::config::SizingConfig;
use crate::domain::MarketQuality;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingFactors {
    pub drawdown: f64,
    pub streak: f64,
    pub volatility: f64,
    pub regime: f64,
}

impl ScalingFactors {
    pub fn neutral() -> Self {
        Self {
            drawdown: 1.0,
            streak: 1.0,
            volatility: 1.0,
            regime: 1.0,
        }
    }

    pub fn compute(config: &SizingConfig, quality: &MarketQuality, adaptive: Option<&AdaptiveState>) -> Self {
        let volatility = volatility_scale(config, quality.volatility_30d);
        match adaptive {
            Some(a) => Self {
                drawdown: drawdown_scale(config, a.drawdown_pct),
                streak: streak_scale(config, a.consecutive_losses),
                volatility,
                regime: regime_scale(config, a.recent_win_rate),
            },
            None => Self {
                volatility,
                ..Self::neutral()
            },
        }
    }

    pub fn composite(&self) -> f64 {
        self.drawdown * self.streak * self.volatility * self.regime
    }
}

/// Linear fade from 100% at `drawdown_fade_start` to 0% at `drawdown_fade_end`.
pub fn drawdown_scale(config: &SizingConfig, drawdown_pct: f64) -> f64 {
    let start = config.drawdown_fade_start;
    let end = config.drawdown_fade_end;
    if drawdown_pct <= start {
        1.0
    } else if drawdown_pct >= end {
        0.0
    } else {
        1.0 - (drawdown_pct - start) / (end - start)
    }
}

/// Fixed step-down per consecutive loss beyond the grace count.
pub fn streak_scale(config: &SizingConfig, consecutive_losses: u32) -> f64 {
    let excess = consecutive_losses.saturating_sub(config.streak_grace);
    if excess == 0 {
        return 1.0;
    }
    (1.0 - config.streak_step * excess as f64).max(config.streak_floor)
}

/// Inverse to volatility above the reference level, floored.
pub fn volatility_scale(config: &SizingConfig, volatility_30d: f64) -> f64 {
    if volatility_30d <= config.reference_volatility || volatility_30d <= 0.0 {
        return 1.0;
    }
    (config.reference_volatility / volatility_30d).max(config.volatility_floor)
}

/// Recent win rate relative to the baseline, clamped.
pub fn regime_scale(config: &SizingConfig, recent_win_rate: f64) -> f64 {
    if config.baseline_win_rate <= 0.0 {
        return 1.0;
    }
    (recent_win_rate / config.baseline_win_rate).clamp(config.regime_min, config.regime_max)
}
