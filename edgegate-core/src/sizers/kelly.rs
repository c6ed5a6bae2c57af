//! Fractional Kelly sizer for binary contracts.

use std::sync::Arc;

use super::probability::{policy_for, ProbabilityPolicy};
use super::scaling::ScalingFactors;
use super::{SizeCap, SizingInput, SizingOutput};
use crate::config::SizingConfig;

/// Fractional Kelly sizer.
///
/// For a binary contract priced at `price`, the net odds are `b = 1/price - 1`
/// and the full-Kelly fraction is `f* = p - q/b`. The final stake is
/// `bankroll × f* × kelly_fraction × Π(scaling factors)`, capped by the
/// per-trade and per-market ceilings.
#[derive(Debug, Clone)]
pub struct KellySizer {
    config: SizingConfig,
    policy: Arc<dyn ProbabilityPolicy>,
}

impl KellySizer {
    pub fn new(config: SizingConfig) -> Self {
        let policy: Arc<dyn ProbabilityPolicy> = Arc::from(policy_for(config.probability_model));
        Self { config, policy }
    }

    /// Use a custom probability policy instead of the configured one.
    pub fn with_policy(config: SizingConfig, policy: Arc<dyn ProbabilityPolicy>) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn size(&self, input: &SizingInput<'_>) -> SizingOutput {
        let scaling = ScalingFactors::compute(&self.config, input.quality, input.adaptive);

        if !(input.price > 0.0 && input.price < 1.0)
            || input.bankroll <= 0.0
            || !input.edge.is_finite()
            || !input.confidence.is_finite()
        {
            return SizingOutput::zero(0.0, 0.0, scaling);
        }

        let p = self
            .policy
            .win_probability(input.price, input.edge, input.confidence);
        let kelly_raw = kelly_fraction(p, input.price);

        let raw = input.bankroll
            * kelly_raw
            * self.config.kelly_fraction
            * scaling.composite()
            * self.policy.stake_multiplier(input.confidence);

        let mut size = raw;
        let mut capped_by = None;
        if size > self.config.max_trade_usdc {
            size = self.config.max_trade_usdc;
            capped_by = Some(SizeCap::PerTrade);
        }
        let headroom = (self.config.per_market_cap_usdc - input.existing_market_exposure).max(0.0);
        if size > headroom {
            size = headroom;
            capped_by = Some(SizeCap::PerMarket);
        }

        if size < self.config.min_trade_usdc || input.edge * size <= 0.0 {
            return SizingOutput::zero(p, kelly_raw, scaling);
        }

        SizingOutput {
            size,
            win_probability: p,
            kelly_raw,
            scaling,
            capped_by,
        }
    }
}

/// Full-Kelly fraction for a binary contract, clipped to [0, 1].
pub fn kelly_fraction(win_probability: f64, price: f64) -> f64 {
    if !(price > 0.0 && price < 1.0) {
        return 0.0;
    }
    let b = 1.0 / price - 1.0;
    let q = 1.0 - win_probability;
    (win_probability - q / b).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbabilityModel;
    use crate::domain::MarketQuality;
    use crate::sizers::AdaptiveState;

    fn quality() -> MarketQuality {
        MarketQuality::new(50_000.0, 0.01, 0.1, 14.0)
    }

    fn input<'a>(q: &'a MarketQuality, edge: f64, confidence: f64) -> SizingInput<'a> {
        SizingInput {
            edge,
            confidence,
            price: 0.60,
            bankroll: 1000.0,
            quality: q,
            existing_market_exposure: 0.0,
            adaptive: None,
        }
    }

    #[test]
    fn reference_scenario() {
        let sizer = KellySizer::new(SizingConfig::default());
        let q = quality();
        let out = sizer.size(&input(&q, 0.15, 0.8));
        // b = 1/0.6 - 1 ≈ 0.667, p = 0.72 → f* = 0.3, × 0.25 × 1000 = 75
        assert!((out.kelly_raw - 0.3).abs() < 1e-9);
        assert!((out.size - 75.0).abs() < 1e-9);
        assert!(out.size > 0.0 && out.size <= sizer.config().max_trade_usdc);
        assert_eq!(out.capped_by, None);
    }

    #[test]
    fn negative_edge_rejects() {
        let sizer = KellySizer::new(SizingConfig::default());
        let q = quality();
        let out = sizer.size(&input(&q, -0.10, 0.9));
        assert_eq!(out.size, 0.0);
    }

    #[test]
    fn per_trade_cap_binds() {
        let sizer = KellySizer::new(SizingConfig::default());
        let q = quality();
        let mut inp = input(&q, 0.3, 1.0);
        inp.bankroll = 100_000.0;
        let out = sizer.size(&inp);
        assert_eq!(out.size, 100.0);
        assert_eq!(out.capped_by, Some(SizeCap::PerTrade));
    }

    #[test]
    fn per_market_headroom_binds() {
        let sizer = KellySizer::new(SizingConfig::default());
        let q = quality();
        let mut inp = input(&q, 0.15, 0.8);
        inp.existing_market_exposure = 230.0;
        let out = sizer.size(&inp);
        assert!((out.size - 20.0).abs() < 1e-9);
        assert_eq!(out.capped_by, Some(SizeCap::PerMarket));
    }

    #[test]
    fn market_full_means_zero() {
        let sizer = KellySizer::new(SizingConfig::default());
        let q = quality();
        let mut inp = input(&q, 0.15, 0.8);
        inp.existing_market_exposure = 250.0;
        assert_eq!(sizer.size(&inp).size, 0.0);
    }

    #[test]
    fn deep_drawdown_zeroes_size() {
        let sizer = KellySizer::new(SizingConfig::default());
        let q = quality();
        let adaptive = AdaptiveState {
            drawdown_pct: 0.35,
            ..AdaptiveState::default()
        };
        let mut inp = input(&q, 0.15, 0.8);
        inp.adaptive = Some(&adaptive);
        assert_eq!(sizer.size(&inp).size, 0.0);
    }

    #[test]
    fn invalid_price_is_zero() {
        let sizer = KellySizer::new(SizingConfig::default());
        let q = quality();
        let mut inp = input(&q, 0.15, 0.8);
        inp.price = 1.0;
        assert_eq!(sizer.size(&inp).size, 0.0);
        inp.price = 0.0;
        assert_eq!(sizer.size(&inp).size, 0.0);
    }

    #[test]
    fn edge_over_implied_scales_by_confidence() {
        let config = SizingConfig {
            probability_model: ProbabilityModel::EdgeOverImplied,
            ..SizingConfig::default()
        };
        let sizer = KellySizer::new(config);
        assert_eq!(sizer.policy_name(), "edge_over_implied");
        let q = quality();
        let full = sizer.size(&input(&q, 0.1, 1.0)).size;
        let half = sizer.size(&input(&q, 0.1, 0.5)).size;
        assert!((half - full * 0.5).abs() < 1e-9);
    }

    #[test]
    fn kelly_fraction_break_even_is_zero() {
        assert!(kelly_fraction(0.6, 0.6).abs() < 1e-12);
        assert_eq!(kelly_fraction(0.3, 0.6), 0.0);
    }
}
