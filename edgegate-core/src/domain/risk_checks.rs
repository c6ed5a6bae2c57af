use serde::{Deserialize, Serialize};

/// Outcome of the six independent risk gates.
///
/// A decision is tradeable only if every gate passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskChecks {
    pub daily_loss_ok: bool,
    pub max_positions_ok: bool,
    pub per_market_cap_ok: bool,
    pub liquidity_ok: bool,
    pub spread_ok: bool,
    pub kill_switch_ok: bool,
}

impl RiskChecks {
    /// All gates passing. Mostly useful in tests and paper tooling.
    pub fn all_clear() -> Self {
        Self {
            daily_loss_ok: true,
            max_positions_ok: true,
            per_market_cap_ok: true,
            liquidity_ok: true,
            spread_ok: true,
            kill_switch_ok: true,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.daily_loss_ok
            && self.max_positions_ok
            && self.per_market_cap_ok
            && self.liquidity_ok
            && self.spread_ok
            && self.kill_switch_ok
    }

    /// Names of the gates that failed, in a fixed order.
    pub fn failed_gates(&self) -> Vec<&'static str> {
        let gates = [
            ("daily_loss", self.daily_loss_ok),
            ("max_positions", self.max_positions_ok),
            ("per_market_cap", self.per_market_cap_ok),
            ("liquidity", self.liquidity_ok),
            ("spread", self.spread_ok),
            ("kill_switch", self.kill_switch_ok),
        ];
        gates
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect()
    }
}
