//! Decision — the immutable record produced once per qualifying signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{DecisionId, MarketId};
use super::market::MarketQuality;
use super::risk_checks::RiskChecks;

/// Side of a binary contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Yes,
    No,
}

impl Direction {
    /// Price of this side given the YES price.
    pub fn price_from_yes(self, yes_price: f64) -> f64 {
        match self {
            Self::Yes => yes_price,
            Self::No => 1.0 - yes_price,
        }
    }

    /// Whether this side pays out given the resolved YES outcome.
    pub fn wins(self, yes_won: bool) -> bool {
        match self {
            Self::Yes => yes_won,
            Self::No => !yes_won,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "yes"),
            Self::No => write!(f, "no"),
        }
    }
}

/// What the pipeline decided to do with a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Show,
    Watch,
    Trade,
    HighConviction,
    Reject,
}

impl DecisionAction {
    /// Only `Trade` and `HighConviction` decisions are sent to execution.
    pub fn is_executable(self) -> bool {
        matches!(self, Self::Trade | Self::HighConviction)
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Show => "show",
            Self::Watch => "watch",
            Self::Trade => "trade",
            Self::HighConviction => "high_conviction",
            Self::Reject => "reject",
        };
        write!(f, "{s}")
    }
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub alpha_type: String,
    pub edge: f64,
    pub confidence: f64,
    pub top_features: Vec<(String, f64)>,
    pub rejection_reasons: Vec<String>,
}

/// Decision-shaped record consumed from signal generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInput {
    pub signal_id: String,
    pub market_id: MarketId,
    pub direction: Direction,
    /// Signed model edge over the implied probability (-1..1).
    pub predicted_edge: f64,
    /// Model confidence (0..1).
    pub confidence: f64,
    /// Current price of the chosen side (0..1).
    pub price: f64,
    pub quality: MarketQuality,
    #[serde(default = "default_alpha_type")]
    pub alpha_type: String,
}

fn default_alpha_type() -> String {
    "mispricing".to_string()
}

/// A sized, gate-checked decision. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: DecisionId,
    pub signal_id: String,
    pub market_id: MarketId,
    pub direction: Direction,
    /// Reference price of the chosen side when the decision was made.
    pub price: f64,
    pub action: DecisionAction,
    pub size_usdc: f64,
    pub risk_checks: RiskChecks,
    pub rationale: Rationale,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_tradeable(&self) -> bool {
        self.action.is_executable() && self.size_usdc > 0.0 && self.risk_checks.all_passed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_side_price_is_complement() {
        assert!((Direction::No.price_from_yes(0.7) - 0.3).abs() < 1e-12);
        assert_eq!(Direction::Yes.price_from_yes(0.7), 0.7);
    }

    #[test]
    fn win_depends_on_side() {
        assert!(Direction::Yes.wins(true));
        assert!(!Direction::Yes.wins(false));
        assert!(Direction::No.wins(false));
    }

    #[test]
    fn action_serializes_snake_case() {
        let json = serde_json::to_string(&DecisionAction::HighConviction).unwrap();
        assert_eq!(json, "\"high_conviction\"");
    }

    #[test]
    fn only_trade_actions_execute() {
        assert!(DecisionAction::Trade.is_executable());
        assert!(DecisionAction::HighConviction.is_executable());
        assert!(!DecisionAction::Watch.is_executable());
        assert!(!DecisionAction::Reject.is_executable());
    }
}
