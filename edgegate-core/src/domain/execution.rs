//! Execution record with lifecycle tracking.
//!
//! Status moves Pending → {Partial, Filled, Cancelled, Failed}. Partial is the
//! only non-terminal state after Pending: it may advance to Filled or be closed
//! out by a forced cancel. Terminal records reject every further transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::decision::{Decision, Direction};
use super::ids::{DecisionId, ExecutionId, MarketId};

/// Fidelity mode an execution runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Simulated fill, no external calls.
    Paper,
    /// Real quote, simulated fill, no capital moves.
    Shadow,
    /// Real order on the venue.
    Live,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Paper => "paper",
            Self::Shadow => "shadow",
            Self::Live => "live",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paper" | "simulated" => Ok(Self::Paper),
            "shadow" => Ok(Self::Shadow),
            "live" => Ok(Self::Live),
            other => Err(format!("unknown execution mode '{other}'")),
        }
    }
}

/// Execution lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Partial,
    Filled,
    Cancelled,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Rejected status transition.
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("execution {id} is closed ({status}); cannot move to {target}")]
    AlreadyClosed {
        id: ExecutionId,
        status: ExecutionStatus,
        target: ExecutionStatus,
    },
    #[error("execution {id}: filled size {filled} exceeds requested {requested}")]
    Overfill {
        id: ExecutionId,
        filled: f64,
        requested: f64,
    },
}

/// One execution of one Decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub decision_id: DecisionId,
    pub market_id: MarketId,
    pub direction: Direction,
    pub mode: ExecutionMode,
    pub status: ExecutionStatus,
    /// Requested notional in USDC.
    pub requested_size: f64,
    pub fill_price: Option<f64>,
    /// Filled notional in USDC.
    pub fill_size: f64,
    /// Fill price deviation from the reference price, as a fraction.
    pub slippage: f64,
    pub fees: f64,
    pub tx_hash: Option<String>,
    pub venue_order_id: Option<String>,
    pub attempts: u32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when the record closes: terminal status, or a partial closed by cancel.
    pub filled_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// New Pending record for a decision.
    pub fn pending(decision: &Decision, mode: ExecutionMode, now: DateTime<Utc>) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            decision_id: decision.decision_id,
            market_id: decision.market_id.clone(),
            direction: decision.direction,
            mode,
            status: ExecutionStatus::Pending,
            requested_size: decision.size_usdc,
            fill_price: None,
            fill_size: 0.0,
            slippage: 0.0,
            fees: 0.0,
            tx_hash: None,
            venue_order_id: None,
            attempts: 0,
            failure_reason: None,
            created_at: now,
            filled_at: None,
        }
    }

    /// A record is closed once it is terminal or a partial has been cut off.
    pub fn is_closed(&self) -> bool {
        self.status.is_terminal() || self.filled_at.is_some()
    }

    /// Fraction of the requested notional that filled.
    pub fn fill_ratio(&self) -> f64 {
        if self.requested_size <= 0.0 {
            return 0.0;
        }
        (self.fill_size / self.requested_size).clamp(0.0, 1.0)
    }

    /// Success means capital (real or simulated) was committed.
    pub fn is_success(&self) -> bool {
        match self.status {
            ExecutionStatus::Filled => true,
            ExecutionStatus::Partial => self.filled_at.is_some() && self.fill_size > 0.0,
            _ => false,
        }
    }

    /// Record an intermediate partial fill (Pending|Partial → Partial).
    pub fn mark_partial(&mut self, fill_size: f64, avg_price: Option<f64>) -> Result<(), TransitionError> {
        self.guard_open(ExecutionStatus::Partial)?;
        self.guard_size(fill_size)?;
        self.status = ExecutionStatus::Partial;
        self.fill_size = fill_size;
        if avg_price.is_some() {
            self.fill_price = avg_price;
        }
        Ok(())
    }

    /// Complete the fill (Pending|Partial → Filled).
    pub fn mark_filled(
        &mut self,
        fill_price: f64,
        fill_size: f64,
        reference_price: f64,
        fees: f64,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.guard_open(ExecutionStatus::Filled)?;
        self.guard_size(fill_size)?;
        self.status = ExecutionStatus::Filled;
        self.fill_price = Some(fill_price);
        self.fill_size = fill_size;
        self.slippage = relative_slippage(fill_price, reference_price);
        self.fees = fees;
        self.filled_at = Some(at);
        Ok(())
    }

    /// Close a partial fill after its resting remainder was cancelled.
    pub fn close_partial(&mut self, reference_price: f64, fees: f64, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.guard_open(ExecutionStatus::Partial)?;
        self.status = ExecutionStatus::Partial;
        if let Some(price) = self.fill_price {
            self.slippage = relative_slippage(price, reference_price);
        }
        self.fees = fees;
        self.filled_at = Some(at);
        Ok(())
    }

    pub fn mark_cancelled(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.guard_open(ExecutionStatus::Cancelled)?;
        self.status = ExecutionStatus::Cancelled;
        self.failure_reason = Some(reason.into());
        self.filled_at = Some(at);
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.guard_open(ExecutionStatus::Failed)?;
        self.status = ExecutionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.filled_at = Some(at);
        Ok(())
    }

    fn guard_open(&self, target: ExecutionStatus) -> Result<(), TransitionError> {
        if self.is_closed() {
            return Err(TransitionError::AlreadyClosed {
                id: self.execution_id,
                status: self.status,
                target,
            });
        }
        Ok(())
    }

    fn guard_size(&self, fill_size: f64) -> Result<(), TransitionError> {
        if fill_size > self.requested_size + 1e-9 {
            return Err(TransitionError::Overfill {
                id: self.execution_id,
                filled: fill_size,
                requested: self.requested_size,
            });
        }
        Ok(())
    }
}

fn relative_slippage(fill_price: f64, reference_price: f64) -> f64 {
    if reference_price <= 0.0 {
        return 0.0;
    }
    (fill_price - reference_price) / reference_price
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DecisionAction, Rationale, RiskChecks};

    fn decision(size: f64) -> Decision {
        Decision {
            decision_id: DecisionId::new(),
            signal_id: "sig-1".into(),
            market_id: "mkt-1".into(),
            direction: Direction::Yes,
            price: 0.5,
            action: DecisionAction::Trade,
            size_usdc: size,
            risk_checks: RiskChecks::all_clear(),
            rationale: Rationale {
                alpha_type: "test".into(),
                edge: 0.1,
                confidence: 0.8,
                top_features: vec![],
                rejection_reasons: vec![],
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pending_to_filled() {
        let mut rec = ExecutionRecord::pending(&decision(100.0), ExecutionMode::Paper, Utc::now());
        assert_eq!(rec.status, ExecutionStatus::Pending);
        rec.mark_filled(0.51, 100.0, 0.5, 0.1, Utc::now()).unwrap();
        assert_eq!(rec.status, ExecutionStatus::Filled);
        assert!((rec.slippage - 0.02).abs() < 1e-9);
        assert!(rec.is_success());
    }

    #[test]
    fn partial_then_filled() {
        let mut rec = ExecutionRecord::pending(&decision(100.0), ExecutionMode::Live, Utc::now());
        rec.mark_partial(40.0, Some(0.5)).unwrap();
        assert_eq!(rec.status, ExecutionStatus::Partial);
        assert!(!rec.is_closed());
        rec.mark_filled(0.5, 100.0, 0.5, 0.0, Utc::now()).unwrap();
        assert_eq!(rec.status, ExecutionStatus::Filled);
    }

    #[test]
    fn terminal_rejects_transitions() {
        let mut rec = ExecutionRecord::pending(&decision(100.0), ExecutionMode::Live, Utc::now());
        rec.mark_failed("boom", Utc::now()).unwrap();
        assert!(rec.mark_filled(0.5, 100.0, 0.5, 0.0, Utc::now()).is_err());
        assert!(rec.mark_partial(10.0, None).is_err());
        assert_eq!(rec.status, ExecutionStatus::Failed);
    }

    #[test]
    fn closed_partial_is_final() {
        let mut rec = ExecutionRecord::pending(&decision(100.0), ExecutionMode::Live, Utc::now());
        rec.mark_partial(60.0, Some(0.52)).unwrap();
        rec.close_partial(0.5, 0.0, Utc::now()).unwrap();
        assert!(rec.is_closed());
        assert!(rec.is_success());
        assert!(rec.mark_filled(0.5, 100.0, 0.5, 0.0, Utc::now()).is_err());
    }

    #[test]
    fn overfill_rejected() {
        let mut rec = ExecutionRecord::pending(&decision(100.0), ExecutionMode::Live, Utc::now());
        assert!(matches!(
            rec.mark_partial(150.0, None),
            Err(TransitionError::Overfill { .. })
        ));
    }

    #[test]
    fn mode_parses() {
        assert_eq!("LIVE".parse::<ExecutionMode>().unwrap(), ExecutionMode::Live);
        assert_eq!("simulated".parse::<ExecutionMode>().unwrap(), ExecutionMode::Paper);
        assert!("yolo".parse::<ExecutionMode>().is_err());
    }
}
