//! Staged execution: paper, shadow and live.
//!
//! Key concepts:
//! - **Mode resolution**: kill-switch and the force-paper override downgrade
//!   live/shadow requests to paper before dispatch
//! - **Venue boundary**: an async trait; every call carries its own timeout
//! - **Retry**: bounded exponential backoff, only for retryable failure kinds
//! - **Fill tracking**: fixed-interval polling up to a timeout, then cancel
//! - **Breaker**: consecutive live failures trip the kill-switch

pub mod classify;
pub mod controller;
pub mod fill_tracker;
pub mod retry;
pub mod venue;

pub use classify::{classify, FailureKind};
pub use controller::{ExecutionController, LiveCredentials};
pub use fill_tracker::{FillOutcome, FillResolution, FillTracker};
pub use retry::{with_retry, RetryFailure, RetryPolicy};
pub use venue::{OrderRequest, OrderStatusReport, Venue, VenueError, VenueOrderStatus};

use std::fmt;
use thiserror::Error;

use crate::domain::{DecisionAction, ExecutionRecord, TransitionError};
use crate::risk::StateError;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Live trading precondition missing. Never retried, never counted.
    #[error("live trading denied: missing {}", .missing.join(", "))]
    LiveTradingDenied { missing: Vec<&'static str> },
    #[error("risk checks failed: {}", .failed.join(", "))]
    RiskRejected { failed: Vec<&'static str> },
    #[error("decision is not executable (action {action}, size {size:.2})")]
    NotExecutable { action: DecisionAction, size: f64 },
    #[error("insufficient balance: {available:.2} available, {required:.2} required")]
    InsufficientBalance { available: f64, required: f64 },
    #[error("venue failure ({kind}) after {attempts} attempt(s): {message}")]
    Venue {
        kind: FailureKind,
        attempts: u32,
        message: String,
    },
    #[error("fill timeout: {filled:.2} of {requested:.2} filled")]
    FillTimeout { filled: f64, requested: f64 },
    #[error("order closed by venue as {status:?}")]
    OrderTerminated { status: VenueOrderStatus },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    State(#[from] StateError),
}

impl ExecutionError {
    /// Whether this failure feeds the consecutive-failure breaker.
    ///
    /// Precondition and gate failures are local refusals, not trading failures.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. }
                | Self::Venue { .. }
                | Self::FillTimeout { .. }
                | Self::OrderTerminated { .. }
        )
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Venue { kind, .. } => Some(*kind),
            Self::InsufficientBalance { .. } => Some(FailureKind::InsufficientBalance),
            _ => None,
        }
    }
}

/// A failed execution together with its closed record.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub record: Box<ExecutionRecord>,
    pub error: ExecutionError,
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution {} failed: {}", self.record.execution_id, self.error)
    }
}

impl std::error::Error for ExecutionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
