//! Domain types shared by the live pipeline and the backtest replay.

pub mod decision;
pub mod execution;
pub mod ids;
pub mod market;
pub mod risk_checks;

pub use decision::{Decision, DecisionAction, Direction, Rationale, SignalInput};
pub use execution::{ExecutionMode, ExecutionRecord, ExecutionStatus, TransitionError};
pub use ids::{DecisionId, ExecutionId, MarketId};
pub use market::{MarketQuality, Quote};
pub use risk_checks::RiskChecks;
