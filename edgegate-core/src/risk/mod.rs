//! Risk: gate evaluation and the runtime risk ledger.
//!
//! # Responsibilities
//! - Six independent tradeability gates ([`evaluate_gates`])
//! - The persisted runtime ledger: exposure, daily PnL, kill-switch
//! - Single-writer access with lazy UTC day roll ([`RiskStateHandle`])
//! - Append-only audit of every mutation
//!
//! # Non-Responsibilities
//! - Sizing (see `sizers`)
//! - Talking to the venue (see `execution`)

pub mod audit;
pub mod gates;
pub mod handle;
pub mod schedule;
pub mod state;
pub mod store;

pub use audit::{AuditError, AuditEvent, AuditLogEntry, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use gates::{evaluate_gates, GateReport};
pub use handle::{Clock, FailureOutcome, ManualClock, RiskStateHandle, SystemClock};
pub use schedule::spawn_daily_reset;
pub use state::{Leg, Position, RiskSnapshot, RuntimeRiskState};
pub use store::{JsonFileStore, MemoryStore, RiskStateStore, StateError};
