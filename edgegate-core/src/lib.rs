//! EdgeGate Core — sizing, risk gates, runtime risk state, staged execution.
//!
//! This crate contains the live decision path and everything the backtest
//! shares with it:
//! - Domain types (decisions, risk checks, execution records, market quality)
//! - Fractional Kelly position sizer with adaptive scaling
//! - Six independent risk gates
//! - Runtime risk ledger behind a single-writer handle, with audit log
//! - Paper / shadow / live execution controller with retry and fill tracking
//! - Decision pipeline tying the above together

pub mod config;
pub mod domain;
pub mod execution;
pub mod pipeline;
pub mod risk;
pub mod sizers;

pub use config::{ConfigError, TradingConfig};
pub use pipeline::{DecisionEngine, Evaluation, Pipeline, PipelineOutcome};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: shared types can cross task and thread boundaries.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Decision>();
        require_sync::<domain::Decision>();
        require_send::<domain::ExecutionRecord>();
        require_sync::<domain::ExecutionRecord>();
        require_send::<domain::SignalInput>();
        require_sync::<domain::SignalInput>();
        require_send::<domain::MarketQuality>();
        require_sync::<domain::MarketQuality>();

        // Sizing
        require_send::<sizers::KellySizer>();
        require_sync::<sizers::KellySizer>();
        require_send::<DecisionEngine>();
        require_sync::<DecisionEngine>();

        // Risk
        require_send::<risk::RuntimeRiskState>();
        require_sync::<risk::RuntimeRiskState>();
        require_send::<risk::RiskStateHandle>();
        require_sync::<risk::RiskStateHandle>();
        require_send::<risk::AuditLogEntry>();
        require_sync::<risk::AuditLogEntry>();

        // Execution
        require_send::<execution::ExecutionController>();
        require_sync::<execution::ExecutionController>();
        require_send::<execution::ExecutionFailure>();
        require_sync::<execution::ExecutionFailure>();
        require_send::<Pipeline>();
        require_sync::<Pipeline>();
    }

    /// Architecture contract: sizing sees no runtime state.
    ///
    /// `KellySizer::size` takes only a `SizingInput`, so the same function
    /// backs live sizing and backtest replay. This breaks loudly if a state
    /// parameter is ever added.
    #[test]
    fn sizer_takes_no_runtime_state() {
        fn _check(sizer: &sizers::KellySizer, input: &sizers::SizingInput<'_>) -> sizers::SizingOutput {
            sizer.size(input)
        }
    }

    /// Architecture contract: gate evaluation borrows state immutably.
    #[test]
    fn gates_do_not_mutate_state() {
        fn _check(
            state: &risk::RuntimeRiskState,
            quality: &domain::MarketQuality,
            limits: &config::RiskLimits,
        ) -> risk::GateReport {
            risk::evaluate_gates(10.0, "m", quality, state, limits)
        }
    }
}
