//! Decision pipeline: Signal → Sizer → Risk gates → Decision → Execution.
//!
//! [`DecisionEngine`] is pure and shared with the backtest. [`Pipeline`]
//! adds the execution step for the live process.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{DecisionThresholds, RiskLimits, TradingConfig};
use crate::domain::{Decision, DecisionAction, DecisionId, ExecutionMode, ExecutionRecord, Rationale, SignalInput};
use crate::execution::{ExecutionController, ExecutionFailure};
use crate::risk::{evaluate_gates, GateReport, RuntimeRiskState, StateError};
use crate::sizers::{AdaptiveState, KellySizer, SizingInput, SizingOutput};

/// Everything computed while deciding, for callers that need more than the Decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub sizing: SizingOutput,
    pub gates: GateReport,
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    sizer: KellySizer,
    limits: RiskLimits,
    thresholds: DecisionThresholds,
}

impl DecisionEngine {
    pub fn new(config: &TradingConfig) -> Self {
        Self {
            sizer: KellySizer::new(config.sizing.clone()),
            limits: config.risk.clone(),
            thresholds: config.decision.clone(),
        }
    }

    pub fn with_sizer(sizer: KellySizer, limits: RiskLimits, thresholds: DecisionThresholds) -> Self {
        Self {
            sizer,
            limits,
            thresholds,
        }
    }

    pub fn sizer(&self) -> &KellySizer {
        &self.sizer
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Action implied by edge and confidence alone.
    pub fn classify(&self, edge: f64, confidence: f64) -> DecisionAction {
        let t = &self.thresholds;
        if edge >= t.high_conviction_edge && confidence >= t.high_conviction_confidence {
            DecisionAction::HighConviction
        } else if edge >= t.trade_edge && confidence >= t.trade_confidence {
            DecisionAction::Trade
        } else if edge >= t.watch_edge {
            DecisionAction::Watch
        } else {
            DecisionAction::Show
        }
    }

    pub fn decide(
        &self,
        signal: &SignalInput,
        bankroll: f64,
        adaptive: Option<&AdaptiveState>,
        state: &RuntimeRiskState,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let sizing = self.sizer.size(&SizingInput {
            edge: signal.predicted_edge,
            confidence: signal.confidence,
            price: signal.price,
            bankroll,
            quality: &signal.quality,
            existing_market_exposure: state.market_exposure(&signal.market_id),
            adaptive,
        });
        let gates = evaluate_gates(sizing.size, &signal.market_id, &signal.quality, state, &self.limits);

        let mut rejection_reasons = gates.failed_reasons.clone();
        if sizing.size <= 0.0 {
            rejection_reasons.push(format!(
                "sizing: zero stake (edge {:.4}, kelly {:.4}, scaling {:.3})",
                signal.predicted_edge,
                sizing.kelly_raw,
                sizing.scaling.composite()
            ));
        }
        let action = if rejection_reasons.is_empty() {
            self.classify(signal.predicted_edge, signal.confidence)
        } else {
            DecisionAction::Reject
        };
        let size_usdc = if action == DecisionAction::Reject { 0.0 } else { sizing.size };

        let decision = Decision {
            decision_id: DecisionId::new(),
            signal_id: signal.signal_id.clone(),
            market_id: signal.market_id.clone(),
            direction: signal.direction,
            price: signal.price,
            action,
            size_usdc,
            risk_checks: gates.checks,
            rationale: Rationale {
                alpha_type: signal.alpha_type.clone(),
                edge: signal.predicted_edge,
                confidence: signal.confidence,
                top_features: vec![
                    ("win_probability".to_string(), sizing.win_probability),
                    ("kelly_raw".to_string(), sizing.kelly_raw),
                    ("scaling".to_string(), sizing.scaling.composite()),
                    ("liquidity".to_string(), signal.quality.liquidity),
                    ("spread".to_string(), signal.quality.spread),
                ],
                rejection_reasons,
            },
            created_at: now,
        };
        debug!(
            decision_id = %decision.decision_id,
            market_id = %decision.market_id,
            action = %decision.action,
            size = decision.size_usdc,
            "decision made"
        );

        Evaluation {
            decision,
            sizing,
            gates,
        }
    }
}

/// Outcome of running one signal through the full pipeline.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub decision: Decision,
    /// `None` when the decision was not executable.
    pub execution: Option<Result<ExecutionRecord, ExecutionFailure>>,
}

pub struct Pipeline {
    engine: DecisionEngine,
    controller: ExecutionController,
}

impl Pipeline {
    pub fn new(engine: DecisionEngine, controller: ExecutionController) -> Self {
        Self { engine, controller }
    }

    pub fn controller(&self) -> &ExecutionController {
        &self.controller
    }

    /// Decide on `signal` against the current risk state and, if the decision
    /// is tradeable, execute it in `mode`.
    pub async fn process(
        &self,
        signal: &SignalInput,
        bankroll: f64,
        adaptive: Option<&AdaptiveState>,
        mode: ExecutionMode,
    ) -> Result<PipelineOutcome, StateError> {
        let handle = self.controller.state();
        let state = handle.get_state()?;
        let eval = self
            .engine
            .decide(signal, bankroll, adaptive, &state, handle.clock().now());
        let decision = eval.decision;

        if !decision.is_tradeable() {
            info!(
                signal_id = %decision.signal_id,
                action = %decision.action,
                reasons = ?decision.rationale.rejection_reasons,
                "decision not executed"
            );
            return Ok(PipelineOutcome {
                decision,
                execution: None,
            });
        }

        let execution = self.controller.execute(&decision, mode).await;
        Ok(PipelineOutcome {
            decision,
            execution: Some(execution),
        })
    }
}
