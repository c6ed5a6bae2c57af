//! End-to-end: signal in, decision and paper execution out.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use edgegate_core::domain::{DecisionAction, Direction, ExecutionMode, ExecutionStatus, MarketQuality, SignalInput};
use edgegate_core::execution::ExecutionController;
use edgegate_core::risk::{ManualClock, MemoryAuditSink, MemoryStore, RiskStateHandle};
use edgegate_core::sizers::AdaptiveState;
use edgegate_core::{DecisionEngine, Pipeline, TradingConfig};

fn pipeline() -> (Pipeline, RiskStateHandle) {
    let config = TradingConfig::default();
    let handle = RiskStateHandle::open(
        Box::new(MemoryStore::new()),
        Arc::new(MemoryAuditSink::new()),
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 2, 15, 0, 0).unwrap())),
        ExecutionMode::Paper,
        config.execution.failure_threshold,
    )
    .unwrap();
    let controller = ExecutionController::new(config.execution.clone(), handle.clone());
    (Pipeline::new(DecisionEngine::new(&config), controller), handle)
}

fn signal(market: &str, edge: f64, confidence: f64) -> SignalInput {
    SignalInput {
        signal_id: format!("sig-{market}"),
        market_id: market.to_string(),
        direction: Direction::No,
        predicted_edge: edge,
        confidence,
        price: 0.40,
        quality: MarketQuality::new(20_000.0, 0.02, 0.2, 21.0),
        alpha_type: "news".into(),
    }
}

#[tokio::test]
async fn tradeable_signal_is_executed_and_booked() {
    let (pipeline, handle) = pipeline();
    let outcome = pipeline
        .process(&signal("m1", 0.08, 0.7), 1000.0, None, ExecutionMode::Paper)
        .await
        .unwrap();

    assert_eq!(outcome.decision.action, DecisionAction::Trade);
    let record = outcome.execution.expect("executed").expect("filled");
    assert_eq!(record.status, ExecutionStatus::Filled);
    assert_eq!(record.decision_id, outcome.decision.decision_id);

    let state = handle.get_state().unwrap();
    assert!((state.market_exposure("m1") - outcome.decision.size_usdc).abs() < 1e-9);
    assert_eq!(state.daily_trades, 1);
}

#[tokio::test]
async fn watch_signal_is_not_executed() {
    let (pipeline, handle) = pipeline();
    let outcome = pipeline
        .process(&signal("m2", 0.03, 0.9), 1000.0, None, ExecutionMode::Paper)
        .await
        .unwrap();
    assert_eq!(outcome.decision.action, DecisionAction::Watch);
    assert!(outcome.execution.is_none());
    assert_eq!(handle.get_state().unwrap().open_positions(), 0);
}

#[tokio::test]
async fn deep_drawdown_rejects_through_sizing() {
    let (pipeline, _) = pipeline();
    let adaptive = AdaptiveState {
        drawdown_pct: 0.5,
        ..AdaptiveState::default()
    };
    let outcome = pipeline
        .process(&signal("m3", 0.2, 0.9), 1000.0, Some(&adaptive), ExecutionMode::Paper)
        .await
        .unwrap();
    assert_eq!(outcome.decision.action, DecisionAction::Reject);
    assert!(outcome.execution.is_none());
}

#[tokio::test]
async fn repeated_signals_respect_market_cap() {
    let (pipeline, handle) = pipeline();
    for _ in 0..5 {
        let _ = pipeline
            .process(&signal("m4", 0.2, 1.0), 10_000.0, None, ExecutionMode::Paper)
            .await
            .unwrap();
    }
    let exposure = handle.get_state().unwrap().market_exposure("m4");
    assert!(exposure <= 250.0 + 1e-9, "exposure {exposure}");
    assert!(exposure > 0.0);
}
