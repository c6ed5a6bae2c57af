//! Execution controller against a scripted venue.
//!
//! All tests run on paused tokio time, so backoff and fill polling complete
//! instantly while keeping their ordering.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use edgegate_core::config::ExecutionSettings;
use edgegate_core::domain::{
    Decision, DecisionAction, DecisionId, Direction, ExecutionMode, ExecutionStatus, Quote, Rationale,
    RiskChecks,
};
use edgegate_core::execution::{
    ExecutionController, ExecutionError, FailureKind, LiveCredentials, OrderRequest, OrderStatusReport,
    Venue, VenueError, VenueOrderStatus,
};
use edgegate_core::risk::{AuditEvent, ManualClock, MemoryAuditSink, MemoryStore, RiskStateHandle};

// ── Scripted venue ───────────────────────────────────────────────────

struct ScriptedVenue {
    balance: f64,
    quote: Result<Quote, VenueError>,
    submit_error: Option<VenueError>,
    statuses: Mutex<VecDeque<OrderStatusReport>>,
    /// Status reported from the moment the order is cancelled.
    after_cancel: Option<OrderStatusReport>,
    submit_calls: AtomicU32,
    cancel_calls: AtomicU32,
}

impl ScriptedVenue {
    fn new() -> Self {
        Self {
            balance: 10_000.0,
            quote: Ok(Quote {
                best_price: 0.51,
                liquidity: 50_000.0,
            }),
            submit_error: None,
            statuses: Mutex::new(VecDeque::new()),
            after_cancel: None,
            submit_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
        }
    }

    fn with_statuses(self, statuses: Vec<OrderStatusReport>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }
}

fn report(status: VenueOrderStatus, filled: f64) -> OrderStatusReport {
    OrderStatusReport {
        status,
        filled_size: filled,
        avg_price: (filled > 0.0).then_some(0.52),
        tx_hash: (status == VenueOrderStatus::Filled).then(|| "0xabc".to_string()),
    }
}

#[async_trait]
impl Venue for ScriptedVenue {
    async fn quote(&self, _market_id: &str, _direction: Direction) -> Result<Quote, VenueError> {
        self.quote.clone()
    }

    async fn wallet_balance(&self, _funding_token: &str) -> Result<f64, VenueError> {
        Ok(self.balance)
    }

    async fn resolve_token(&self, market_id: &str, direction: Direction) -> Result<String, VenueError> {
        Ok(format!("{market_id}-{direction}"))
    }

    async fn submit_order(&self, _order: &OrderRequest) -> Result<String, VenueError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.submit_error {
            Some(e) => Err(e.clone()),
            None => Ok(format!("order-{n}")),
        }
    }

    async fn order_status(&self, _order_id: &str) -> Result<OrderStatusReport, VenueError> {
        let mut q = self.statuses.lock().unwrap();
        // The last scripted status repeats forever.
        if q.len() > 1 {
            Ok(q.pop_front().unwrap())
        } else {
            Ok(q.front().cloned().unwrap_or_else(|| report(VenueOrderStatus::Open, 0.0)))
        }
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), VenueError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(r) = &self.after_cancel {
            *self.statuses.lock().unwrap() = VecDeque::from([r.clone()]);
        }
        Ok(())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────

fn decision(size: f64) -> Decision {
    Decision {
        decision_id: DecisionId::new(),
        signal_id: "sig".into(),
        market_id: "mkt".into(),
        direction: Direction::Yes,
        price: 0.50,
        action: DecisionAction::Trade,
        size_usdc: size,
        risk_checks: RiskChecks::all_clear(),
        rationale: Rationale {
            alpha_type: "mispricing".into(),
            edge: 0.1,
            confidence: 0.8,
            top_features: vec![],
            rejection_reasons: vec![],
        },
        created_at: Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap(),
    }
}

fn handle() -> (RiskStateHandle, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap()));
    let handle = RiskStateHandle::open(
        Box::new(MemoryStore::new()),
        audit.clone(),
        clock,
        ExecutionMode::Live,
        3,
    )
    .unwrap();
    (handle, audit)
}

fn creds() -> LiveCredentials {
    LiveCredentials {
        signer: Some("key-ref".into()),
        funding_token: Some("usdc".into()),
    }
}

fn live_controller(venue: Arc<ScriptedVenue>) -> (ExecutionController, RiskStateHandle, Arc<MemoryAuditSink>) {
    let (state, audit) = handle();
    let controller = ExecutionController::new(ExecutionSettings::default(), state.clone())
        .with_venue(venue)
        .with_credentials(creds());
    (controller, state, audit)
}

fn closed_entries(audit: &MemoryAuditSink) -> Vec<AuditEvent> {
    audit
        .entries()
        .into_iter()
        .map(|e| e.event)
        .filter(|e| matches!(e, AuditEvent::ExecutionClosed { .. }))
        .collect()
}

// ── Paper / shadow ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn paper_fill_is_deterministic_and_recorded() {
    let (state, audit) = handle();
    let controller = ExecutionController::new(ExecutionSettings::default(), state.clone());

    let rec = controller.execute(&decision(40.0), ExecutionMode::Paper).await.unwrap();
    assert_eq!(rec.status, ExecutionStatus::Filled);
    assert_eq!(rec.mode, ExecutionMode::Paper);
    assert!((rec.fill_price.unwrap() - 0.5025).abs() < 1e-12);
    assert!((rec.fees - 0.04).abs() < 1e-12);
    assert!((rec.slippage - 0.005).abs() < 1e-9);

    let s = state.get_state().unwrap();
    assert_eq!(s.market_exposure("mkt"), 40.0);
    assert_eq!(audit.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shadow_falls_back_when_quote_fails() {
    let mut venue = ScriptedVenue::new();
    venue.quote = Err(VenueError::Transport("down".into()));
    let (controller, _, _) = live_controller(Arc::new(venue));

    let rec = controller.execute(&decision(10.0), ExecutionMode::Shadow).await.unwrap();
    assert_eq!(rec.status, ExecutionStatus::Filled);
    assert!((rec.fill_price.unwrap() - 0.51).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn shadow_uses_real_quote() {
    let (controller, _, _) = live_controller(Arc::new(ScriptedVenue::new()));
    let rec = controller.execute(&decision(10.0), ExecutionMode::Shadow).await.unwrap();
    assert_eq!(rec.fill_price, Some(0.51));
}

// ── Live preconditions and gates ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn live_without_signer_is_denied() {
    let (state, audit) = handle();
    let controller = ExecutionController::new(ExecutionSettings::default(), state.clone())
        .with_venue(Arc::new(ScriptedVenue::new()))
        .with_credentials(LiveCredentials {
            signer: None,
            funding_token: Some("usdc".into()),
        });

    let failure = controller.execute(&decision(10.0), ExecutionMode::Live).await.unwrap_err();
    match &failure.error {
        ExecutionError::LiveTradingDenied { missing } => assert_eq!(missing, &vec!["signer"]),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(failure.record.status, ExecutionStatus::Failed);
    assert_eq!(state.get_state().unwrap().consecutive_failures, 0);

    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].execution_id, Some(failure.record.execution_id));
    match &entries[0].event {
        AuditEvent::ExecutionClosed {
            status,
            counted,
            filled_size,
            reason,
            ..
        } => {
            assert_eq!(*status, ExecutionStatus::Failed);
            assert!(!counted);
            assert_eq!(*filled_size, 0.0);
            assert!(reason.contains("signer"), "{reason}");
        }
        other => panic!("unexpected audit event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn live_requires_all_risk_checks() {
    let venue = Arc::new(ScriptedVenue::new());
    let (controller, _, _) = live_controller(venue.clone());
    let mut d = decision(10.0);
    d.risk_checks.kill_switch_ok = false;

    let failure = controller.execute(&d, ExecutionMode::Live).await.unwrap_err();
    assert!(matches!(failure.error, ExecutionError::RiskRejected { ref failed } if failed == &vec!["kill_switch"]));
    assert_ne!(failure.record.status, ExecutionStatus::Filled);
    assert_eq!(venue.submit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn spread_gate_rejection_is_audited_without_counting() {
    let venue = Arc::new(ScriptedVenue::new());
    let (controller, state, audit) = live_controller(venue.clone());
    let mut d = decision(10.0);
    d.risk_checks.spread_ok = false;

    let failure = controller.execute(&d, ExecutionMode::Live).await.unwrap_err();
    assert!(matches!(failure.error, ExecutionError::RiskRejected { ref failed } if failed == &vec!["spread"]));
    assert_eq!(venue.submit_calls.load(Ordering::SeqCst), 0);

    let closed = closed_entries(&audit);
    assert_eq!(closed.len(), 1);
    assert!(matches!(
        &closed[0],
        AuditEvent::ExecutionClosed { counted: false, consecutive_failures: 0, reason, .. } if reason.contains("spread")
    ));
    assert_eq!(audit.len(), 1);
    assert_eq!(state.get_state().unwrap().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn force_paper_override_downgrades_live() {
    let (state, _) = handle();
    let venue = Arc::new(ScriptedVenue::new());
    let settings = ExecutionSettings {
        force_paper: true,
        ..ExecutionSettings::default()
    };
    let controller = ExecutionController::new(settings, state)
        .with_venue(venue.clone())
        .with_credentials(creds());

    let rec = controller.execute(&decision(10.0), ExecutionMode::Live).await.unwrap();
    assert_eq!(rec.mode, ExecutionMode::Paper);
    assert_eq!(venue.submit_calls.load(Ordering::SeqCst), 0);
}

// ── Live order lifecycle ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn live_fill_after_partial_polls() {
    let venue = Arc::new(ScriptedVenue::new().with_statuses(vec![
        report(VenueOrderStatus::Open, 0.0),
        report(VenueOrderStatus::PartiallyFilled, 30.0),
        report(VenueOrderStatus::Filled, 50.0),
    ]));
    let (controller, state, _) = live_controller(venue.clone());

    let rec = controller.execute(&decision(50.0), ExecutionMode::Live).await.unwrap();
    assert_eq!(rec.status, ExecutionStatus::Filled);
    assert_eq!(rec.fill_size, 50.0);
    assert_eq!(rec.attempts, 1);
    assert_eq!(rec.tx_hash.as_deref(), Some("0xabc"));
    assert_eq!(rec.venue_order_id.as_deref(), Some("order-1"));
    assert_eq!(venue.cancel_calls.load(Ordering::SeqCst), 0);
    assert_eq!(state.get_state().unwrap().market_exposure("mkt"), 50.0);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_submit_retries_to_max() {
    let mut venue = ScriptedVenue::new();
    venue.submit_error = Some(VenueError::Http {
        status: 429,
        body: "slow down".into(),
    });
    let venue = Arc::new(venue);
    let (controller, state, _) = live_controller(venue.clone());

    let failure = controller.execute(&decision(10.0), ExecutionMode::Live).await.unwrap_err();
    assert_eq!(failure.error.failure_kind(), Some(FailureKind::RateLimited));
    assert_eq!(failure.record.attempts, 3);
    assert_eq!(venue.submit_calls.load(Ordering::SeqCst), 3);
    assert_eq!(state.get_state().unwrap().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn insufficient_balance_aborts_after_first_attempt() {
    let mut venue = ScriptedVenue::new();
    venue.submit_error = Some(VenueError::Rejected("insufficient balance".into()));
    let venue = Arc::new(venue);
    let (controller, _, _) = live_controller(venue.clone());

    let failure = controller.execute(&decision(10.0), ExecutionMode::Live).await.unwrap_err();
    assert_eq!(failure.error.failure_kind(), Some(FailureKind::InsufficientBalance));
    assert_eq!(failure.record.attempts, 1);
    assert_eq!(venue.submit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn wallet_short_of_size_fails_before_submit() {
    let mut venue = ScriptedVenue::new();
    venue.balance = 5.0;
    let venue = Arc::new(venue);
    let (controller, _, _) = live_controller(venue.clone());

    let failure = controller.execute(&decision(10.0), ExecutionMode::Live).await.unwrap_err();
    assert!(matches!(failure.error, ExecutionError::InsufficientBalance { .. }));
    assert_eq!(venue.submit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_with_majority_fill_is_partial_success() {
    let venue = Arc::new(
        ScriptedVenue::new().with_statuses(vec![report(VenueOrderStatus::PartiallyFilled, 60.0)]),
    );
    let (controller, state, _) = live_controller(venue.clone());

    let rec = controller.execute(&decision(100.0), ExecutionMode::Live).await.unwrap();
    assert_eq!(rec.status, ExecutionStatus::Partial);
    assert!(rec.is_closed());
    assert!(rec.is_success());
    assert_eq!(rec.fill_size, 60.0);
    assert_eq!(venue.cancel_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.get_state().unwrap().market_exposure("mkt"), 60.0);
}

#[tokio::test(start_paused = true)]
async fn timeout_with_minority_fill_books_exposure_and_counts() {
    let venue = Arc::new(
        ScriptedVenue::new().with_statuses(vec![report(VenueOrderStatus::PartiallyFilled, 40.0)]),
    );
    let (controller, state, audit) = live_controller(venue.clone());

    let failure = controller.execute(&decision(100.0), ExecutionMode::Live).await.unwrap_err();
    assert!(matches!(failure.error, ExecutionError::FillTimeout { .. }));
    assert_eq!(failure.record.status, ExecutionStatus::Failed);
    assert_eq!(failure.record.fill_size, 40.0);
    assert_eq!(venue.cancel_calls.load(Ordering::SeqCst), 1);

    let s = state.get_state().unwrap();
    assert_eq!(s.market_exposure("mkt"), 40.0);
    assert!(s.has_position("mkt"));
    assert_eq!(s.consecutive_failures, 1);

    let closed = closed_entries(&audit);
    assert_eq!(closed.len(), 1);
    assert!(matches!(
        closed[0],
        AuditEvent::ExecutionClosed { filled_size, counted: true, consecutive_failures: 1, .. } if filled_size == 40.0
    ));
}

#[tokio::test(start_paused = true)]
async fn venue_cancel_after_small_fill_still_books_it() {
    let venue = Arc::new(ScriptedVenue::new().with_statuses(vec![
        report(VenueOrderStatus::PartiallyFilled, 20.0),
        report(VenueOrderStatus::Cancelled, 20.0),
    ]));
    let (controller, state, _) = live_controller(venue.clone());

    let failure = controller.execute(&decision(100.0), ExecutionMode::Live).await.unwrap_err();
    assert!(matches!(
        failure.error,
        ExecutionError::OrderTerminated { status: VenueOrderStatus::Cancelled }
    ));
    assert_eq!(failure.record.fill_size, 20.0);
    assert_eq!(venue.cancel_calls.load(Ordering::SeqCst), 0);

    let s = state.get_state().unwrap();
    assert_eq!(s.market_exposure("mkt"), 20.0);
    assert_eq!(s.consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn fill_landing_during_cancel_is_picked_up() {
    let mut venue = ScriptedVenue::new().with_statuses(vec![report(VenueOrderStatus::PartiallyFilled, 30.0)]);
    venue.after_cancel = Some(report(VenueOrderStatus::Cancelled, 70.0));
    let venue = Arc::new(venue);
    let (controller, state, _) = live_controller(venue.clone());

    let rec = controller.execute(&decision(100.0), ExecutionMode::Live).await.unwrap();
    assert_eq!(venue.cancel_calls.load(Ordering::SeqCst), 1);
    assert_eq!(rec.status, ExecutionStatus::Partial);
    assert_eq!(rec.fill_size, 70.0);
    assert_eq!(state.get_state().unwrap().market_exposure("mkt"), 70.0);
}

#[tokio::test(start_paused = true)]
async fn order_filled_in_full_during_cancel_is_filled() {
    let mut venue = ScriptedVenue::new().with_statuses(vec![report(VenueOrderStatus::Open, 0.0)]);
    venue.after_cancel = Some(report(VenueOrderStatus::Filled, 100.0));
    let venue = Arc::new(venue);
    let (controller, _, _) = live_controller(venue.clone());

    let rec = controller.execute(&decision(100.0), ExecutionMode::Live).await.unwrap();
    assert_eq!(rec.status, ExecutionStatus::Filled);
    assert_eq!(rec.fill_size, 100.0);
    assert_eq!(rec.tx_hash.as_deref(), Some("0xabc"));
}

// ── Circuit breaker ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn three_live_failures_trip_kill_switch_then_downgrade() {
    let mut venue = ScriptedVenue::new();
    venue.submit_error = Some(VenueError::Rejected("market is closed".into()));
    let venue = Arc::new(venue);
    let (state, audit) = handle();
    let controller = ExecutionController::new(ExecutionSettings::default(), state.clone())
        .with_venue(venue.clone())
        .with_credentials(creds());

    for _ in 0..3 {
        let failure = controller.execute(&decision(10.0), ExecutionMode::Live).await.unwrap_err();
        assert_eq!(failure.error.failure_kind(), Some(FailureKind::MarketClosed));
    }

    let s = state.get_state().unwrap();
    assert!(s.kill_switch_active);
    assert!(s.kill_switch_automatic);
    assert!(audit.entries().iter().any(|e| matches!(
        e.event,
        AuditEvent::KillSwitchActivated { automatic: true, .. }
    )));

    let rec = controller.execute(&decision(10.0), ExecutionMode::Live).await.unwrap();
    assert_eq!(rec.mode, ExecutionMode::Paper);
    assert_eq!(rec.status, ExecutionStatus::Filled);
    assert_eq!(venue.submit_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn non_executable_decision_is_refused() {
    let (controller, _, _) = live_controller(Arc::new(ScriptedVenue::new()));
    let mut d = decision(10.0);
    d.action = DecisionAction::Watch;
    let failure = controller.execute(&d, ExecutionMode::Paper).await.unwrap_err();
    assert!(matches!(failure.error, ExecutionError::NotExecutable { .. }));
}

#[tokio::test(start_paused = true)]
async fn non_executable_decision_leaves_one_audit_entry() {
    let (state, audit) = handle();
    let controller = ExecutionController::new(ExecutionSettings::default(), state.clone());
    let mut d = decision(10.0);
    d.size_usdc = 0.0;

    controller.execute(&d, ExecutionMode::Paper).await.unwrap_err();
    assert_eq!(audit.len(), 1);
    assert_eq!(closed_entries(&audit).len(), 1);
    assert_eq!(state.get_state().unwrap().open_positions(), 0);
}
