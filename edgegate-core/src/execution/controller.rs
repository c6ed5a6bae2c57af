//! Staged execution controller.
//!
//! One entry point, [`ExecutionController::execute`], resolves the effective
//! mode and dispatches through a single match. The three modes share the
//! Decision contract and differ only in how the fill is acquired.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::fill_tracker::{FillResolution, FillTracker};
use super::retry::{with_retry, RetryFailure, RetryPolicy};
use super::venue::{OrderRequest, Venue};
use super::{ExecutionError, ExecutionFailure};
use crate::config::ExecutionSettings;
use crate::domain::{Decision, ExecutionMode, ExecutionRecord, ExecutionStatus};
use crate::risk::{RiskStateHandle, RuntimeRiskState};

/// Handles required before any live order may be placed.
#[derive(Debug, Clone, Default)]
pub struct LiveCredentials {
    /// Signing credential reference.
    pub signer: Option<String>,
    /// Funding-token contract the wallet balance is read from.
    pub funding_token: Option<String>,
}

pub struct ExecutionController {
    settings: ExecutionSettings,
    state: RiskStateHandle,
    venue: Option<Arc<dyn Venue>>,
    credentials: LiveCredentials,
    retry: RetryPolicy,
    tracker: FillTracker,
}

impl ExecutionController {
    pub fn new(settings: ExecutionSettings, state: RiskStateHandle) -> Self {
        let retry = RetryPolicy::from_settings(&settings);
        let tracker = FillTracker::new(&settings);
        Self {
            settings,
            state,
            venue: None,
            credentials: LiveCredentials::default(),
            retry,
            tracker,
        }
    }

    pub fn with_venue(mut self, venue: Arc<dyn Venue>) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn with_credentials(mut self, credentials: LiveCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn state(&self) -> &RiskStateHandle {
        &self.state
    }

    /// Mode actually used for a request, after the kill-switch and the
    /// force-paper override have been applied.
    pub fn effective_mode(&self, requested: ExecutionMode, state: &RuntimeRiskState) -> ExecutionMode {
        if requested == ExecutionMode::Paper {
            return requested;
        }
        if state.kill_switch_active {
            warn!(
                %requested,
                reason = state.kill_switch_reason.as_deref().unwrap_or(""),
                "kill-switch active; downgrading to paper"
            );
            return ExecutionMode::Paper;
        }
        if self.settings.force_paper {
            warn!(%requested, "force_paper override set; downgrading to paper");
            return ExecutionMode::Paper;
        }
        requested
    }

    /// Execute a decision. State is updated only once the execution is closed,
    /// and every failure leaves exactly one closing audit entry.
    pub async fn execute(
        &self,
        decision: &Decision,
        requested: ExecutionMode,
    ) -> Result<ExecutionRecord, ExecutionFailure> {
        let now = self.state.clock().now();
        let snapshot = match self.state.get_state() {
            Ok(s) => s,
            Err(e) => {
                let record = ExecutionRecord::pending(decision, requested, now);
                return Err(self.close_failure(self.fail(record, ExecutionError::State(e)), requested));
            }
        };
        let mode = self.effective_mode(requested, &snapshot);
        let record = ExecutionRecord::pending(decision, mode, now);
        let execution_id = record.execution_id;

        let result = if !decision.action.is_executable() || decision.size_usdc <= 0.0 {
            Err(self.fail(
                record,
                ExecutionError::NotExecutable {
                    action: decision.action,
                    size: decision.size_usdc,
                },
            ))
        } else {
            info!(%execution_id, market_id = %decision.market_id, %mode, size = decision.size_usdc, "executing decision");
            match mode {
                ExecutionMode::Paper => self.paper_fill(decision, record),
                ExecutionMode::Shadow => self.shadow_fill(decision, record).await,
                ExecutionMode::Live => self.live_fill(decision, record).await,
            }
        };

        match result {
            Ok(record) => {
                if let Err(e) = self.state.update_on_fill(&record) {
                    error!(%execution_id, error = %e, "filled but failed to record fill in risk state");
                    let failure = ExecutionFailure {
                        record: Box::new(record),
                        error: ExecutionError::State(e),
                    };
                    return Err(self.close_failure(failure, mode));
                }
                info!(
                    %execution_id,
                    status = %record.status,
                    fill_price = record.fill_price.unwrap_or_default(),
                    fill_size = record.fill_size,
                    "execution closed"
                );
                Ok(record)
            }
            Err(failure) => Err(self.close_failure(failure, mode)),
        }
    }

    // ─── Modes ───────────────────────────────────────────────────────

    fn paper_fill(&self, decision: &Decision, mut record: ExecutionRecord) -> Result<ExecutionRecord, ExecutionFailure> {
        let price = (decision.price * (1.0 + self.settings.paper_slippage_pct)).clamp(0.0, 1.0);
        let fees = decision.size_usdc * self.settings.fee_pct;
        let now = self.state.clock().now();
        match record.mark_filled(price, decision.size_usdc, decision.price, fees, now) {
            Ok(()) => Ok(record),
            Err(e) => Err(self.fail(record, e.into())),
        }
    }

    async fn shadow_fill(&self, decision: &Decision, mut record: ExecutionRecord) -> Result<ExecutionRecord, ExecutionFailure> {
        if !decision.risk_checks.all_passed() {
            warn!(
                execution_id = %record.execution_id,
                failed = ?decision.risk_checks.failed_gates(),
                "shadow execution with failed risk checks"
            );
        }

        let quoted = match &self.venue {
            Some(venue) => {
                match tokio::time::timeout(
                    self.settings.request_timeout(),
                    venue.quote(&decision.market_id, decision.direction),
                )
                .await
                {
                    Ok(Ok(q)) if q.best_price > 0.0 && q.best_price < 1.0 => Some(q.best_price),
                    Ok(Ok(q)) => {
                        debug!(best_price = q.best_price, "ignoring out-of-range shadow quote");
                        None
                    }
                    Ok(Err(e)) => {
                        debug!(error = %e, "shadow quote failed; using fallback slippage");
                        None
                    }
                    Err(_) => {
                        debug!("shadow quote timed out; using fallback slippage");
                        None
                    }
                }
            }
            None => None,
        };
        record.attempts = 1;

        let price = quoted
            .unwrap_or_else(|| decision.price * (1.0 + self.settings.shadow_fallback_slippage_pct))
            .clamp(0.0, 1.0);
        let fees = decision.size_usdc * self.settings.fee_pct;
        let now = self.state.clock().now();
        match record.mark_filled(price, decision.size_usdc, decision.price, fees, now) {
            Ok(()) => Ok(record),
            Err(e) => Err(self.fail(record, e.into())),
        }
    }

    async fn live_fill(&self, decision: &Decision, mut record: ExecutionRecord) -> Result<ExecutionRecord, ExecutionFailure> {
        let mut missing = Vec::new();
        if self.credentials.signer.is_none() {
            missing.push("signer");
        }
        if self.venue.is_none() {
            missing.push("venue");
        }
        if self.credentials.funding_token.is_none() {
            missing.push("funding_token");
        }
        let (Some(signer), Some(venue), Some(funding_token)) = (
            self.credentials.signer.as_deref(),
            self.venue.as_deref(),
            self.credentials.funding_token.as_deref(),
        ) else {
            return Err(self.fail(record, ExecutionError::LiveTradingDenied { missing }));
        };

        if !decision.risk_checks.all_passed() {
            let failed = decision.risk_checks.failed_gates();
            return Err(self.fail(record, ExecutionError::RiskRejected { failed }));
        }

        let size = decision.size_usdc;

        let balance = with_retry(&self.retry, "wallet_balance", |_| venue.wallet_balance(funding_token)).await;
        let balance = match balance {
            Ok((b, _)) => b,
            Err(f) => return Err(self.venue_failure(record, f)),
        };
        if balance < size {
            record.attempts = 1;
            return Err(self.fail(
                record,
                ExecutionError::InsufficientBalance {
                    available: balance,
                    required: size,
                },
            ));
        }

        let token_id = with_retry(&self.retry, "resolve_token", |_| {
            venue.resolve_token(&decision.market_id, decision.direction)
        })
        .await;
        let token_id = match token_id {
            Ok((t, _)) => t,
            Err(f) => return Err(self.venue_failure(record, f)),
        };

        let quote = with_retry(&self.retry, "quote", |_| venue.quote(&decision.market_id, decision.direction)).await;
        let quote = match quote {
            Ok((q, _)) => q,
            Err(f) => return Err(self.venue_failure(record, f)),
        };

        let order = OrderRequest {
            token_id,
            direction: decision.direction,
            price: quote.best_price,
            size,
            signer: signer.to_string(),
        };
        let execution_id = record.execution_id;
        let submitted = with_retry(&self.retry, "submit_order", |attempt| {
            debug!(%execution_id, attempt, "submitting order");
            venue.submit_order(&order)
        })
        .await;
        let (order_id, attempts) = match submitted {
            Ok(ok) => ok,
            Err(f) => return Err(self.venue_failure(record, f)),
        };
        record.attempts = attempts;
        record.venue_order_id = Some(order_id.clone());
        info!(%execution_id, %order_id, attempts, "order accepted");

        let outcome = self.tracker.track(venue, &order_id, size).await;
        record.tx_hash = outcome.tx_hash.clone();
        let fill_price = outcome.avg_price.unwrap_or(quote.best_price);
        let fees = outcome.filled_size * self.settings.fee_pct;
        let now = self.state.clock().now();

        let transition = match outcome.resolution {
            FillResolution::Filled => {
                let filled = if outcome.filled_size > 0.0 { outcome.filled_size.min(size) } else { size };
                record.mark_filled(fill_price, filled, decision.price, filled * self.settings.fee_pct, now)
            }
            FillResolution::PartialAccepted => record
                .mark_partial(outcome.filled_size.min(size), Some(fill_price))
                .and_then(|()| record.close_partial(decision.price, fees, now)),
            FillResolution::TimedOut => {
                if outcome.filled_size > 0.0 {
                    if let Err(e) = record.mark_partial(outcome.filled_size.min(size), Some(fill_price)) {
                        return Err(self.fail(record, e.into()));
                    }
                }
                let error = ExecutionError::FillTimeout {
                    filled: outcome.filled_size,
                    requested: size,
                };
                return Err(self.fail(record, error));
            }
            FillResolution::Terminated(status) => {
                if outcome.filled_size > 0.0 {
                    if let Err(e) = record.mark_partial(outcome.filled_size.min(size), Some(fill_price)) {
                        return Err(self.fail(record, e.into()));
                    }
                }
                return Err(self.fail(record, ExecutionError::OrderTerminated { status }));
            }
        };
        match transition {
            Ok(()) => Ok(record),
            Err(e) => Err(self.fail(record, e.into())),
        }
    }

    // ─── Failure helpers ─────────────────────────────────────────────

    fn venue_failure(&self, mut record: ExecutionRecord, failure: RetryFailure) -> ExecutionFailure {
        record.attempts = failure.attempts;
        let error = ExecutionError::Venue {
            kind: failure.kind,
            attempts: failure.attempts,
            message: failure.last_error.to_string(),
        };
        self.fail(record, error)
    }

    /// Book a failed execution in the risk state: any partial fill becomes
    /// exposure, and live venue-side failures count toward the breaker.
    fn close_failure(&self, failure: ExecutionFailure, mode: ExecutionMode) -> ExecutionFailure {
        let execution_id = failure.record.execution_id;
        warn!(%execution_id, %mode, error = %failure.error, filled = failure.record.fill_size, "execution failed");
        let counted = mode == ExecutionMode::Live && failure.error.counts_toward_breaker();
        match self
            .state
            .close_failed_execution(&failure.record, &failure.error.to_string(), counted)
        {
            Ok(outcome) if outcome.kill_switch_tripped => {
                error!(
                    consecutive = outcome.consecutive_failures,
                    "kill-switch tripped by consecutive live failures"
                );
            }
            Ok(_) => {}
            Err(e) => error!(%execution_id, error = %e, "failed to record closed execution"),
        }
        failure
    }

    /// Close `record` as failed (if it is still open) and pair it with `error`.
    fn fail(&self, mut record: ExecutionRecord, error: ExecutionError) -> ExecutionFailure {
        if record.status != ExecutionStatus::Failed {
            if let Err(e) = record.mark_failed(error.to_string(), self.state.clock().now()) {
                debug!(error = %e, "record already closed");
            }
        }
        ExecutionFailure {
            record: Box::new(record),
            error,
        }
    }
}
