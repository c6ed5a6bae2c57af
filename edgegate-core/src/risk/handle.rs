//! Single-writer handle over the runtime risk state.
//!
//! All readers and writers in a process share one `RiskStateHandle`. Every
//! operation takes the mutex, applies any pending UTC day roll, mutates a
//! working copy, persists it, then commits and audits. If persistence fails
//! the in-memory state is left untouched.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use super::audit::{AuditEvent, AuditLogEntry, AuditSink};
use super::state::{Position, RuntimeRiskState};
use super::store::{RiskStateStore, StateError};
use crate::domain::{ExecutionId, ExecutionMode, ExecutionRecord};

// ─── Clock ───────────────────────────────────────────────────────────

/// Source of wall-clock time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, t: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = t;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─── Handle ──────────────────────────────────────────────────────────

/// Result of recording an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub consecutive_failures: u32,
    /// True if this failure tripped the automatic kill-switch.
    pub kill_switch_tripped: bool,
}

struct Inner {
    state: Mutex<RuntimeRiskState>,
    store: Box<dyn RiskStateStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    failure_threshold: u32,
}

/// Shared, cloneable handle. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct RiskStateHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RiskStateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskStateHandle")
            .field("failure_threshold", &self.inner.failure_threshold)
            .finish_non_exhaustive()
    }
}

impl RiskStateHandle {
    /// Load the persisted state, or start a fresh one in `default_mode`.
    pub fn open(
        store: Box<dyn RiskStateStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        default_mode: ExecutionMode,
        failure_threshold: u32,
    ) -> Result<Self, StateError> {
        let state = match store.load()? {
            Some(s) => s,
            None => {
                let fresh = RuntimeRiskState::new(default_mode, clock.now().date_naive());
                store.save(&fresh)?;
                fresh
            }
        };
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                store,
                audit,
                clock,
                failure_threshold: failure_threshold.max(1),
            }),
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn failure_threshold(&self) -> u32 {
        self.inner.failure_threshold
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeRiskState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `f` to a copy of the state, persist, commit, audit.
    fn mutate<T>(
        &self,
        guard: &mut MutexGuard<'_, RuntimeRiskState>,
        execution_id: Option<ExecutionId>,
        f: impl FnOnce(&mut RuntimeRiskState) -> (AuditEvent, T),
    ) -> Result<T, StateError> {
        let before = guard.snapshot();
        let mut next = (**guard).clone();
        let (event, out) = f(&mut next);
        self.inner.store.save(&next)?;
        let after = next.snapshot();
        **guard = next;
        self.inner.audit.append(&AuditLogEntry {
            timestamp: self.inner.clock.now(),
            event,
            execution_id,
            before,
            after,
        })?;
        Ok(out)
    }

    /// Lock and catch up on a missed UTC day boundary.
    fn lock_current(&self) -> Result<MutexGuard<'_, RuntimeRiskState>, StateError> {
        let mut guard = self.lock();
        let today = self.inner.clock.now().date_naive();
        if today > guard.daily_date {
            let stale = guard.daily_date;
            self.mutate(&mut guard, None, |s| {
                s.roll_day(today);
                (AuditEvent::DailyReset { lazy: true }, ())
            })?;
            info!(%stale, %today, "applied missed daily reset");
        }
        Ok(guard)
    }

    // ─── Operations ──────────────────────────────────────────────────

    pub fn get_state(&self) -> Result<RuntimeRiskState, StateError> {
        Ok(self.lock_current()?.clone())
    }

    /// Book a successful (filled or closed-partial) execution.
    pub fn update_on_fill(&self, record: &ExecutionRecord) -> Result<(), StateError> {
        let mut guard = self.lock_current()?;
        let price = record.fill_price.unwrap_or_default();
        self.mutate(&mut guard, Some(record.execution_id), |s| {
            s.apply_fill(&record.market_id, record.direction, record.fill_size, price);
            if record.mode == ExecutionMode::Live {
                s.record_success();
            }
            (
                AuditEvent::FillRecorded {
                    market_id: record.market_id.clone(),
                    direction: record.direction,
                    size: record.fill_size,
                    price,
                    mode: record.mode,
                },
                (),
            )
        })
    }

    /// Count a failure toward the breaker; trips the kill-switch at the threshold.
    pub fn record_execution_failure(
        &self,
        execution_id: Option<ExecutionId>,
        reason: &str,
    ) -> Result<FailureOutcome, StateError> {
        let mut guard = self.lock_current()?;
        let consecutive = self.mutate(&mut guard, execution_id, |s| {
            let n = s.record_failure();
            (
                AuditEvent::ExecutionFailed {
                    reason: reason.to_string(),
                    consecutive_failures: n,
                },
                n,
            )
        })?;
        self.trip_breaker(&mut guard, execution_id, consecutive, reason)
    }

    /// Close out an execution that ended without a successful fill.
    ///
    /// Every failure gets exactly one `ExecutionClosed` entry. Size the venue
    /// already filled is booked as exposure in the same mutation, and the
    /// breaker counts the failure only when `counted` is set.
    pub fn close_failed_execution(
        &self,
        record: &ExecutionRecord,
        reason: &str,
        counted: bool,
    ) -> Result<FailureOutcome, StateError> {
        let mut guard = self.lock_current()?;
        let price = record.fill_price.unwrap_or_default();
        let consecutive = self.mutate(&mut guard, Some(record.execution_id), |s| {
            s.apply_fill(&record.market_id, record.direction, record.fill_size, price);
            let n = if counted {
                s.record_failure()
            } else {
                s.consecutive_failures
            };
            (
                AuditEvent::ExecutionClosed {
                    market_id: record.market_id.clone(),
                    status: record.status,
                    reason: reason.to_string(),
                    filled_size: record.fill_size,
                    counted,
                    consecutive_failures: n,
                },
                n,
            )
        })?;
        if !counted {
            return Ok(FailureOutcome {
                consecutive_failures: consecutive,
                kill_switch_tripped: false,
            });
        }
        self.trip_breaker(&mut guard, Some(record.execution_id), consecutive, reason)
    }

    fn trip_breaker(
        &self,
        guard: &mut MutexGuard<'_, RuntimeRiskState>,
        execution_id: Option<ExecutionId>,
        consecutive: u32,
        reason: &str,
    ) -> Result<FailureOutcome, StateError> {
        let threshold = self.inner.failure_threshold;
        let trip = consecutive >= threshold && !guard.kill_switch_active;
        if trip {
            let why = format!("{consecutive} consecutive execution failures (last: {reason})");
            self.mutate(guard, execution_id, |s| {
                s.activate_kill_switch(why.clone(), true);
                (
                    AuditEvent::KillSwitchActivated {
                        reason: why.clone(),
                        automatic: true,
                    },
                    (),
                )
            })?;
            warn!(consecutive, threshold, "circuit breaker tripped kill-switch");
        }
        Ok(FailureOutcome {
            consecutive_failures: consecutive,
            kill_switch_tripped: trip,
        })
    }

    /// Operator kill-switch.
    pub fn activate_kill_switch(&self, reason: &str) -> Result<(), StateError> {
        let mut guard = self.lock_current()?;
        self.mutate(&mut guard, None, |s| {
            s.activate_kill_switch(reason, false);
            (
                AuditEvent::KillSwitchActivated {
                    reason: reason.to_string(),
                    automatic: false,
                },
                (),
            )
        })?;
        warn!(reason, "kill-switch activated");
        Ok(())
    }

    pub fn deactivate_kill_switch(&self) -> Result<(), StateError> {
        let mut guard = self.lock_current()?;
        self.mutate(&mut guard, None, |s| {
            s.deactivate_kill_switch();
            (AuditEvent::KillSwitchDeactivated, ())
        })?;
        info!("kill-switch deactivated");
        Ok(())
    }

    /// Scheduled daily reset. Returns `false` if today's reset already ran.
    pub fn reset_daily(&self) -> Result<bool, StateError> {
        let mut guard = self.lock();
        let today = self.inner.clock.now().date_naive();
        if today <= guard.daily_date {
            return Ok(false);
        }
        self.mutate(&mut guard, None, |s| {
            s.roll_day(today);
            (AuditEvent::DailyReset { lazy: false }, ())
        })?;
        info!(%today, "daily risk counters reset");
        Ok(true)
    }

    pub fn set_execution_mode(&self, mode: ExecutionMode) -> Result<(), StateError> {
        let mut guard = self.lock_current()?;
        let from = guard.execution_mode;
        if from == mode {
            return Ok(());
        }
        self.mutate(&mut guard, None, |s| {
            s.set_mode(mode);
            (AuditEvent::ModeChanged { from, to: mode }, ())
        })?;
        info!(%from, to = %mode, "execution mode changed");
        Ok(())
    }

    /// Close a market's position with its realized PnL.
    pub fn settle_position(&self, market_id: &str, pnl: f64) -> Result<Option<Position>, StateError> {
        let mut guard = self.lock_current()?;
        self.mutate(&mut guard, None, |s| {
            let closed = s.settle_position(market_id, pnl);
            (
                AuditEvent::PositionSettled {
                    market_id: market_id.to_string(),
                    pnl,
                },
                closed,
            )
        })
    }
}
