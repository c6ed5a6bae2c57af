//! Background daily reset at UTC midnight.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::handle::RiskStateHandle;

/// Time remaining until the next UTC midnight after `now`.
pub fn until_next_utc_midnight(now: DateTime<Utc>) -> Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    match next {
        Some(next) => (next - now).to_std().unwrap_or(Duration::ZERO),
        None => Duration::from_secs(24 * 60 * 60),
    }
}

/// Spawn a task that calls [`RiskStateHandle::reset_daily`] just after every
/// UTC midnight. The reset is idempotent, so a late or duplicate wake-up is
/// harmless; missed boundaries are also caught lazily on state access.
pub fn spawn_daily_reset(handle: RiskStateHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = until_next_utc_midnight(handle.clock().now()) + Duration::from_secs(1);
            debug!(secs = wait.as_secs(), "sleeping until next daily reset");
            tokio::time::sleep(wait).await;
            if let Err(e) = handle.reset_daily() {
                error!(error = %e, "scheduled daily reset failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutionMode;
    use crate::risk::audit::{AuditEvent, MemoryAuditSink};
    use crate::risk::handle::{Clock, ManualClock};
    use crate::risk::store::MemoryStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn task_resets_after_midnight() {
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 23, 30, 0).unwrap()));
        let handle = RiskStateHandle::open(
            Box::new(MemoryStore::new()),
            audit.clone(),
            clock.clone(),
            ExecutionMode::Paper,
            3,
        )
        .unwrap();
        handle.settle_position("m1", -40.0).unwrap();

        let task = spawn_daily_reset(handle.clone());
        // The task reads the clock once, at 23:30, and sleeps until 00:00:01.
        tokio::time::sleep(Duration::from_secs(60)).await;

        clock.set(Utc.with_ymd_and_hms(2024, 5, 11, 0, 0, 1).unwrap());
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;

        let events: Vec<AuditEvent> = audit.entries().into_iter().map(|e| e.event).collect();
        assert!(events.contains(&AuditEvent::DailyReset { lazy: false }), "{events:?}");
        assert!(!events.contains(&AuditEvent::DailyReset { lazy: true }));

        let s = handle.get_state().unwrap();
        assert_eq!(s.daily_date, clock.now().date_naive());
        assert_eq!(s.daily_pnl, 0.0);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn task_does_not_reset_before_midnight() {
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 22, 0, 0).unwrap()));
        let handle = RiskStateHandle::open(
            Box::new(MemoryStore::new()),
            audit.clone(),
            clock,
            ExecutionMode::Paper,
            3,
        )
        .unwrap();

        let task = spawn_daily_reset(handle);
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;

        assert!(audit.is_empty());
        task.abort();
    }

    #[test]
    fn midnight_distance() {
        let t = Utc.with_ymd_and_hms(2024, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(until_next_utc_midnight(t), Duration::from_secs(30 * 60));
    }

    #[test]
    fn exactly_midnight_waits_full_day() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(until_next_utc_midnight(t), Duration::from_secs(86_400));
    }
}
