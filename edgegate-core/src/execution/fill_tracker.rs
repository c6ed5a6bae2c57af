//! Bounded fill polling for live orders.
//!
//! Polls order status on a fixed interval until the order reaches a terminal
//! venue status or the fill timeout expires. On timeout the resting remainder
//! is cancelled, the status is read once more, and the partial fill is
//! accepted only if it reaches the configured ratio. Polling has no side
//! effects; the caller applies the outcome once.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::venue::{OrderStatusReport, Venue, VenueOrderStatus};
use crate::config::ExecutionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillResolution {
    Filled,
    /// Closed early with at least the minimum ratio filled.
    PartialAccepted,
    /// Timed out below the minimum ratio; remainder cancelled.
    TimedOut,
    /// The venue cancelled or rejected the order below the minimum ratio.
    Terminated(VenueOrderStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub resolution: FillResolution,
    pub filled_size: f64,
    pub avg_price: Option<f64>,
    pub tx_hash: Option<String>,
    pub polls: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FillTracker {
    poll_interval: Duration,
    fill_timeout: Duration,
    request_timeout: Duration,
    min_partial_fill_ratio: f64,
}

impl FillTracker {
    pub fn new(settings: &ExecutionSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            fill_timeout: settings.fill_timeout(),
            request_timeout: settings.request_timeout(),
            min_partial_fill_ratio: settings.min_partial_fill_ratio,
        }
    }

    fn accepts_partial(&self, filled: f64, requested: f64) -> bool {
        requested > 0.0 && filled > 0.0 && filled / requested >= self.min_partial_fill_ratio
    }

    pub async fn track(&self, venue: &dyn Venue, order_id: &str, requested_size: f64) -> FillOutcome {
        let deadline = Instant::now() + self.fill_timeout;
        let mut last = OrderStatusReport {
            status: VenueOrderStatus::Open,
            filled_size: 0.0,
            avg_price: None,
            tx_hash: None,
        };
        let mut polls = 0u32;

        loop {
            polls += 1;
            match tokio::time::timeout(self.request_timeout, venue.order_status(order_id)).await {
                Ok(Ok(report)) => {
                    last = report;
                    match last.status {
                        VenueOrderStatus::Filled => {
                            return self.outcome(FillResolution::Filled, last, polls);
                        }
                        VenueOrderStatus::Cancelled | VenueOrderStatus::Rejected => {
                            let resolution = if self.accepts_partial(last.filled_size, requested_size) {
                                FillResolution::PartialAccepted
                            } else {
                                FillResolution::Terminated(last.status)
                            };
                            info!(order_id, status = ?last.status, filled = last.filled_size, "order closed by venue");
                            return self.outcome(resolution, last, polls);
                        }
                        VenueOrderStatus::PartiallyFilled => {
                            debug!(order_id, filled = last.filled_size, requested = requested_size, "partial fill");
                        }
                        VenueOrderStatus::Open => {}
                    }
                }
                Ok(Err(e)) => warn!(order_id, error = %e, "status poll failed"),
                Err(_) => warn!(order_id, "status poll timed out"),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }

        match tokio::time::timeout(self.request_timeout, venue.cancel_order(order_id)).await {
            Ok(Ok(())) => info!(order_id, filled = last.filled_size, "cancelled resting order after fill timeout"),
            Ok(Err(e)) => warn!(order_id, error = %e, "cancel after fill timeout failed"),
            Err(_) => warn!(order_id, "cancel after fill timeout timed out"),
        }

        // Fills can land between the last poll and the cancel.
        polls += 1;
        match tokio::time::timeout(self.request_timeout, venue.order_status(order_id)).await {
            Ok(Ok(report)) if report.filled_size >= last.filled_size => {
                if report.filled_size > last.filled_size {
                    info!(order_id, filled = report.filled_size, "fill landed during cancel");
                }
                last = report;
            }
            Ok(Ok(report)) => warn!(
                order_id,
                filled = report.filled_size,
                previous = last.filled_size,
                "post-cancel status reports less fill than before; keeping the larger"
            ),
            Ok(Err(e)) => warn!(order_id, error = %e, "post-cancel status poll failed"),
            Err(_) => warn!(order_id, "post-cancel status poll timed out"),
        }

        let resolution = if last.status == VenueOrderStatus::Filled {
            FillResolution::Filled
        } else if self.accepts_partial(last.filled_size, requested_size) {
            FillResolution::PartialAccepted
        } else {
            FillResolution::TimedOut
        };
        self.outcome(resolution, last, polls)
    }

    fn outcome(&self, resolution: FillResolution, report: OrderStatusReport, polls: u32) -> FillOutcome {
        FillOutcome {
            resolution,
            filled_size: report.filled_size,
            avg_price: report.avg_price,
            tx_hash: report.tx_hash,
            polls,
        }
    }
}
