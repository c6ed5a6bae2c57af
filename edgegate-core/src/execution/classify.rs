//! Failure classification for venue errors.
//!
//! Only `PriceMoved`, `RateLimited` and `NetworkError` are worth retrying;
//! everything else aborts the execution on the first occurrence.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::venue::VenueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InsufficientBalance,
    MarketClosed,
    PriceMoved,
    OrderNotFound,
    RateLimited,
    NetworkError,
    Unknown,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::PriceMoved | Self::RateLimited | Self::NetworkError)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InsufficientBalance => "insufficient_balance",
            Self::MarketClosed => "market_closed",
            Self::PriceMoved => "price_moved",
            Self::OrderNotFound => "order_not_found",
            Self::RateLimited => "rate_limited",
            Self::NetworkError => "network_error",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

const KEYWORDS: &[(&[&str], FailureKind)] = &[
    (
        &["insufficient balance", "insufficient funds", "not enough balance", "insufficient_balance"],
        FailureKind::InsufficientBalance,
    ),
    (
        &["market closed", "market is closed", "market_closed", "not accepting orders", "resolved"],
        FailureKind::MarketClosed,
    ),
    (
        &["price moved", "price_moved", "slippage", "stale price", "price changed"],
        FailureKind::PriceMoved,
    ),
    (
        &["order not found", "order_not_found", "unknown order"],
        FailureKind::OrderNotFound,
    ),
    (
        &["rate limit", "rate_limited", "too many requests"],
        FailureKind::RateLimited,
    ),
    (
        &["network", "connection", "econnreset", "timed out", "timeout", "unavailable"],
        FailureKind::NetworkError,
    ),
];

fn classify_message(msg: &str) -> FailureKind {
    let lower = msg.to_ascii_lowercase();
    KEYWORDS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map_or(FailureKind::Unknown, |(_, kind)| *kind)
}

pub fn classify(err: &VenueError) -> FailureKind {
    match err {
        VenueError::Timeout(_) | VenueError::Transport(_) => FailureKind::NetworkError,
        VenueError::Http { status: 429, .. } => FailureKind::RateLimited,
        VenueError::Http { status: 404, .. } => FailureKind::OrderNotFound,
        VenueError::Http { status, .. } if *status >= 500 => FailureKind::NetworkError,
        VenueError::Http { body, .. } => classify_message(body),
        VenueError::Rejected(msg) => classify_message(msg),
    }
}
