//! Venue boundary: the only place the controller suspends.
//!
//! Every method is a network round trip. The controller wraps each call in
//! its own timeout, so implementations need not enforce one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Direction, Quote};

/// Transport or venue-reported failure, before classification.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VenueError {
    /// The venue accepted the request and refused it with a message.
    #[error("venue rejected request: {0}")]
    Rejected(String),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Order to place on the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Venue instrument id for the market+direction.
    pub token_id: String,
    pub direction: Direction,
    /// Limit price of the chosen side (0..1).
    pub price: f64,
    /// Notional in USDC.
    pub size: f64,
    /// Signer credential reference passed through to the venue client.
    pub signer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueOrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// Snapshot of an order's fill progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub status: VenueOrderStatus,
    /// Filled notional in USDC.
    pub filled_size: f64,
    pub avg_price: Option<f64>,
    pub tx_hash: Option<String>,
}

#[async_trait]
pub trait Venue: Send + Sync {
    /// Best price and resting liquidity for one side of a market.
    async fn quote(&self, market_id: &str, direction: Direction) -> Result<Quote, VenueError>;

    /// Spendable balance of the funding token, in USDC.
    async fn wallet_balance(&self, funding_token: &str) -> Result<f64, VenueError>;

    /// Instrument id for a market+direction pair.
    async fn resolve_token(&self, market_id: &str, direction: Direction) -> Result<String, VenueError>;

    /// Place an order; returns the venue order id.
    async fn submit_order(&self, order: &OrderRequest) -> Result<String, VenueError>;

    async fn order_status(&self, order_id: &str) -> Result<OrderStatusReport, VenueError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;
}
