//! Win-probability derivation.
//!
//! How edge and confidence combine with the market price is a policy choice:
//! the edge may already be reflected in the price, so the derivation is kept
//! swappable. Every policy must be non-decreasing in edge and in confidence.

use std::fmt::Debug;

use crate::config::ProbabilityModel;

pub trait ProbabilityPolicy: Send + Sync + Debug {
    /// Model probability that the chosen side pays out.
    fn win_probability(&self, price: f64, edge: f64, confidence: f64) -> f64;

    /// Extra multiplier on the stake. Defaults to 1.
    fn stake_multiplier(&self, _confidence: f64) -> f64 {
        1.0
    }

    fn name(&self) -> &str;
}

/// p = price + edge × confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceWeighted;

impl ProbabilityPolicy for ConfidenceWeighted {
    fn win_probability(&self, price: f64, edge: f64, confidence: f64) -> f64 {
        (price + edge * confidence.clamp(0.0, 1.0)).clamp(0.0, 1.0)
    }

    fn name(&self) -> &str {
        "confidence_weighted"
    }
}

/// p = price + edge; the stake is then scaled by confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeOverImplied;

impl ProbabilityPolicy for EdgeOverImplied {
    fn win_probability(&self, price: f64, edge: f64, _confidence: f64) -> f64 {
        (price + edge).clamp(0.0, 1.0)
    }

    fn stake_multiplier(&self, confidence: f64) -> f64 {
        confidence.clamp(0.0, 1.0)
    }

    fn name(&self) -> &str {
        "edge_over_implied"
    }
}

pub fn policy_for(model: ProbabilityModel) -> Box<dyn ProbabilityPolicy> {
    match model {
        ProbabilityModel::ConfidenceWeighted => Box::new(ConfidenceWeighted),
        ProbabilityModel::EdgeOverImplied => Box::new(EdgeOverImplied),
    }
}
