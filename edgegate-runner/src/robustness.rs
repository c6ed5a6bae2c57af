//! Composite robustness score (0–100) from walk-forward and Monte Carlo results.
//!
//! Walk-forward contributes `1 − divergence`; Monte Carlo contributes how
//! narrow the PnL interval is relative to the outcome it brackets. Components
//! that could not be computed drop out and the rest are renormalized.

use serde::{Deserialize, Serialize};

use crate::monte_carlo::MonteCarloResult;
use crate::walk_forward::WalkForwardResult;

const WALK_FORWARD_WEIGHT: f64 = 0.5;
const MONTE_CARLO_WEIGHT: f64 = 0.5;
/// Relative CI width at which the interval component reaches zero.
const MAX_RELATIVE_WIDTH: f64 = 4.0;
/// An overfit flag caps the score below a passing grade.
const OVERFIT_CAP: f64 = 49.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobustnessGrade {
    A,
    B,
    C,
    D,
    F,
    /// Neither validation could run.
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessScore {
    pub score: f64,
    pub grade: RobustnessGrade,
    pub walk_forward_component: Option<f64>,
    pub monte_carlo_component: Option<f64>,
}

pub fn interval_component(mc: &MonteCarloResult) -> f64 {
    1.0 - (mc.relative_ci_width() / MAX_RELATIVE_WIDTH).clamp(0.0, 1.0)
}

pub fn robustness_score(
    walk_forward: Option<&WalkForwardResult>,
    monte_carlo: Option<&MonteCarloResult>,
) -> RobustnessScore {
    let wf = walk_forward.map(|w| 1.0 - w.divergence.clamp(0.0, 1.0));
    let mc = monte_carlo.map(interval_component);

    let mut weighted = 0.0;
    let mut weight = 0.0;
    if let Some(c) = wf {
        weighted += WALK_FORWARD_WEIGHT * c;
        weight += WALK_FORWARD_WEIGHT;
    }
    if let Some(c) = mc {
        weighted += MONTE_CARLO_WEIGHT * c;
        weight += MONTE_CARLO_WEIGHT;
    }
    if weight == 0.0 {
        return RobustnessScore {
            score: 0.0,
            grade: RobustnessGrade::Insufficient,
            walk_forward_component: None,
            monte_carlo_component: None,
        };
    }

    let mut score = 100.0 * weighted / weight;
    if walk_forward.is_some_and(|w| w.overfit) {
        score = score.min(OVERFIT_CAP);
    }
    RobustnessScore {
        score,
        grade: assign_grade(score),
        walk_forward_component: wf,
        monte_carlo_component: mc,
    }
}

fn assign_grade(score: f64) -> RobustnessGrade {
    if score >= 80.0 {
        RobustnessGrade::A
    } else if score >= 65.0 {
        RobustnessGrade::B
    } else if score >= 50.0 {
        RobustnessGrade::C
    } else if score >= 35.0 {
        RobustnessGrade::D
    } else {
        RobustnessGrade::F
    }
}
