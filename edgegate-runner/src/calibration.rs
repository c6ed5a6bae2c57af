//! Calibration — does a predicted 70% actually win 70% of the time?
//!
//! Brier score, ten fixed-width probability buckets, expected calibration
//! error, and an over-/under-confidence flag.

use serde::{Deserialize, Serialize};

use crate::trade::BacktestTrade;

pub const N_BUCKETS: usize = 10;
/// Count-weighted deviation beyond which the model is flagged.
pub const CONFIDENCE_BIAS_THRESHOLD: f64 = 0.05;

/// One probability bucket `[lo, hi)`; the last bucket includes 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBucket {
    pub lo: f64,
    pub hi: f64,
    pub predicted_avg: f64,
    pub actual_avg: f64,
    pub count: usize,
}

impl CalibrationBucket {
    pub fn deviation(&self) -> f64 {
        self.predicted_avg - self.actual_avg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationBias {
    WellCalibrated,
    Overconfident,
    Underconfident,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub brier_score: f64,
    pub ece: f64,
    /// Count-weighted mean of (predicted − actual); positive means overconfident.
    pub mean_deviation: f64,
    pub bias: CalibrationBias,
    pub buckets: Vec<CalibrationBucket>,
    pub sample_size: usize,
}

impl CalibrationReport {
    pub fn from_trades(trades: &[BacktestTrade]) -> Self {
        let pairs: Vec<(f64, f64)> = trades
            .iter()
            .map(|t| (t.predicted_probability, t.outcome()))
            .collect();
        Self::from_pairs(&pairs)
    }

    /// Build from `(predicted probability, realized 0/1 outcome)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        let buckets = bucketize(pairs);
        let n = pairs.len();
        let (ece, mean_deviation) = if n == 0 {
            (0.0, 0.0)
        } else {
            let n = n as f64;
            buckets.iter().fold((0.0, 0.0), |(ece, dev), b| {
                let w = b.count as f64 / n;
                (ece + w * b.deviation().abs(), dev + w * b.deviation())
            })
        };
        let bias = if mean_deviation > CONFIDENCE_BIAS_THRESHOLD {
            CalibrationBias::Overconfident
        } else if mean_deviation < -CONFIDENCE_BIAS_THRESHOLD {
            CalibrationBias::Underconfident
        } else {
            CalibrationBias::WellCalibrated
        };

        Self {
            brier_score: brier_score(pairs),
            ece,
            mean_deviation,
            bias,
            buckets,
            sample_size: n,
        }
    }
}

/// Mean squared error between predicted probability and the 0/1 outcome.
pub fn brier_score(pairs: &[(f64, f64)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    pairs.iter().map(|(p, o)| (p - o).powi(2)).sum::<f64>() / pairs.len() as f64
}

pub fn bucket_index(p: f64) -> usize {
    let p = p.clamp(0.0, 1.0);
    ((p * N_BUCKETS as f64) as usize).min(N_BUCKETS - 1)
}

/// Aggregate into ten fixed-width buckets. Empty buckets are kept with zero count.
pub fn bucketize(pairs: &[(f64, f64)]) -> Vec<CalibrationBucket> {
    let mut sums = [(0.0_f64, 0.0_f64, 0_usize); N_BUCKETS];
    for &(p, o) in pairs {
        let s = &mut sums[bucket_index(p)];
        s.0 += p;
        s.1 += o;
        s.2 += 1;
    }
    sums.iter()
        .enumerate()
        .map(|(i, &(p_sum, o_sum, count))| {
            let (predicted_avg, actual_avg) = if count == 0 {
                (0.0, 0.0)
            } else {
                (p_sum / count as f64, o_sum / count as f64)
            };
            CalibrationBucket {
                lo: i as f64 / N_BUCKETS as f64,
                hi: (i + 1) as f64 / N_BUCKETS as f64,
                predicted_avg,
                actual_avg,
                count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::fixtures::with_prediction;

    /// `wins` out of `n` at probability `p`.
    fn group(p: f64, n: usize, wins: usize) -> Vec<(f64, f64)> {
        (0..n).map(|i| (p, if i < wins { 1.0 } else { 0.0 })).collect()
    }

    #[test]
    fn perfectly_certain_predictions_score_zero() {
        let mut pairs = group(1.0, 20, 20);
        pairs.extend(group(0.0, 20, 0));
        let r = CalibrationReport::from_pairs(&pairs);
        assert!(r.brier_score < 1e-12);
        assert!(r.ece < 1e-12);
        assert_eq!(r.bias, CalibrationBias::WellCalibrated);
    }

    #[test]
    fn matched_frequencies_have_zero_ece() {
        let mut pairs = group(0.3, 10, 3);
        pairs.extend(group(0.75, 20, 15));
        pairs.extend(group(0.95, 20, 19));
        let r = CalibrationReport::from_pairs(&pairs);
        assert!(r.ece < 1e-12, "ece {}", r.ece);
        assert_eq!(r.bias, CalibrationBias::WellCalibrated);
        assert_eq!(r.buckets[3].count, 10);
        assert!((r.buckets[7].actual_avg - 0.75).abs() < 1e-12);
    }

    #[test]
    fn overconfidence_flagged() {
        // Says 80%, wins 50%.
        let r = CalibrationReport::from_pairs(&group(0.8, 10, 5));
        assert!((r.ece - 0.3).abs() < 1e-12);
        assert_eq!(r.bias, CalibrationBias::Overconfident);
    }

    #[test]
    fn underconfidence_flagged() {
        let r = CalibrationReport::from_pairs(&group(0.55, 10, 9));
        assert_eq!(r.bias, CalibrationBias::Underconfident);
    }

    #[test]
    fn small_bias_is_tolerated() {
        // 0.62 vs 0.6
        let r = CalibrationReport::from_pairs(&group(0.62, 10, 6));
        assert_eq!(r.bias, CalibrationBias::WellCalibrated);
    }

    #[test]
    fn bucket_edges() {
        assert_eq!(bucket_index(0.0), 0);
        assert_eq!(bucket_index(0.0999), 0);
        assert_eq!(bucket_index(0.1), 1);
        assert_eq!(bucket_index(0.999), 9);
        assert_eq!(bucket_index(1.0), 9);
        assert_eq!(bucket_index(1.7), 9);
    }

    #[test]
    fn ten_buckets_even_when_empty() {
        let r = CalibrationReport::from_pairs(&[]);
        assert_eq!(r.buckets.len(), N_BUCKETS);
        assert_eq!(r.sample_size, 0);
        assert_eq!(r.brier_score, 0.0);
    }

    #[test]
    fn from_trades_uses_direction_adjusted_probability() {
        let trades = vec![with_prediction(0.6, true), with_prediction(0.6, false)];
        let r = CalibrationReport::from_trades(&trades);
        assert_eq!(r.buckets[6].count, 2);
        assert!((r.brier_score - (0.16 + 0.36) / 2.0).abs() < 1e-12);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_pairs() -> impl Strategy<Value = Vec<(f64, f64)>> {
            prop::collection::vec((0.0..=1.0_f64, prop::bool::ANY.prop_map(|w| if w { 1.0 } else { 0.0 })), 0..200)
        }

        proptest! {
            #[test]
            fn buckets_partition_every_pair(pairs in arb_pairs()) {
                let buckets = bucketize(&pairs);
                prop_assert_eq!(buckets.len(), N_BUCKETS);
                prop_assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), pairs.len());
                for (i, b) in buckets.iter().enumerate() {
                    let expected = pairs.iter().filter(|(p, _)| bucket_index(*p) == i).count();
                    prop_assert_eq!(b.count, expected);
                    if b.count > 0 {
                        prop_assert!(b.predicted_avg >= b.lo - 1e-12 && b.predicted_avg <= b.hi + 1e-12);
                        prop_assert!((0.0..=1.0).contains(&b.actual_avg));
                    }
                }
            }

            #[test]
            fn scores_stay_in_unit_range(pairs in arb_pairs()) {
                let r = CalibrationReport::from_pairs(&pairs);
                prop_assert_eq!(r.sample_size, pairs.len());
                prop_assert!(r.brier_score >= 0.0 && r.brier_score <= 1.0 + 1e-12);
                prop_assert!(r.ece >= 0.0 && r.ece <= 1.0 + 1e-12);
                prop_assert!(r.mean_deviation.abs() <= r.ece + 1e-12);
            }
        }
    }
}
