//! Interchangeable deviation scorers for the temporal pass.

use crate::config::ScoringStrategy;
use crate::stats::{self, RobustLocation};

/// Baseline and per-point deviation scores for one series.
#[derive(Debug, Clone, PartialEq)]
pub struct Deviations {
    /// Expected value each point is compared against.
    pub center: f64,
    /// Dimensionless score per input value, same order as the input.
    pub scores: Vec<f64>,
}

/// Scores how far each value of a series sits from its baseline.
pub trait DeviationScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// `values` holds at least three points.
    fn score(&self, values: &[f64], epsilon: f64) -> Deviations;
}

/// Median / MAD robust z-score.
#[derive(Debug, Copy, Clone, Default)]
pub struct RobustScorer;

impl DeviationScorer for RobustScorer {
    fn name(&self) -> &'static str {
        "robust"
    }

    fn score(&self, values: &[f64], epsilon: f64) -> Deviations {
        let loc = RobustLocation::of(values);
        Deviations {
            center: loc.median,
            scores: values.iter().map(|v| loc.score(*v, epsilon)).collect(),
        }
    }
}

/// Mean of three detectors: robust z, classical z and IQR distance.
///
/// Deterministic stand-in for tree-ensemble outlier scoring; the individual
/// detectors disagree on skewed or tiny samples and averaging damps that.
#[derive(Debug, Copy, Clone, Default)]
pub struct EnsembleScorer;

/// IQR of a normal distribution in units of sigma.
const IQR_TO_SIGMA: f64 = 1.349;

impl DeviationScorer for EnsembleScorer {
    fn name(&self) -> &'static str {
        "ensemble"
    }

    fn score(&self, values: &[f64], epsilon: f64) -> Deviations {
        let robust = RobustLocation::of(values);

        let mean = stats::mean(values);
        let std = stats::stddev_population(values, mean).max(epsilon);

        let q1 = stats::quantile(values, 0.25);
        let q3 = stats::quantile(values, 0.75);
        let iqr_sigma = ((q3 - q1) / IQR_TO_SIGMA).max(epsilon);

        let scores = values
            .iter()
            .map(|v| {
                let z_robust = robust.score(*v, epsilon);
                let z_classic = (v - mean).abs() / std;
                let z_iqr = (v - robust.median).abs() / iqr_sigma;
                (z_robust + z_classic + z_iqr) / 3.0
            })
            .collect();

        Deviations {
            center: robust.median,
            scores,
        }
    }
}

impl ScoringStrategy {
    pub fn scorer(self) -> Box<dyn DeviationScorer> {
        match self {
            ScoringStrategy::Robust => Box::new(RobustScorer),
            ScoringStrategy::Ensemble => Box::new(EnsembleScorer),
        }
    }
}
