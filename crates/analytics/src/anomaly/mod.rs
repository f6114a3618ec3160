//! Anomaly detection.
//!
//! Two passes:
//! - temporal: per series, point-outliers against a robust baseline plus
//!   sudden period-over-period growth;
//! - cross-entity: per batch, entities whose profile (last value, slope,
//!   volatility) sits far from their peers.

mod population;
mod scorer;

pub use population::EntityProfile;
pub use scorer::{DeviationScorer, Deviations, EnsembleScorer, RobustScorer};

use serde::{Deserialize, Serialize};
use tracing::debug;

use surplus_core::{AnalysisError, AnalysisResult, EntityKey, EntitySeries};

use crate::config::AnomalyConfig;
use crate::stats::RobustLocation;

/// What kind of unusual behavior was detected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    PointOutlier,
    SuddenGrowth,
    CrossEntityOutlier,
}

/// Coarse urgency bucket of an anomaly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// High at `>= 2 * threshold`, medium at `>= threshold`, low below.
    pub fn classify(score: f64, threshold: f64) -> Self {
        if score >= 2.0 * threshold {
            Severity::High
        } else if score >= threshold {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            Severity::High => 3.0,
            Severity::Medium => 2.0,
            Severity::Low => 1.0,
        }
    }
}

/// One flagged point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub period: u32,
    pub observed: f64,
    pub expected: f64,
    /// Dimensionless: robust z for outliers, change ratio for sudden growth,
    /// combined feature distance for cross-entity outliers.
    pub score: f64,
    pub kind: AnomalyKind,
    pub severity: Severity,
}

/// Report ordering: by period, then kind.
pub fn sort_anomalies(anomalies: &mut [Anomaly]) {
    anomalies.sort_by(|a, b| a.period.cmp(&b.period).then(a.kind.cmp(&b.kind)));
}

/// Output of the temporal pass for one series.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalFindings {
    pub anomalies: Vec<Anomaly>,
    /// Robust location of the observed values, reused by the cross-entity pass.
    pub location: RobustLocation,
}

/// Runs both detection passes under one configuration.
pub struct AnomalyDetector {
    config: AnomalyConfig,
    scorer: Box<dyn DeviationScorer>,
    epsilon: f64,
}

impl core::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("config", &self.config)
            .field("scorer", &self.scorer.name())
            .field("epsilon", &self.epsilon)
            .finish()
    }
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig, epsilon: f64) -> Self {
        let scorer = config.scoring.scorer();
        Self {
            config,
            scorer,
            epsilon,
        }
    }

    /// Use a custom scorer instead of the configured strategy.
    pub fn with_scorer(mut self, scorer: Box<dyn DeviationScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Temporal pass. Needs at least three observed points.
    pub fn temporal(&self, series: &EntitySeries) -> AnalysisResult<TemporalFindings> {
        let observed = series.observed();
        if observed.len() < 3 {
            return Err(AnalysisError::insufficient(
                "temporal anomaly detection",
                3,
                observed.len(),
            ));
        }

        let values: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();
        let deviations = self.scorer.score(&values, self.epsilon);
        if deviations.scores.len() != values.len() {
            return Err(AnalysisError::numeric(format!(
                "{} scorer returned {} scores for {} values",
                self.scorer.name(),
                deviations.scores.len(),
                values.len()
            )));
        }

        let mut anomalies = Vec::new();

        let t = self.config.outlier_threshold;
        for ((period, value), score) in observed.iter().zip(&deviations.scores) {
            if *score > t {
                anomalies.push(Anomaly {
                    period: *period,
                    observed: *value,
                    expected: deviations.center,
                    score: *score,
                    kind: AnomalyKind::PointOutlier,
                    severity: Severity::classify(*score, t),
                });
            }
        }

        anomalies.extend(self.sudden_growth(&observed));

        sort_anomalies(&mut anomalies);
        debug!(
            entity = %series.key,
            scorer = self.scorer.name(),
            anomalies = anomalies.len(),
            "temporal pass complete"
        );

        Ok(TemporalFindings {
            anomalies,
            location: RobustLocation::of(&values),
        })
    }

    /// Sudden period-over-period growth between consecutive observed points.
    ///
    /// A step counts when the previous value is positive, the new value is
    /// above `min_growth_magnitude` and the change ratio exceeds
    /// `growth_threshold`.
    pub fn sudden_growth(&self, observed: &[(u32, f64)]) -> Vec<Anomaly> {
        let g = self.config.growth_threshold;
        observed
            .windows(2)
            .filter_map(|pair| {
                let (_, prev) = pair[0];
                let (period, value) = pair[1];
                if prev <= 0.0 || value <= self.config.min_growth_magnitude {
                    return None;
                }
                let change = (value - prev) / prev;
                (change > g).then(|| Anomaly {
                    period,
                    observed: value,
                    expected: prev,
                    score: change,
                    kind: AnomalyKind::SuddenGrowth,
                    severity: Severity::classify(change, g),
                })
            })
            .collect()
    }

    /// Cross-entity pass over the whole batch.
    ///
    /// Returns an empty list when the batch is smaller than `min_population`.
    pub fn cross_entity(&self, profiles: &[EntityProfile]) -> Vec<(EntityKey, Anomaly)> {
        population::detect(profiles, &self.config, self.epsilon)
    }
}
