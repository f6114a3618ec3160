use serde::{Deserialize, Serialize};
use tracing::debug;

use surplus_core::EntityKey;

use super::{Anomaly, AnomalyKind, Severity};
use crate::config::AnomalyConfig;
use crate::stats::RobustLocation;

/// Per-entity features compared across the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub key: EntityKey,
    pub last_period: u32,
    pub last_value: f64,
    pub slope: f64,
    /// Robust spread over the absolute median level.
    pub volatility: f64,
}

impl EntityProfile {
    pub fn new(
        key: EntityKey,
        last: (u32, f64),
        slope: f64,
        location: RobustLocation,
        epsilon: f64,
    ) -> Self {
        Self {
            key,
            last_period: last.0,
            last_value: last.1,
            slope,
            volatility: location.spread / location.median.abs().max(epsilon),
        }
    }
}

fn feature_location(values: &[f64], epsilon: f64) -> (RobustLocation, f64) {
    let loc = RobustLocation::of(values);
    let floor = epsilon * loc.median.abs().max(1.0);
    (loc, floor)
}

pub(super) fn detect(
    profiles: &[EntityProfile],
    config: &AnomalyConfig,
    epsilon: f64,
) -> Vec<(EntityKey, Anomaly)> {
    if profiles.len() < config.min_population {
        debug!(
            population = profiles.len(),
            required = config.min_population,
            "cross-entity pass skipped: population too small"
        );
        return Vec::new();
    }

    let last: Vec<f64> = profiles.iter().map(|p| p.last_value).collect();
    let slope: Vec<f64> = profiles.iter().map(|p| p.slope).collect();
    let volatility: Vec<f64> = profiles.iter().map(|p| p.volatility).collect();

    let features = [
        feature_location(&last, epsilon),
        feature_location(&slope, epsilon),
        feature_location(&volatility, epsilon),
    ];
    let last_center = features[0].0.median;

    let t = config.population_threshold;
    let mut out: Vec<(EntityKey, Anomaly)> = profiles
        .iter()
        .filter_map(|p| {
            let distance = [p.last_value, p.slope, p.volatility]
                .iter()
                .zip(&features)
                .map(|(x, (loc, floor))| loc.score(*x, *floor).powi(2))
                .sum::<f64>()
                .sqrt();

            (distance > t).then(|| {
                (
                    p.key.clone(),
                    Anomaly {
                        period: p.last_period,
                        observed: p.last_value,
                        expected: last_center,
                        score: distance,
                        kind: AnomalyKind::CrossEntityOutlier,
                        severity: Severity::classify(distance, t),
                    },
                )
            })
        })
        .collect();

    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}
