//! Per-entity monthly value series.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::id::EntityKey;

/// One period of an entity's series. `value: None` marks a gap.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// 1-based period index.
    pub period: u32,
    pub value: Option<f64>,
}

impl Observation {
    pub fn new(period: u32, value: f64) -> Self {
        Self {
            period,
            value: Some(value),
        }
    }

    pub fn missing(period: u32) -> Self {
        Self {
            period,
            value: None,
        }
    }
}

/// Ordered value series for one organizational-unit/material pair.
///
/// Produced by the ingestion layer; checked with [`EntitySeries::validate`]
/// before analysis so a malformed entity can be reported on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySeries {
    pub key: EntityKey,
    pub observations: Vec<Observation>,
    /// Stock quantity held for the entity.
    #[serde(default)]
    pub quantity: f64,
}

impl EntitySeries {
    pub fn new(key: EntityKey, observations: Vec<Observation>, quantity: f64) -> Self {
        Self {
            key,
            observations,
            quantity,
        }
    }

    /// Build a gap-free series over periods `1..=values.len()`.
    pub fn from_values(key: EntityKey, values: &[f64], quantity: f64) -> Self {
        let observations = values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation::new(i as u32 + 1, *v))
            .collect();
        Self::new(key, observations, quantity)
    }

    /// Check structural invariants: periods >= 1 and strictly increasing,
    /// finite values and quantity.
    pub fn validate(&self) -> AnalysisResult<()> {
        if !self.quantity.is_finite() {
            return Err(AnalysisError::data_quality(format!(
                "{}: quantity is not a finite number",
                self.key
            )));
        }

        let mut previous: Option<u32> = None;
        for obs in &self.observations {
            if obs.period == 0 {
                return Err(AnalysisError::data_quality(format!(
                    "{}: period indices start at 1",
                    self.key
                )));
            }
            if let Some(prev) = previous {
                if obs.period <= prev {
                    return Err(AnalysisError::data_quality(format!(
                        "{}: period {} follows period {} (periods must be strictly increasing)",
                        self.key, obs.period, prev
                    )));
                }
            }
            if let Some(v) = obs.value {
                if !v.is_finite() {
                    return Err(AnalysisError::data_quality(format!(
                        "{}: non-numeric value at period {}",
                        self.key, obs.period
                    )));
                }
            }
            previous = Some(obs.period);
        }
        Ok(())
    }

    /// Non-missing `(period, value)` pairs, in period order.
    pub fn observed(&self) -> Vec<(u32, f64)> {
        self.observations
            .iter()
            .filter_map(|o| o.value.map(|v| (o.period, v)))
            .collect()
    }

    pub fn observed_len(&self) -> usize {
        self.observations.iter().filter(|o| o.value.is_some()).count()
    }

    pub fn missing_len(&self) -> usize {
        self.observations.len() - self.observed_len()
    }

    /// Last non-missing point.
    pub fn last_observed(&self) -> Option<(u32, f64)> {
        self.observations
            .iter()
            .rev()
            .find_map(|o| o.value.map(|v| (o.period, v)))
    }
}
