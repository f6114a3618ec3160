//! Per-entity KPI scalars.

use serde::{Deserialize, Serialize};

use surplus_core::{AnalysisError, AnalysisResult, EntitySeries};

/// Headline figures for one entity, computed over observed periods only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    /// Latest observed value (the current surplus value).
    pub total_value: f64,
    /// Sum of all observed values.
    pub cumulative_value: f64,
    pub mean_value: f64,
    pub quantity: f64,
    pub observed_periods: usize,
    pub missing_periods: usize,
    /// First-to-last observed change, in percent (0 when the first value is not positive).
    pub variation_pct: f64,
    pub peak_period: u32,
    pub peak_value: f64,
}

impl Kpis {
    /// Fails with `InsufficientData` when the series has no observed point.
    pub fn compute(series: &EntitySeries) -> AnalysisResult<Self> {
        let observed = series.observed();
        let (Some(&(_, first)), Some(&(_, last))) = (observed.first(), observed.last()) else {
            return Err(AnalysisError::insufficient("KPIs", 1, 0));
        };

        let cumulative_value: f64 = observed.iter().map(|(_, v)| v).sum();
        let mean_value = cumulative_value / observed.len() as f64;

        let (peak_period, peak_value) = observed
            .iter()
            .copied()
            .fold((0u32, f64::NEG_INFINITY), |best, (p, v)| {
                if v > best.1 { (p, v) } else { best }
            });

        let variation_pct = if first > 0.0 {
            (last - first) / first * 100.0
        } else {
            0.0
        };

        Ok(Self {
            total_value: last,
            cumulative_value,
            mean_value,
            quantity: series.quantity,
            observed_periods: observed.len(),
            missing_periods: series.missing_len(),
            variation_pct,
            peak_period,
            peak_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surplus_core::{EntityKey, Observation};

    #[test]
    fn kpis_summarize_observed_points() {
        let series = EntitySeries::new(
            EntityKey::new("Operations", "M-001"),
            vec![
                Observation::new(1, 100.0),
                Observation::missing(2),
                Observation::new(3, 150.0),
                Observation::new(4, 120.0),
            ],
            42.0,
        );

        let k = Kpis::compute(&series).unwrap();
        assert_eq!(k.total_value, 120.0);
        assert_eq!(k.cumulative_value, 370.0);
        assert!((k.mean_value - 370.0 / 3.0).abs() < 1e-12);
        assert_eq!(k.quantity, 42.0);
        assert_eq!(k.observed_periods, 3);
        assert_eq!(k.missing_periods, 1);
        assert!((k.variation_pct - 20.0).abs() < 1e-12);
        assert_eq!((k.peak_period, k.peak_value), (3, 150.0));
    }

    #[test]
    fn variation_is_zero_when_first_value_is_not_positive() {
        let series = EntitySeries::from_values(EntityKey::new("Ops", "M"), &[0.0, 50.0], 0.0);
        assert_eq!(Kpis::compute(&series).unwrap().variation_pct, 0.0);
    }

    #[test]
    fn empty_series_has_no_kpis() {
        let series = EntitySeries::new(
            EntityKey::new("Ops", "M"),
            vec![Observation::missing(1)],
            0.0,
        );
        assert!(matches!(
            Kpis::compute(&series),
            Err(AnalysisError::InsufficientData { required: 1, found: 0, .. })
        ));
    }
}
