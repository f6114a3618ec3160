//! Linear trend fitting and projection.
//!
//! Model:
//! - Ordinary least squares of value against period index over observed points
//!   (gaps are skipped, never imputed).
//! - Residual standard error with `n - 2` degrees of freedom (0 for an exact
//!   two-point fit).
//! - Projection with the standard OLS prediction interval.
//! - Classification by slope relative to the mean level of the series.

use serde::{Deserialize, Serialize};

use surplus_core::{AnalysisError, AnalysisResult, EntitySeries};

use crate::config::TrendConfig;
use crate::stats;

/// Direction of an entity's value series.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    Growth,
    Decline,
    Stable,
}

/// One projected period.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: u32,
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ForecastPoint {
    pub fn half_width(&self) -> f64 {
        (self.upper - self.lower) / 2.0
    }
}

/// Fitted trend for one entity. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub slope: f64,
    pub intercept: f64,
    pub residual_variance: f64,
    pub residual_std_error: f64,
    /// Observed points used in the fit.
    pub observations: usize,
    pub mean_period: f64,
    /// `slope * n / max(|mean value|, ε)`.
    pub relative_slope: f64,
    /// |Pearson r| clamped to [0.3, 0.95]; 0.5 when r is undefined.
    pub confidence: f64,
    pub class: TrendClass,
    pub forecast: Vec<ForecastPoint>,
}

/// Fits and projects trends under one configuration.
#[derive(Debug, Clone)]
pub struct TrendForecaster {
    config: TrendConfig,
    epsilon: f64,
}

impl TrendForecaster {
    pub fn new(config: TrendConfig, epsilon: f64) -> Self {
        Self { config, epsilon }
    }

    pub fn forecast(&self, series: &EntitySeries) -> AnalysisResult<TrendResult> {
        self.forecast_observed(&series.key.to_string(), &series.observed())
    }

    /// Fit over `(period, value)` pairs in strictly increasing period order.
    ///
    /// `label` names the series in error messages.
    pub fn forecast_observed(&self, label: &str, observed: &[(u32, f64)]) -> AnalysisResult<TrendResult> {
        let n = observed.len();
        if n < 2 {
            return Err(AnalysisError::insufficient("trend fit", 2, n));
        }

        let periods: Vec<f64> = observed.iter().map(|(p, _)| f64::from(*p)).collect();
        let values: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();
        let nf = n as f64;

        let mean_period = stats::mean(&periods);
        let mean_value = stats::mean(&values);
        let sxx: f64 = periods.iter().map(|p| (p - mean_period).powi(2)).sum();

        let constant = values.iter().all(|v| *v == values[0]);
        let (slope, intercept, sse) = if constant {
            (0.0, values[0], 0.0)
        } else {
            let sxy: f64 = periods
                .iter()
                .zip(&values)
                .map(|(p, v)| (p - mean_period) * (v - mean_value))
                .sum();
            let slope = sxy / sxx;
            let intercept = mean_value - slope * mean_period;
            let sse: f64 = periods
                .iter()
                .zip(&values)
                .map(|(p, v)| (v - (slope * p + intercept)).powi(2))
                .sum();
            (slope, intercept, sse)
        };

        if !(slope.is_finite() && intercept.is_finite() && sse.is_finite()) {
            return Err(AnalysisError::numeric(format!(
                "{label}: trend fit produced non-finite coefficients"
            )));
        }

        let residual_variance = if n > 2 { sse / (nf - 2.0) } else { 0.0 };
        let residual_std_error = residual_variance.sqrt();

        let relative_slope = slope * nf / mean_value.abs().max(self.epsilon);
        let class = self.classify(relative_slope);

        let confidence = if constant {
            0.5
        } else {
            stats::pearson(&periods, &values)
                .map(|r| r.abs().clamp(0.3, 0.95))
                .unwrap_or(0.5)
        };

        // n >= 2 observed points, so a last period exists.
        let last_period = observed[n - 1].0;
        let forecast = (1..=self.config.horizon)
            .map(|step| -> AnalysisResult<ForecastPoint> {
                let period = last_period.checked_add(step).ok_or_else(|| {
                    AnalysisError::data_quality(format!(
                        "{label}: forecast period {last_period} + {step} exceeds the period range"
                    ))
                })?;
                let p = f64::from(period);
                let estimate = slope * p + intercept;
                let leverage = 1.0 + 1.0 / nf + (p - mean_period).powi(2) / sxx;
                let half = self.config.confidence_multiplier * residual_std_error * leverage.sqrt();
                let point = ForecastPoint {
                    period,
                    estimate,
                    lower: estimate - half,
                    upper: estimate + half,
                };
                Ok(if self.config.clamp_forecast_at_zero {
                    ForecastPoint {
                        estimate: point.estimate.max(0.0),
                        lower: point.lower.max(0.0),
                        upper: point.upper.max(0.0),
                        ..point
                    }
                } else {
                    point
                })
            })
            .collect::<AnalysisResult<Vec<_>>>()?;

        Ok(TrendResult {
            slope,
            intercept,
            residual_variance,
            residual_std_error,
            observations: n,
            mean_period,
            relative_slope,
            confidence,
            class,
            forecast,
        })
    }

    fn classify(&self, relative_slope: f64) -> TrendClass {
        let t = self.config.classification_threshold;
        if relative_slope > t {
            TrendClass::Growth
        } else if relative_slope < -t {
            TrendClass::Decline
        } else {
            TrendClass::Stable
        }
    }
}
