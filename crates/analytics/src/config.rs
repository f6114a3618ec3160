//! Batch-level analysis configuration.
//!
//! Every threshold has a documented default and can be overridden through
//! serde (batch metadata from the ingestion layer), builder methods, or the
//! `SURPLUS_*` environment variables.

use serde::{Deserialize, Serialize};

use surplus_core::{AnalysisError, AnalysisResult};

use crate::rollup::DEFAULT_TOP_MATERIALS;

/// Longest forecast horizon accepted (ten years of monthly periods).
pub const MAX_FORECAST_HORIZON: u32 = 120;

/// Trend fitting and projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Number of future periods to project.
    pub horizon: u32,
    /// Multiplier applied to the prediction standard error (1.96 ≈ 95%).
    pub confidence_multiplier: f64,
    /// Relative slope (per series length, over mean value) separating
    /// growth/decline from stable.
    pub classification_threshold: f64,
    /// Floor projected values at zero (stock values cannot go negative).
    pub clamp_forecast_at_zero: bool,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            horizon: 3,
            confidence_multiplier: 1.96,
            classification_threshold: 0.05,
            clamp_forecast_at_zero: false,
        }
    }
}

/// Deviation scoring strategy used by the temporal pass.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    /// Median / MAD robust z-score.
    #[default]
    Robust,
    /// Mean of robust z, classical z and IQR-normalized distance.
    Ensemble,
}

impl core::str::FromStr for ScoringStrategy {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "robust" => Ok(Self::Robust),
            "ensemble" => Ok(Self::Ensemble),
            other => Err(AnalysisError::configuration(format!(
                "unknown scoring strategy {other:?} (expected robust|ensemble)"
            ))),
        }
    }
}

/// Anomaly detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub scoring: ScoringStrategy,
    /// Deviation score above which a point is a point-outlier.
    pub outlier_threshold: f64,
    /// Period-over-period change ratio above which growth is sudden (0.5 = 50%).
    pub growth_threshold: f64,
    /// Values at or below this magnitude never count as sudden growth.
    pub min_growth_magnitude: f64,
    /// Combined feature distance above which an entity is a cross-entity outlier.
    pub population_threshold: f64,
    /// Minimum batch size for the cross-entity pass.
    pub min_population: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringStrategy::Robust,
            outlier_threshold: 2.5,
            growth_threshold: 0.5,
            min_growth_magnitude: 1.0,
            population_threshold: 3.0,
            min_population: 5,
        }
    }
}

/// Recommendation scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Latest value above which an entity is material.
    pub materiality_threshold: f64,
    /// Multiplier applied to material entities with at least one anomaly.
    pub materiality_boost: f64,
    /// Upper bound of a recommendation's priority score.
    pub max_priority: f64,
    /// Recommendations kept per entity.
    pub max_recommendations: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            materiality_threshold: 1_000_000.0,
            materiality_boost: 1.5,
            max_priority: 10.0,
            max_recommendations: 3,
        }
    }
}

/// Org-unit rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    /// Materials listed per org unit, highest cumulative value first.
    pub top_materials: usize,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            top_materials: DEFAULT_TOP_MATERIALS,
        }
    }
}

/// Full configuration of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub trend: TrendConfig,
    pub anomaly: AnomalyConfig,
    pub recommend: RecommendConfig,
    pub rollup: RollupConfig,
    /// Worker threads for the per-entity phase (`None` = available parallelism).
    pub workers: Option<usize>,
    /// Floor for divisors (spreads, means) that may degenerate to zero.
    pub epsilon: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            trend: TrendConfig::default(),
            anomaly: AnomalyConfig::default(),
            recommend: RecommendConfig::default(),
            rollup: RollupConfig::default(),
            workers: None,
            epsilon: 1e-9,
        }
    }
}

impl AnalysisConfig {
    pub fn with_horizon(mut self, horizon: u32) -> Self {
        self.trend.horizon = horizon;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringStrategy) -> Self {
        self.anomaly.scoring = scoring;
        self
    }

    pub fn with_outlier_threshold(mut self, threshold: f64) -> Self {
        self.anomaly.outlier_threshold = threshold;
        self
    }

    pub fn with_growth_threshold(mut self, threshold: f64) -> Self {
        self.anomaly.growth_threshold = threshold;
        self
    }

    pub fn with_population_threshold(mut self, threshold: f64) -> Self {
        self.anomaly.population_threshold = threshold;
        self
    }

    pub fn with_materiality_threshold(mut self, threshold: f64) -> Self {
        self.recommend.materiality_threshold = threshold;
        self
    }

    pub fn with_top_materials(mut self, top_materials: usize) -> Self {
        self.rollup.top_materials = top_materials;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Defaults overlaid with `SURPLUS_*` environment variables.
    pub fn from_env() -> AnalysisResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup` (keyed by env var name).
    pub fn from_lookup<F>(lookup: F) -> AnalysisResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("SURPLUS_FORECAST_HORIZON") {
            let horizon: i64 = parse_var("SURPLUS_FORECAST_HORIZON", &v)?;
            if horizon < 0 {
                return Err(AnalysisError::configuration(format!(
                    "SURPLUS_FORECAST_HORIZON must not be negative (got {horizon})"
                )));
            }
            cfg.trend.horizon = u32::try_from(horizon).map_err(|_| {
                AnalysisError::configuration(format!("SURPLUS_FORECAST_HORIZON out of range: {horizon}"))
            })?;
        }
        if let Some(v) = lookup("SURPLUS_CONFIDENCE_MULTIPLIER") {
            cfg.trend.confidence_multiplier = parse_var("SURPLUS_CONFIDENCE_MULTIPLIER", &v)?;
        }
        if let Some(v) = lookup("SURPLUS_TREND_THRESHOLD") {
            cfg.trend.classification_threshold = parse_var("SURPLUS_TREND_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("SURPLUS_OUTLIER_THRESHOLD") {
            cfg.anomaly.outlier_threshold = parse_var("SURPLUS_OUTLIER_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("SURPLUS_GROWTH_THRESHOLD") {
            cfg.anomaly.growth_threshold = parse_var("SURPLUS_GROWTH_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("SURPLUS_POPULATION_THRESHOLD") {
            cfg.anomaly.population_threshold = parse_var("SURPLUS_POPULATION_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("SURPLUS_MATERIALITY_THRESHOLD") {
            cfg.recommend.materiality_threshold = parse_var("SURPLUS_MATERIALITY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("SURPLUS_SCORING") {
            cfg.anomaly.scoring = v.parse()?;
        }
        if let Some(v) = lookup("SURPLUS_TOP_MATERIALS") {
            cfg.rollup.top_materials = parse_var("SURPLUS_TOP_MATERIALS", &v)?;
        }
        if let Some(v) = lookup("SURPLUS_WORKERS") {
            cfg.workers = Some(parse_var("SURPLUS_WORKERS", &v)?);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make every entity's analysis meaningless.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.trend.horizon == 0 || self.trend.horizon > MAX_FORECAST_HORIZON {
            return Err(AnalysisError::configuration(format!(
                "forecast horizon must be in 1..={MAX_FORECAST_HORIZON} (got {})",
                self.trend.horizon
            )));
        }
        if !(self.trend.confidence_multiplier.is_finite() && self.trend.confidence_multiplier >= 0.0) {
            return Err(AnalysisError::configuration(
                "confidence multiplier must be a finite non-negative number",
            ));
        }
        positive("trend classification threshold", self.trend.classification_threshold)?;
        positive("outlier threshold", self.anomaly.outlier_threshold)?;
        positive("growth threshold", self.anomaly.growth_threshold)?;
        positive("population threshold", self.anomaly.population_threshold)?;
        positive("epsilon", self.epsilon)?;
        if !(self.anomaly.min_growth_magnitude.is_finite() && self.anomaly.min_growth_magnitude >= 0.0) {
            return Err(AnalysisError::configuration(
                "minimum growth magnitude must be a finite non-negative number",
            ));
        }
        if self.anomaly.min_population < 2 {
            return Err(AnalysisError::configuration(
                "cross-entity pass needs a minimum population of at least 2",
            ));
        }
        if !(self.recommend.materiality_threshold.is_finite() && self.recommend.materiality_threshold >= 0.0) {
            return Err(AnalysisError::configuration(
                "materiality threshold must be a finite non-negative number",
            ));
        }
        positive("materiality boost", self.recommend.materiality_boost)?;
        positive("max priority", self.recommend.max_priority)?;
        if self.recommend.max_recommendations == 0 {
            return Err(AnalysisError::configuration(
                "max recommendations per entity must be at least 1",
            ));
        }
        if self.rollup.top_materials == 0 {
            return Err(AnalysisError::configuration(
                "top materials per org unit must be at least 1",
            ));
        }
        if self.workers == Some(0) {
            return Err(AnalysisError::configuration("worker count must be at least 1"));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> AnalysisResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::configuration(format!(
            "{name} must be a finite positive number (got {value})"
        )))
    }
}

fn parse_var<T: core::str::FromStr>(name: &str, raw: &str) -> AnalysisResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| AnalysisError::configuration(format!("{name}: cannot parse {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AnalysisConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.trend.horizon, 3);
        assert_eq!(cfg.anomaly.outlier_threshold, 2.5);
        assert_eq!(cfg.anomaly.growth_threshold, 0.5);
        assert_eq!(cfg.anomaly.population_threshold, 3.0);
        assert_eq!(cfg.recommend.max_recommendations, 3);
    }

    #[test]
    fn zero_horizon_is_a_configuration_error() {
        let cfg = AnalysisConfig::default().with_horizon(0);
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));
    }

    #[test]
    fn non_positive_thresholds_are_rejected() {
        let cfg = AnalysisConfig::default().with_outlier_threshold(-1.0);
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));

        let cfg = AnalysisConfig::default().with_growth_threshold(f64::NAN);
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));

        let cfg = AnalysisConfig::default().with_workers(0);
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));

        let cfg = AnalysisConfig::default().with_top_materials(0);
        assert!(matches!(cfg.validate(), Err(AnalysisError::Configuration(_))));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let cfg = AnalysisConfig::from_lookup(lookup_from(&[
            ("SURPLUS_FORECAST_HORIZON", "6"),
            ("SURPLUS_OUTLIER_THRESHOLD", "3.5"),
            ("SURPLUS_SCORING", "Ensemble"),
            ("SURPLUS_WORKERS", "2"),
            ("SURPLUS_TOP_MATERIALS", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.rollup.top_materials, 5);

        assert_eq!(cfg.trend.horizon, 6);
        assert_eq!(cfg.anomaly.outlier_threshold, 3.5);
        assert_eq!(cfg.anomaly.scoring, ScoringStrategy::Ensemble);
        assert_eq!(cfg.workers, Some(2));
    }

    #[test]
    fn negative_horizon_from_lookup_is_rejected() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[("SURPLUS_FORECAST_HORIZON", "-3")]))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[("SURPLUS_GROWTH_THRESHOLD", "fifty")]))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));

        let err = AnalysisConfig::from_lookup(lookup_from(&[("SURPLUS_SCORING", "forest")]))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: AnalysisConfig =
            serde_json::from_str(r#"{ "trend": { "horizon": 12 }, "anomaly": { "scoring": "ensemble" } }"#)
                .unwrap();
        assert_eq!(cfg.trend.horizon, 12);
        assert_eq!(cfg.trend.confidence_multiplier, 1.96);
        assert_eq!(cfg.anomaly.scoring, ScoringStrategy::Ensemble);
        assert_eq!(cfg.anomaly.outlier_threshold, 2.5);
    }
}
