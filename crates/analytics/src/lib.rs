//! `surplus-analytics`
//!
//! **Responsibility:** the analytics engine for surplus-inventory series.
//!
//! - Trend forecasting with prediction intervals.
//! - Anomaly detection: temporal (per series) and cross-entity (per batch).
//! - Prescriptive, ranked recommendations.
//! - Batch orchestration with per-entity failure isolation.
//!
//! Every run is a pure function of its input series and configuration; nothing
//! is cached between runs.

pub mod anomaly;
pub mod cancel;
pub mod config;
pub mod kpi;
pub mod orchestrator;
pub mod recommend;
pub mod report;
pub mod rollup;
pub mod stats;
pub mod trend;

pub use anomaly::{
    Anomaly, AnomalyDetector, AnomalyKind, DeviationScorer, Deviations, EnsembleScorer, EntityProfile,
    RobustScorer, Severity, TemporalFindings,
};
pub use cancel::CancellationToken;
pub use config::{
    AnalysisConfig, AnomalyConfig, RecommendConfig, RollupConfig, ScoringStrategy, TrendConfig,
};
pub use kpi::Kpis;
pub use orchestrator::{AnalysisOrchestrator, SeriesBatch, analyze_batch};
pub use recommend::{
    ActionCategory, AnomalyRef, BatchContext, PrescriptiveRecommender, Rationale, Recommendation,
};
pub use report::{AnalysisReport, BatchAnalysis, BatchSummary, GlobalAnomaly};
pub use rollup::{MaterialTotal, OrgUnitSummary, PeriodTotal, RollupContext};
pub use trend::{ForecastPoint, TrendClass, TrendForecaster, TrendResult};
