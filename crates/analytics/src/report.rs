//! Output structures consumed by rendering and narrative layers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use surplus_core::{EntityKey, FailureReason, RunId};

use crate::anomaly::{Anomaly, Severity};
use crate::kpi::Kpis;
use crate::recommend::{self, Recommendation};
use crate::rollup::OrgUnitSummary;
use crate::trend::TrendResult;

/// Analysis outcome for one entity.
///
/// A failed entity keeps whatever was computed before the failing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub entity: EntityKey,
    pub kpis: Option<Kpis>,
    pub trend: Option<TrendResult>,
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<Recommendation>,
    pub failure: Option<FailureReason>,
}

impl AnalysisReport {
    pub fn new(entity: EntityKey) -> Self {
        Self {
            entity,
            kpis: None,
            trend: None,
            anomalies: Vec::new(),
            recommendations: Vec::new(),
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failed(mut self, reason: impl Into<FailureReason>) -> Self {
        self.failure = Some(reason.into());
        self
    }
}

/// A cross-entity anomaly, attributed to its entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAnomaly {
    pub entity: EntityKey,
    pub anomaly: Anomaly,
}

/// Batch-level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub entities: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub anomalies: usize,
    pub high_severity: usize,
    pub recommendations: usize,
}

/// Aggregate output of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAnalysis {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub reports: BTreeMap<EntityKey, AnalysisReport>,
    pub global_anomalies: Vec<GlobalAnomaly>,
    pub org_units: BTreeMap<String, OrgUnitSummary>,
    /// Set when cancellation stopped the batch early.
    pub cancelled: bool,
}

impl BatchAnalysis {
    pub fn report(&self, entity: &EntityKey) -> Option<&AnalysisReport> {
        self.reports.get(entity)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&EntityKey, &FailureReason)> {
        self.reports
            .iter()
            .filter_map(|(k, r)| r.failure.as_ref().map(|f| (k, f)))
    }

    /// Every entity's recommendations in one list, most urgent first
    /// (ties by entity key).
    pub fn ranked_recommendations(&self) -> Vec<Recommendation> {
        recommend::rank(
            self.reports
                .values()
                .flat_map(|r| r.recommendations.iter().cloned()),
        )
    }

    pub fn summary(&self) -> BatchSummary {
        let mut s = BatchSummary {
            entities: self.reports.len(),
            ..BatchSummary::default()
        };
        for r in self.reports.values() {
            if r.is_success() {
                s.analyzed += 1;
            } else {
                s.failed += 1;
            }
            s.anomalies += r.anomalies.len();
            s.high_severity += r
                .anomalies
                .iter()
                .filter(|a| a.severity == Severity::High)
                .count();
            s.recommendations += r.recommendations.len();
        }
        s
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
