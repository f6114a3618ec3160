//! Prescriptive recommendations.
//!
//! Every signal (one per anomaly, or the bare trend when there are none) is
//! mapped through the rule table to an action and a base weight. Signals for
//! the same action add up:
//!
//! `weight * severity multiplier * impact`, where impact is the entity's
//! latest value over the batch maximum, clamped to [0, 1].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use surplus_core::EntityKey;

use crate::anomaly::{Anomaly, AnomalyKind, Severity};
use crate::config::RecommendConfig;
use crate::kpi::Kpis;
use crate::trend::{TrendClass, TrendResult};

/// Action suggested for an entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Redistribute,
    Liquidate,
    Investigate,
    ReviewPurchasing,
    Audit,
    Monitor,
}

impl ActionCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionCategory::Redistribute => "redistribute",
            ActionCategory::Liquidate => "liquidate",
            ActionCategory::Investigate => "investigate",
            ActionCategory::ReviewPurchasing => "review_purchasing",
            ActionCategory::Audit => "audit",
            ActionCategory::Monitor => "monitor",
        }
    }
}

impl core::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anomaly that contributed to a recommendation.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRef {
    pub kind: AnomalyKind,
    pub period: u32,
    pub severity: Severity,
    pub score: f64,
}

impl From<&Anomaly> for AnomalyRef {
    fn from(a: &Anomaly) -> Self {
        Self {
            kind: a.kind,
            period: a.period,
            severity: a.severity,
            score: a.score,
        }
    }
}

/// Why an action was recommended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub trend: TrendClass,
    pub relative_slope: f64,
    pub triggers: Vec<AnomalyRef>,
    pub impact: f64,
    pub material: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub entity: EntityKey,
    pub category: ActionCategory,
    /// Higher is more urgent.
    pub priority: f64,
    pub rationale: Rationale,
}

/// Batch-wide values the recommender normalizes against.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchContext {
    pub max_total_value: f64,
}

impl BatchContext {
    pub fn new(max_total_value: f64) -> Self {
        Self { max_total_value }
    }

    /// Entity value relative to the batch maximum, clamped to [0, 1].
    pub fn impact(&self, total_value: f64) -> f64 {
        if self.max_total_value > 0.0 {
            (total_value / self.max_total_value).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct Rule {
    category: ActionCategory,
    weight: f64,
}

const fn rule(category: ActionCategory, weight: f64) -> Rule {
    Rule { category, weight }
}

/// The rule table.
fn rule_for(trend: TrendClass, signal: Option<(AnomalyKind, Severity)>) -> Rule {
    use ActionCategory::*;
    use AnomalyKind::*;
    use Severity::*;
    use TrendClass::*;

    match (trend, signal) {
        (Growth, None) => rule(ReviewPurchasing, 0.5),
        (Stable, None) => rule(Monitor, 0.2),
        (Decline, None) => rule(Monitor, 0.1),

        (Growth, Some((PointOutlier, _))) => rule(Investigate, 0.8),
        (Stable, Some((PointOutlier, _))) => rule(Investigate, 0.6),
        (Decline, Some((PointOutlier, _))) => rule(Investigate, 0.4),

        (Growth, Some((SuddenGrowth, High))) => rule(ReviewPurchasing, 1.0),
        (Growth, Some((SuddenGrowth, Medium | Low))) => rule(ReviewPurchasing, 0.7),
        (Stable, Some((SuddenGrowth, High))) => rule(Investigate, 0.9),
        (Decline, Some((SuddenGrowth, High))) => rule(Investigate, 0.7),
        (Stable | Decline, Some((SuddenGrowth, Medium | Low))) => rule(Monitor, 0.5),

        (Growth, Some((CrossEntityOutlier, High))) => rule(Redistribute, 1.0),
        (Growth, Some((CrossEntityOutlier, Medium | Low))) => rule(Redistribute, 0.7),
        (Stable, Some((CrossEntityOutlier, High))) => rule(Redistribute, 0.8),
        (Decline, Some((CrossEntityOutlier, High))) => rule(Liquidate, 0.8),
        (Stable | Decline, Some((CrossEntityOutlier, Medium | Low))) => rule(Liquidate, 0.6),
    }
}

/// Audit weight for entities above the materiality threshold.
const AUDIT_WEIGHT: f64 = 0.4;

#[derive(Debug, Default)]
struct Accumulator {
    score: f64,
    triggers: Vec<AnomalyRef>,
}

/// Maps trend and anomaly signals to ranked actions.
#[derive(Debug, Clone)]
pub struct PrescriptiveRecommender {
    config: RecommendConfig,
}

impl PrescriptiveRecommender {
    pub fn new(config: RecommendConfig) -> Self {
        Self { config }
    }

    /// Recommendations for one entity, most urgent first, at most
    /// `max_recommendations`.
    pub fn recommend(
        &self,
        entity: &EntityKey,
        trend: &TrendResult,
        anomalies: &[Anomaly],
        kpis: &Kpis,
        ctx: &BatchContext,
    ) -> Vec<Recommendation> {
        let impact = ctx.impact(kpis.total_value);
        let material = kpis.total_value > self.config.materiality_threshold;

        let mut by_category: BTreeMap<ActionCategory, Accumulator> = BTreeMap::new();

        if anomalies.is_empty() {
            let r = rule_for(trend.class, None);
            by_category.entry(r.category).or_default().score +=
                r.weight * Severity::Low.multiplier() * impact;
        }
        for a in anomalies {
            let r = rule_for(trend.class, Some((a.kind, a.severity)));
            let acc = by_category.entry(r.category).or_default();
            acc.score += r.weight * a.severity.multiplier() * impact;
            acc.triggers.push(AnomalyRef::from(a));
        }

        if material {
            let worst = anomalies
                .iter()
                .map(|a| a.severity)
                .max()
                .unwrap_or(Severity::Low);
            let acc = by_category.entry(ActionCategory::Audit).or_default();
            acc.score += AUDIT_WEIGHT * worst.multiplier() * impact;
            acc.triggers
                .extend(anomalies.iter().filter(|a| a.severity == worst).map(AnomalyRef::from));
        }

        let boost = if material && !anomalies.is_empty() {
            self.config.materiality_boost
        } else {
            1.0
        };

        let mut out: Vec<Recommendation> = by_category
            .into_iter()
            .map(|(category, acc)| {
                let priority = (acc.score * boost).min(self.config.max_priority);
                let explanation = explain(entity, category, trend, &acc.triggers, impact, material);
                Recommendation {
                    entity: entity.clone(),
                    category,
                    priority,
                    rationale: Rationale {
                        trend: trend.class,
                        relative_slope: trend.relative_slope,
                        triggers: acc.triggers,
                        impact,
                        material,
                        explanation,
                    },
                }
            })
            .collect();

        sort_recommendations(&mut out);
        out.truncate(self.config.max_recommendations);
        out
    }
}

fn explain(
    entity: &EntityKey,
    category: ActionCategory,
    trend: &TrendResult,
    triggers: &[AnomalyRef],
    impact: f64,
    material: bool,
) -> String {
    let mut text = format!(
        "{category} {entity}: {:?} trend (relative slope {:.3}), impact {impact:.2}",
        trend.class, trend.relative_slope
    );
    if triggers.is_empty() {
        text.push_str(", no anomalies");
    } else {
        let listed: Vec<String> = triggers
            .iter()
            .map(|t| format!("{:?}/{:?} at period {} (score {:.2})", t.kind, t.severity, t.period, t.score))
            .collect();
        text.push_str(&format!(", triggered by {}", listed.join("; ")));
    }
    if material {
        text.push_str(", above materiality threshold");
    }
    text
}

/// Priority descending, then entity key, then category.
pub fn sort_recommendations(recs: &mut [Recommendation]) {
    recs.sort_by(|a, b| {
        b.priority
            .total_cmp(&a.priority)
            .then_with(|| a.entity.cmp(&b.entity))
            .then_with(|| a.category.cmp(&b.category))
    });
}

/// Combined batch-level ranking.
pub fn rank<I>(recs: I) -> Vec<Recommendation>
where
    I: IntoIterator<Item = Recommendation>,
{
    let mut out: Vec<Recommendation> = recs.into_iter().collect();
    sort_recommendations(&mut out);
    out
}
