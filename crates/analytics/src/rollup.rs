//! Organizational-unit rollups over the input series.
//!
//! Each unit's monthly totals are treated as one more series: fitted with the
//! batch's trend forecaster and scanned for sudden growth.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use surplus_core::{AnalysisError, EntitySeries};

use crate::anomaly::{Anomaly, AnomalyDetector};
use crate::trend::{TrendForecaster, TrendResult};

/// Materials listed per org unit.
pub const DEFAULT_TOP_MATERIALS: usize = 10;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodTotal {
    pub period: u32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialTotal {
    pub material: String,
    pub cumulative_value: f64,
}

/// Aggregated view of all materials of one organizational unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgUnitSummary {
    pub org_unit: String,
    pub materials: usize,
    /// Sum of each material's latest observed value.
    pub total_value: f64,
    pub quantity: f64,
    /// Observed values summed per period, in period order.
    pub monthly: Vec<PeriodTotal>,
    /// First-to-last monthly total change in percent (0 when the first total is not positive).
    pub variation_pct: f64,
    /// Highest cumulative value first, ties by material name.
    pub top_materials: Vec<MaterialTotal>,
    /// Trend of the monthly totals; absent with fewer than two periods.
    pub trend: Option<TrendResult>,
    /// Sudden growth of the monthly totals.
    pub growth: Vec<Anomaly>,
}

/// Rollup settings and the components applied to each unit's totals.
#[derive(Debug, Clone, Copy)]
pub struct RollupContext<'a> {
    pub top_materials: usize,
    pub forecaster: &'a TrendForecaster,
    pub detector: &'a AnomalyDetector,
}

/// Build one summary per org unit.
pub fn summarize<'a, I>(series: I, ctx: RollupContext<'_>) -> BTreeMap<String, OrgUnitSummary>
where
    I: IntoIterator<Item = &'a EntitySeries>,
{
    let mut grouped: BTreeMap<&str, Vec<&EntitySeries>> = BTreeMap::new();
    for s in series {
        grouped.entry(s.key.org_unit()).or_default().push(s);
    }

    grouped
        .into_iter()
        .map(|(org_unit, members)| (org_unit.to_string(), summarize_unit(org_unit, &members, ctx)))
        .collect()
}

fn summarize_unit(org_unit: &str, members: &[&EntitySeries], ctx: RollupContext<'_>) -> OrgUnitSummary {
    let mut monthly: BTreeMap<u32, f64> = BTreeMap::new();
    let mut total_value = 0.0;
    let mut quantity = 0.0;
    let mut materials: Vec<MaterialTotal> = Vec::with_capacity(members.len());

    for s in members {
        let observed = s.observed();
        for (period, value) in &observed {
            *monthly.entry(*period).or_insert(0.0) += value;
        }
        if let Some((_, last)) = observed.last() {
            total_value += last;
        }
        quantity += s.quantity;
        materials.push(MaterialTotal {
            material: s.key.material().to_string(),
            cumulative_value: observed.iter().map(|(_, v)| v).sum(),
        });
    }

    materials.sort_by(|a, b| {
        b.cumulative_value
            .total_cmp(&a.cumulative_value)
            .then_with(|| a.material.cmp(&b.material))
    });
    let material_count = materials.len();
    materials.truncate(ctx.top_materials.max(1));

    let monthly: Vec<PeriodTotal> = monthly
        .into_iter()
        .map(|(period, value)| PeriodTotal { period, value })
        .collect();

    let totals: Vec<(u32, f64)> = monthly.iter().map(|m| (m.period, m.value)).collect();
    let label = format!("{org_unit} (monthly total)");
    let trend = match ctx.forecaster.forecast_observed(&label, &totals) {
        Ok(t) => Some(t),
        Err(AnalysisError::InsufficientData { found, .. }) => {
            debug!(org_unit, periods = found, "org-unit trend skipped: too few periods");
            None
        }
        Err(e) => {
            debug!(org_unit, error = %e, "org-unit trend skipped");
            None
        }
    };
    let growth = ctx.detector.sudden_growth(&totals);

    let variation_pct = match (monthly.first(), monthly.last()) {
        (Some(first), Some(last)) if monthly.len() >= 2 && first.value > 0.0 => {
            (last.value - first.value) / first.value * 100.0
        }
        _ => 0.0,
    };

    OrgUnitSummary {
        org_unit: org_unit.to_string(),
        materials: material_count,
        total_value,
        quantity,
        monthly,
        variation_pct,
        top_materials: materials,
        trend,
        growth,
    }
}
