//! Batch orchestration.
//!
//! Per entity, in this order: validate, KPIs, trend, temporal anomalies,
//! recommendations. Entities are independent and run on a scoped worker pool.
//! Once every worker has finished, the cross-entity pass runs over the
//! successful entities and its findings are merged back into their reports.
//!
//! Failures are isolated: an entity that cannot be analyzed gets a failure
//! reason in its own report and never affects the others.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use chrono::Utc;
use tracing::{debug, info, warn};

use surplus_core::{AnalysisError, AnalysisResult, EntityKey, EntitySeries, RunId};

use crate::anomaly::{AnomalyDetector, DeviationScorer, EntityProfile, sort_anomalies};
use crate::cancel::CancellationToken;
use crate::config::AnalysisConfig;
use crate::kpi::Kpis;
use crate::recommend::{BatchContext, PrescriptiveRecommender};
use crate::report::{AnalysisReport, BatchAnalysis, GlobalAnomaly};
use crate::rollup::{self, RollupContext};
use crate::trend::TrendForecaster;

/// Input mapping from entity key to its series.
pub type SeriesBatch = BTreeMap<EntityKey, EntitySeries>;

/// Per-entity result handed from workers to the collector.
#[derive(Debug)]
struct EntityOutcome {
    report: AnalysisReport,
    /// Present only for fully analyzed entities.
    profile: Option<EntityProfile>,
}

/// Drives the analytics components over a batch.
#[derive(Debug)]
pub struct AnalysisOrchestrator {
    config: AnalysisConfig,
    forecaster: TrendForecaster,
    detector: AnomalyDetector,
    recommender: PrescriptiveRecommender,
}

impl AnalysisOrchestrator {
    /// Fails with `Configuration` before any entity is touched.
    pub fn new(config: AnalysisConfig) -> AnalysisResult<Self> {
        config.validate()?;
        Ok(Self {
            forecaster: TrendForecaster::new(config.trend.clone(), config.epsilon),
            detector: AnomalyDetector::new(config.anomaly.clone(), config.epsilon),
            recommender: PrescriptiveRecommender::new(config.recommend.clone()),
            config,
        })
    }

    /// Replace the temporal scorer selected by the configuration.
    pub fn with_scorer(mut self, scorer: Box<dyn DeviationScorer>) -> Self {
        self.detector = self.detector.with_scorer(scorer);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analyze(&self, batch: &SeriesBatch) -> BatchAnalysis {
        self.analyze_with_cancel(batch, &CancellationToken::new())
    }

    /// Like [`analyze`](Self::analyze), stopping between entities once `cancel` fires.
    pub fn analyze_with_cancel(&self, batch: &SeriesBatch, cancel: &CancellationToken) -> BatchAnalysis {
        let run_id = RunId::new();
        info!(run = %run_id, entities = batch.len(), "batch analysis started");

        let entries: Vec<(&EntityKey, &EntitySeries)> = batch.iter().collect();
        let ctx = batch_context(&entries);

        let mut outcomes = self.run_workers(&entries, &ctx, cancel);
        let cancelled = outcomes.len() < entries.len();

        for (key, _) in &entries {
            if !outcomes.contains_key(*key) {
                outcomes.insert(
                    (*key).clone(),
                    EntityOutcome {
                        report: AnalysisReport::new((*key).clone()).failed(AnalysisError::Cancelled),
                        profile: None,
                    },
                );
            }
        }

        let global_anomalies = if cancelled {
            warn!(run = %run_id, "batch cancelled; cross-entity pass skipped");
            Vec::new()
        } else {
            self.merge_cross_entity(&mut outcomes, &ctx)
        };

        let org_units = rollup::summarize(
            entries
                .iter()
                .filter(|(k, s)| structurally_valid(k, s))
                .map(|(_, s)| *s),
            RollupContext {
                top_materials: self.config.rollup.top_materials,
                forecaster: &self.forecaster,
                detector: &self.detector,
            },
        );

        let result = BatchAnalysis {
            run_id,
            generated_at: Utc::now(),
            reports: outcomes.into_iter().map(|(k, o)| (k, o.report)).collect(),
            global_anomalies,
            org_units,
            cancelled,
        };

        let summary = result.summary();
        info!(
            run = %run_id,
            analyzed = summary.analyzed,
            failed = summary.failed,
            anomalies = summary.anomalies,
            cancelled,
            "batch analysis finished"
        );
        result
    }

    fn worker_count(&self, entities: usize) -> usize {
        self.config
            .workers
            .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .min(entities)
            .max(1)
    }

    fn run_workers(
        &self,
        entries: &[(&EntityKey, &EntitySeries)],
        ctx: &BatchContext,
        cancel: &CancellationToken,
    ) -> BTreeMap<EntityKey, EntityOutcome> {
        let cursor = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(EntityKey, EntityOutcome)>();

        thread::scope(|scope| {
            let mut spawned = 0usize;
            for worker in 0..self.worker_count(entries.len()) {
                let tx = tx.clone();
                let cursor = &cursor;
                let spawn = thread::Builder::new()
                    .name(format!("surplus-analysis-{worker}"))
                    .spawn_scoped(scope, move || self.drain(entries, cursor, ctx, cancel, &tx));
                match spawn {
                    Ok(_) => spawned += 1,
                    Err(e) => warn!(worker, error = %e, "failed to spawn analysis worker"),
                }
            }
            if spawned == 0 {
                self.drain(entries, &cursor, ctx, cancel, &tx);
            }
        });
        drop(tx);

        rx.into_iter().collect()
    }

    fn drain(
        &self,
        entries: &[(&EntityKey, &EntitySeries)],
        cursor: &AtomicUsize,
        ctx: &BatchContext,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<(EntityKey, EntityOutcome)>,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let i = cursor.fetch_add(1, Ordering::Relaxed);
            let Some((key, series)) = entries.get(i) else {
                return;
            };
            let outcome = self.analyze_entity(key, series, ctx);
            if tx.send(((*key).clone(), outcome)).is_err() {
                return;
            }
        }
    }

    fn analyze_entity(&self, key: &EntityKey, series: &EntitySeries, ctx: &BatchContext) -> EntityOutcome {
        let mut report = AnalysisReport::new(key.clone());
        match self.run_entity(key, series, ctx, &mut report) {
            Ok(profile) => {
                debug!(
                    entity = %key,
                    anomalies = report.anomalies.len(),
                    recommendations = report.recommendations.len(),
                    "entity analyzed"
                );
                EntityOutcome {
                    report,
                    profile: Some(profile),
                }
            }
            Err(e) => {
                warn!(entity = %key, error = %e, "entity analysis failed");
                EntityOutcome {
                    report: report.failed(&e),
                    profile: None,
                }
            }
        }
    }

    fn run_entity(
        &self,
        key: &EntityKey,
        series: &EntitySeries,
        ctx: &BatchContext,
        report: &mut AnalysisReport,
    ) -> AnalysisResult<EntityProfile> {
        if &series.key != key {
            return Err(AnalysisError::data_quality(format!(
                "series keyed as {key} carries key {}",
                series.key
            )));
        }
        series.validate()?;

        let kpis = report.kpis.insert(Kpis::compute(series)?);
        let trend = report.trend.insert(self.forecaster.forecast(series)?);
        let findings = self.detector.temporal(series)?;
        report.anomalies = findings.anomalies;
        report.recommendations = self
            .recommender
            .recommend(key, trend, &report.anomalies, kpis, ctx);

        let last = series
            .last_observed()
            .ok_or_else(|| AnalysisError::insufficient("entity profile", 1, 0))?;
        Ok(EntityProfile::new(
            key.clone(),
            last,
            trend.slope,
            findings.location,
            self.config.epsilon,
        ))
    }

    fn merge_cross_entity(
        &self,
        outcomes: &mut BTreeMap<EntityKey, EntityOutcome>,
        ctx: &BatchContext,
    ) -> Vec<GlobalAnomaly> {
        let profiles: Vec<EntityProfile> = outcomes.values().filter_map(|o| o.profile.clone()).collect();
        if profiles.len() < self.detector.config().min_population {
            warn!(
                population = profiles.len(),
                required = self.detector.config().min_population,
                "cross-entity pass skipped: too few analyzed entities"
            );
            return Vec::new();
        }

        let found = self.detector.cross_entity(&profiles);
        let mut global = Vec::with_capacity(found.len());

        for (key, anomaly) in found {
            let Some(outcome) = outcomes.get_mut(&key) else {
                continue;
            };
            let report = &mut outcome.report;
            report.anomalies.push(anomaly.clone());
            sort_anomalies(&mut report.anomalies);

            if let (Some(trend), Some(kpis)) = (&report.trend, &report.kpis) {
                report.recommendations =
                    self.recommender
                        .recommend(&key, trend, &report.anomalies, kpis, ctx);
            }
            debug!(entity = %key, score = anomaly.score, "cross-entity outlier merged");
            global.push(GlobalAnomaly { entity: key, anomaly });
        }
        global
    }
}

fn structurally_valid(key: &EntityKey, series: &EntitySeries) -> bool {
    &series.key == key && series.validate().is_ok()
}

/// Batch maximum of the latest observed value over structurally valid series.
fn batch_context(entries: &[(&EntityKey, &EntitySeries)]) -> BatchContext {
    let max_total_value = entries
        .iter()
        .filter(|(k, s)| structurally_valid(k, s))
        .filter_map(|(_, s)| s.last_observed().map(|(_, v)| v))
        .fold(0.0_f64, f64::max);
    BatchContext::new(max_total_value)
}

/// Validate `config`, then analyze `batch`.
pub fn analyze_batch(config: AnalysisConfig, batch: &SeriesBatch) -> AnalysisResult<BatchAnalysis> {
    Ok(AnalysisOrchestrator::new(config)?.analyze(batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use surplus_core::{FailureKind, Observation};

    use crate::anomaly::{Deviations, RobustScorer};

    /// Robust scoring that fires `token` after `limit` scored series.
    struct CancelAfter {
        limit: usize,
        calls: AtomicUsize,
        token: CancellationToken,
    }

    impl DeviationScorer for CancelAfter {
        fn name(&self) -> &'static str {
            "cancel-after"
        }

        fn score(&self, values: &[f64], epsilon: f64) -> Deviations {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
                self.token.cancel();
            }
            RobustScorer.score(values, epsilon)
        }
    }

    fn batch(items: &[(&str, &[f64])]) -> SeriesBatch {
        items
            .iter()
            .map(|(material, values)| {
                let key = EntityKey::new("Operations", *material);
                (key.clone(), EntitySeries::from_values(key, values, 1.0))
            })
            .collect()
    }

    #[test]
    fn invalid_configuration_is_batch_fatal() {
        let err = analyze_batch(AnalysisConfig::default().with_horizon(0), &SeriesBatch::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }

    #[test]
    fn empty_batch_produces_empty_analysis() {
        let result = analyze_batch(AnalysisConfig::default(), &SeriesBatch::new()).unwrap();
        assert!(result.reports.is_empty());
        assert!(result.global_anomalies.is_empty());
        assert!(!result.cancelled);
    }

    #[test]
    fn mismatched_key_is_a_data_quality_failure() {
        let mut b = batch(&[("M-1", &[1.0, 2.0, 3.0])]);
        let wrong = EntityKey::new("Operations", "M-2");
        b.insert(
            wrong.clone(),
            EntitySeries::from_values(EntityKey::new("Quality", "M-2"), &[1.0, 2.0, 3.0], 0.0),
        );

        let result = analyze_batch(AnalysisConfig::default(), &b).unwrap();
        let failure = result.reports[&wrong].failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::DataQuality);
        assert!(result.reports[&EntityKey::new("Operations", "M-1")].is_success());
    }

    #[test]
    fn two_point_series_keeps_trend_but_fails_temporal_pass() {
        let b = batch(&[("M-1", &[10.0, 20.0])]);
        let result = analyze_batch(AnalysisConfig::default(), &b).unwrap();
        let report = &result.reports[&EntityKey::new("Operations", "M-1")];

        assert_eq!(
            report.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::InsufficientData)
        );
        assert!(report.kpis.is_some());
        assert!(report.trend.is_some());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn all_missing_series_fails_at_kpis() {
        let key = EntityKey::new("Operations", "M-1");
        let mut b = SeriesBatch::new();
        b.insert(
            key.clone(),
            EntitySeries::new(key.clone(), vec![Observation::missing(1), Observation::missing(2)], 0.0),
        );
        let result = analyze_batch(AnalysisConfig::default(), &b).unwrap();
        let report = &result.reports[&key];
        assert!(report.kpis.is_none());
        assert_eq!(
            report.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::InsufficientData)
        );
    }

    #[test]
    fn pre_cancelled_batch_marks_every_entity_cancelled() {
        let b = batch(&[("M-1", &[1.0, 2.0, 3.0]), ("M-2", &[3.0, 2.0, 1.0])]);
        let orchestrator = AnalysisOrchestrator::new(AnalysisConfig::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = orchestrator.analyze_with_cancel(&b, &token);
        assert!(result.cancelled);
        assert!(result
            .reports
            .values()
            .all(|r| r.failure.as_ref().map(|f| f.kind) == Some(FailureKind::Cancelled)));
    }

    #[test]
    fn cancelling_mid_batch_keeps_finished_entities() {
        let b = batch(&[
            ("M-1", &[1.0, 2.0, 3.0]),
            ("M-2", &[3.0, 2.0, 1.0]),
            ("M-3", &[5.0, 5.0, 6.0]),
            ("M-4", &[2.0, 4.0, 3.0]),
            ("M-5", &[9.0, 8.0, 9.0]),
            ("M-6", &[1.0, 1.0, 2.0]),
        ]);
        let token = CancellationToken::new();
        let orchestrator = AnalysisOrchestrator::new(AnalysisConfig::default().with_workers(1))
            .unwrap()
            .with_scorer(Box::new(CancelAfter {
                limit: 2,
                calls: AtomicUsize::new(0),
                token: token.clone(),
            }));

        let result = orchestrator.analyze_with_cancel(&b, &token);

        assert!(result.cancelled);
        assert!(result.global_anomalies.is_empty());
        let kinds: Vec<Option<FailureKind>> = result
            .reports
            .values()
            .map(|r| r.failure.as_ref().map(|f| f.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                None,
                None,
                Some(FailureKind::Cancelled),
                Some(FailureKind::Cancelled),
                Some(FailureKind::Cancelled),
                Some(FailureKind::Cancelled),
            ]
        );
        assert!(result.reports[&EntityKey::new("Operations", "M-2")].trend.is_some());
        assert_eq!(result.summary().analyzed, 2);
    }

    #[test]
    fn overflowing_forecast_periods_fail_only_that_entity() {
        let mut b = batch(&[("OK", &[1.0, 2.0, 3.0])]);
        let big = EntityKey::new("Operations", "BIG");
        b.insert(
            big.clone(),
            EntitySeries::new(
                big.clone(),
                vec![
                    Observation::new(u32::MAX - 3, 1.0),
                    Observation::new(u32::MAX - 2, 2.0),
                    Observation::new(u32::MAX - 1, 3.0),
                ],
                0.0,
            ),
        );

        let result = analyze_batch(AnalysisConfig::default(), &b).unwrap();
        assert!(result.reports[&EntityKey::new("Operations", "OK")].is_success());
        let report = &result.reports[&big];
        assert_eq!(
            report.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::DataQuality)
        );
        assert!(report.kpis.is_some());
        assert!(report.trend.is_none());
        assert!(result.org_units["Operations"].trend.is_none());
    }

    #[test]
    fn top_materials_follow_configuration() {
        let b = batch(&[("M-1", &[1.0, 2.0, 3.0]), ("M-2", &[3.0, 2.0, 1.0]), ("M-3", &[5.0, 5.0, 6.0])]);
        let result = analyze_batch(AnalysisConfig::default().with_top_materials(2), &b).unwrap();
        let unit = &result.org_units["Operations"];
        assert_eq!(unit.materials, 3);
        assert_eq!(unit.top_materials.len(), 2);
        assert_eq!(unit.top_materials[0].material, "M-3");
    }

    #[test]
    fn worker_count_is_bounded_by_batch_size() {
        let orchestrator =
            AnalysisOrchestrator::new(AnalysisConfig::default().with_workers(8)).unwrap();
        assert_eq!(orchestrator.worker_count(3), 3);
        assert_eq!(orchestrator.worker_count(0), 1);
        assert_eq!(orchestrator.worker_count(100), 8);
    }

    #[test]
    fn batch_context_ignores_invalid_series() {
        let mut b = batch(&[("M-1", &[10.0, 40.0]), ("M-2", &[5.0, 20.0])]);
        let bad = EntityKey::new("Operations", "M-3");
        b.insert(
            bad.clone(),
            EntitySeries::new(
                bad,
                vec![Observation::new(2, 1_000.0), Observation::new(1, 9_000.0)],
                0.0,
            ),
        );
        let entries: Vec<(&EntityKey, &EntitySeries)> = b.iter().collect();
        assert_eq!(batch_context(&entries).max_total_value, 40.0);
    }
}
