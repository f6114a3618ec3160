//! End-to-end batch scenarios.

use surplus_analytics::{
    ActionCategory, AnalysisConfig, AnalysisOrchestrator, AnomalyKind, ScoringStrategy, SeriesBatch,
    Severity, TrendClass, analyze_batch,
};
use surplus_core::{EntityKey, EntitySeries, FailureKind};

fn key(org_unit: &str, material: &str) -> EntityKey {
    EntityKey::new(org_unit, material)
}

fn batch(items: &[(EntityKey, Vec<f64>)]) -> SeriesBatch {
    surplus_observability::init();
    items
        .iter()
        .map(|(k, values)| (k.clone(), EntitySeries::from_values(k.clone(), values, 1.0)))
        .collect()
}

fn peers_and_outlier() -> SeriesBatch {
    let mut items: Vec<(EntityKey, Vec<f64>)> = [96.0, 98.0, 100.0, 102.0, 104.0]
        .iter()
        .enumerate()
        .map(|(i, b)| (key("Warehouse", &format!("P-{i}")), vec![*b, b + 1.0, *b, b + 1.0]))
        .collect();
    items.push((key("Warehouse", "X-9"), vec![5099.0, 5100.0, 5099.0, 5100.0]));
    batch(&items)
}

#[test]
fn steady_decline_is_projected_with_exact_interval() {
    let k = key("Operations", "M-001");
    let result = analyze_batch(AnalysisConfig::default(), &batch(&[(k.clone(), vec![100.0, 95.0, 90.0, 85.0])]))
        .unwrap();

    let report = result.report(&k).unwrap();
    assert!(report.is_success());
    let trend = report.trend.as_ref().unwrap();
    assert_eq!(trend.class, TrendClass::Decline);
    assert!((trend.slope + 5.0).abs() < 1e-9);

    let estimates: Vec<f64> = trend.forecast.iter().map(|p| p.estimate).collect();
    for (got, want) in estimates.iter().zip([80.0, 75.0, 70.0]) {
        assert!((got - want).abs() < 1e-9, "{got} != {want}");
    }
    assert!(trend.forecast.iter().all(|p| p.half_width().abs() < 1e-9));
    assert!(report.anomalies.is_empty());
}

#[test]
fn spike_yields_outlier_and_growth_with_ranked_actions() {
    let k = key("Operations", "M-002");
    let result = analyze_batch(
        AnalysisConfig::default(),
        &batch(&[(k.clone(), vec![100.0, 105.0, 102.0, 1000.0, 98.0])]),
    )
    .unwrap();

    let report = result.report(&k).unwrap();
    let kinds: Vec<(u32, AnomalyKind, Severity)> = report
        .anomalies
        .iter()
        .map(|a| (a.period, a.kind, a.severity))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (4, AnomalyKind::PointOutlier, Severity::High),
            (4, AnomalyKind::SuddenGrowth, Severity::High),
        ]
    );

    // Growth trend: purchasing review 1.0 * 3, investigation 0.8 * 3.
    let recs: Vec<(ActionCategory, f64)> = report
        .recommendations
        .iter()
        .map(|r| (r.category, r.priority))
        .collect();
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].0, ActionCategory::ReviewPurchasing);
    assert!((recs[0].1 - 3.0).abs() < 1e-9);
    assert_eq!(recs[1].0, ActionCategory::Investigate);
    assert!((recs[1].1 - 2.4).abs() < 1e-9);
}

#[test]
fn only_the_distant_entity_is_a_cross_entity_outlier() {
    let result = analyze_batch(AnalysisConfig::default(), &peers_and_outlier()).unwrap();

    assert_eq!(result.global_anomalies.len(), 1);
    let global = &result.global_anomalies[0];
    assert_eq!(global.entity, key("Warehouse", "X-9"));
    assert_eq!(global.anomaly.kind, AnomalyKind::CrossEntityOutlier);
    assert_eq!(global.anomaly.severity, Severity::High);

    let outlier = result.report(&key("Warehouse", "X-9")).unwrap();
    assert!(outlier.anomalies.contains(&global.anomaly));
    assert_eq!(outlier.recommendations[0].category, ActionCategory::Redistribute);

    for (k, report) in &result.reports {
        if k.material() != "X-9" {
            assert!(report.anomalies.is_empty(), "{k} unexpectedly flagged");
            assert_eq!(report.recommendations[0].category, ActionCategory::Monitor);
        }
    }

    let ranked = result.ranked_recommendations();
    assert_eq!(ranked[0].entity, key("Warehouse", "X-9"));
}

#[test]
fn small_declining_entity_gets_a_low_priority_monitor() {
    let small = key("Operations", "M-small");
    let large = key("Operations", "M-large");
    let result = analyze_batch(
        AnalysisConfig::default(),
        &batch(&[
            (small.clone(), vec![100.0, 95.0, 90.0, 85.0]),
            (large.clone(), vec![10_000.0, 10_000.0, 10_000.0, 10_000.0]),
        ]),
    )
    .unwrap();

    let recs = &result.report(&small).unwrap().recommendations;
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].category, ActionCategory::Monitor);
    assert!(recs[0].priority < 0.01);
    assert!((recs[0].rationale.impact - 0.0085).abs() < 1e-12);

    let large_recs = &result.report(&large).unwrap().recommendations;
    assert!(large_recs[0].priority > recs[0].priority);
}

#[test]
fn failing_entity_does_not_affect_the_rest() {
    let short = key("Operations", "M-short");
    let mut items: Vec<(EntityKey, Vec<f64>)> = peers_and_outlier()
        .into_iter()
        .map(|(k, s)| (k, s.observed().into_iter().map(|(_, v)| v).collect()))
        .collect();
    items.push((short.clone(), vec![42.0]));

    let with_short = analyze_batch(AnalysisConfig::default(), &batch(&items)).unwrap();
    let without = analyze_batch(AnalysisConfig::default(), &peers_and_outlier()).unwrap();

    let failure = with_short.report(&short).unwrap().failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::InsufficientData);
    assert_eq!(with_short.summary().failed, 1);
    assert_eq!(with_short.summary().analyzed, 6);

    for (k, report) in &without.reports {
        assert_eq!(with_short.report(k).unwrap().anomalies, report.anomalies);
        assert_eq!(with_short.report(k).unwrap().trend, report.trend);
    }
}

#[test]
fn results_do_not_depend_on_worker_count() {
    let input = peers_and_outlier();
    let serial = AnalysisOrchestrator::new(AnalysisConfig::default().with_workers(1))
        .unwrap()
        .analyze(&input);
    let parallel = AnalysisOrchestrator::new(AnalysisConfig::default().with_workers(4))
        .unwrap()
        .analyze(&input);

    assert_eq!(serial.reports, parallel.reports);
    assert_eq!(serial.global_anomalies, parallel.global_anomalies);
    assert_eq!(serial.org_units, parallel.org_units);
    assert_eq!(serial.ranked_recommendations(), parallel.ranked_recommendations());
}

#[test]
fn batch_serializes_to_json() {
    let result = analyze_batch(AnalysisConfig::default(), &peers_and_outlier()).unwrap();
    let json = result.to_json().unwrap();

    let report = &json["reports"]["Warehouse::X-9"];
    assert_eq!(report["anomalies"][0]["kind"], "cross_entity_outlier");
    assert_eq!(report["anomalies"][0]["severity"], "high");
    assert_eq!(json["global_anomalies"][0]["entity"], "Warehouse::X-9");
    assert_eq!(json["org_units"]["Warehouse"]["materials"], 6);
    assert_eq!(json["org_units"]["Warehouse"]["trend"]["class"], "stable");
    assert!(json["org_units"]["Warehouse"]["growth"].as_array().unwrap().is_empty());
    assert_eq!(json["cancelled"], false);
}

#[test]
fn ensemble_scoring_still_flags_the_spike() {
    let k = key("Operations", "M-002");
    let result = analyze_batch(
        AnalysisConfig::default().with_scoring(ScoringStrategy::Ensemble),
        &batch(&[(k.clone(), vec![100.0, 105.0, 102.0, 1000.0, 98.0])]),
    )
    .unwrap();

    let report = result.report(&k).unwrap();
    assert!(report
        .anomalies
        .iter()
        .any(|a| a.kind == AnomalyKind::PointOutlier && a.period == 4));
}
