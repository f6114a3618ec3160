use thiserror::Error;

use surplus_analytics::AnalysisReport;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NarrativeError {
    #[error("report for {0} has no successful analysis")]
    NotAnalyzed(String),

    #[error("text generation failed: {0}")]
    GenerationFailed(String),
}

/// Produces a human-readable summary of one entity's analysis.
///
/// Implementations may call remote services; they must not mutate the report.
pub trait NarrativeGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn narrate(&self, report: &AnalysisReport) -> Result<String, NarrativeError>;
}

/// Deterministic, offline generator built from the report fields alone.
#[derive(Debug, Copy, Clone, Default)]
pub struct TemplateGenerator;

impl NarrativeGenerator for TemplateGenerator {
    fn name(&self) -> &'static str {
        "template"
    }

    fn narrate(&self, report: &AnalysisReport) -> Result<String, NarrativeError> {
        let (Some(kpis), Some(trend)) = (&report.kpis, &report.trend) else {
            return Err(NarrativeError::NotAnalyzed(report.entity.to_string()));
        };

        let mut text = format!(
            "{} holds {:.2} in surplus value ({:+.1}% since the first observed period) with a {:?} trend",
            report.entity, kpis.total_value, kpis.variation_pct, trend.class
        );
        if let Some(next) = trend.forecast.first() {
            text.push_str(&format!(
                "; period {} is projected at {:.2} (between {:.2} and {:.2})",
                next.period, next.estimate, next.lower, next.upper
            ));
        }
        text.push('.');

        match report.anomalies.len() {
            0 => text.push_str(" No anomalies were detected."),
            n => text.push_str(&format!(" {n} anomalies were detected.")),
        }

        if let Some(top) = report.recommendations.first() {
            text.push_str(&format!(
                " Suggested action: {} (priority {:.2}).",
                top.category, top.priority
            ));
        }
        Ok(text)
    }
}
