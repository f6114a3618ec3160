//! Analysis error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the analytics layer.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Analysis-level error.
///
/// Everything except `Configuration` is scoped to a single entity and gets
/// recorded in that entity's report instead of aborting the batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// The series is too short for the requested statistic.
    #[error("insufficient data for {statistic}: need at least {required} observed points, found {found}")]
    InsufficientData {
        statistic: &'static str,
        required: usize,
        found: usize,
    },

    /// The series is structurally invalid (ordering, non-finite values, key mismatch).
    #[error("data quality: {0}")]
    DataQuality(String),

    /// A computation produced a non-finite or undefined result.
    #[error("numeric instability: {0}")]
    NumericInstability(String),

    /// Invalid thresholds or horizon. Batch-fatal.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The batch was cancelled before this entity was analyzed.
    #[error("analysis cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn insufficient(statistic: &'static str, required: usize, found: usize) -> Self {
        Self::InsufficientData {
            statistic,
            required,
            found,
        }
    }

    pub fn data_quality(msg: impl Into<String>) -> Self {
        Self::DataQuality(msg.into())
    }

    pub fn numeric(msg: impl Into<String>) -> Self {
        Self::NumericInstability(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InsufficientData { .. } => FailureKind::InsufficientData,
            Self::DataQuality(_) => FailureKind::DataQuality,
            Self::NumericInstability(_) => FailureKind::NumericInstability,
            Self::Configuration(_) => FailureKind::Configuration,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// Serializable failure category exposed in reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InsufficientData,
    DataQuality,
    NumericInstability,
    Configuration,
    Cancelled,
}

/// Why analysis failed for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&AnalysisError> for FailureReason {
    fn from(err: &AnalysisError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<AnalysisError> for FailureReason {
    fn from(err: AnalysisError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_carries_kind_and_message() {
        let err = AnalysisError::insufficient("trend fit", 2, 1);
        let reason = FailureReason::from(&err);

        assert_eq!(reason.kind, FailureKind::InsufficientData);
        assert!(reason.message.contains("need at least 2"));
        assert!(reason.message.contains("found 1"));
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::NumericInstability).unwrap();
        assert_eq!(json, "\"numeric_instability\"");
    }
}
