//! `surplus-core`: series model and error taxonomy.
//!
//! This crate contains **pure data** primitives shared by the analytics engine
//! and its collaborators (no computation, no I/O).

pub mod error;
pub mod id;
pub mod series;

pub use error::{AnalysisError, AnalysisResult, FailureKind, FailureReason};
pub use id::{EntityKey, RunId};
pub use series::{EntitySeries, Observation};
