//! `surplus-narrative`
//!
//! Seam for natural-language summaries of analysis reports. The text itself
//! comes from an external generator behind [`NarrativeGenerator`]; this crate
//! only decides whether to call it and collects what it returns.
//!
//! The analytics engine never depends on this crate.

pub mod dispatcher;
pub mod gate;
pub mod generator;

pub use dispatcher::{Narrative, NarrativeDispatcher, NarrativeRun};
pub use gate::NarrativeGate;
pub use generator::{NarrativeError, NarrativeGenerator, TemplateGenerator};
