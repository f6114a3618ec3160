//! Runs a narrative generator over a finished batch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use surplus_analytics::BatchAnalysis;
use surplus_core::EntityKey;

use crate::gate::NarrativeGate;
use crate::generator::NarrativeGenerator;

/// Generated text for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub entity: EntityKey,
    pub generator: String,
    pub text: String,
}

/// Outcome of one dispatch over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeRun {
    /// False when the gate was closed and nothing was attempted.
    pub attempted: bool,
    pub narratives: BTreeMap<EntityKey, Narrative>,
    /// Entities whose report failed analysis.
    pub skipped: Vec<EntityKey>,
    /// Generator errors, rendered.
    pub errors: BTreeMap<EntityKey, String>,
}

pub struct NarrativeDispatcher {
    gate: NarrativeGate,
    generator: Box<dyn NarrativeGenerator>,
}

impl core::fmt::Debug for NarrativeDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NarrativeDispatcher")
            .field("gate", &self.gate)
            .field("generator", &self.generator.name())
            .finish()
    }
}

impl NarrativeDispatcher {
    pub fn new(gate: NarrativeGate, generator: Box<dyn NarrativeGenerator>) -> Self {
        Self { gate, generator }
    }

    pub fn gate(&self) -> &NarrativeGate {
        &self.gate
    }

    /// Narrate every successfully analyzed entity, in entity-key order.
    ///
    /// A closed gate yields an empty, unattempted run. Generator failures are
    /// recorded per entity and do not stop the run.
    pub fn dispatch(&self, batch: &BatchAnalysis) -> NarrativeRun {
        if !self.gate.is_enabled() {
            debug!(run = %batch.run_id, "narrative generation disabled");
            return NarrativeRun::default();
        }

        let mut run = NarrativeRun {
            attempted: true,
            ..NarrativeRun::default()
        };

        for (key, report) in &batch.reports {
            if !report.is_success() {
                run.skipped.push(key.clone());
                continue;
            }
            match self.generator.narrate(report) {
                Ok(text) => {
                    run.narratives.insert(
                        key.clone(),
                        Narrative {
                            entity: key.clone(),
                            generator: self.generator.name().to_string(),
                            text,
                        },
                    );
                }
                Err(e) => {
                    warn!(entity = %key, generator = self.generator.name(), error = %e, "narrative generation failed");
                    run.errors.insert(key.clone(), e.to_string());
                }
            }
        }

        info!(
            run = %batch.run_id,
            generator = self.generator.name(),
            narrated = run.narratives.len(),
            skipped = run.skipped.len(),
            errors = run.errors.len(),
            "narrative generation finished"
        );
        run
    }

    pub fn to_json(run: &NarrativeRun) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(run)
    }
}
