//! The accumulating, append-only record threaded through one pipeline run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::stage::{StageInvocation, StageName, StageOutcome, StageStatus};

/// The event that starts a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub document_id: String,
    pub submission_id: String,
    pub source_bucket: String,
    pub source_key: String,
    pub overlay_id: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Context for one run. Identifiers are fixed at trigger time; stage
/// results may only be appended, never overwritten, so the context visible
/// to stage N is always a superset of the one visible to stage N-1.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    trigger: TriggerEvent,
    results: BTreeMap<StageName, StageOutcome>,
}

impl PipelineContext {
    pub fn new(trigger: TriggerEvent) -> Self {
        Self {
            trigger,
            results: BTreeMap::new(),
        }
    }

    pub fn trigger(&self) -> &TriggerEvent {
        &self.trigger
    }

    /// Records a stage's final outcome in its own slot.
    ///
    /// Rejects a second write to the same slot — that would mean a stage
    /// clobbering another stage's (or its own earlier) result.
    pub fn record(
        &mut self,
        stage: StageName,
        outcome: StageOutcome,
    ) -> Result<(), PipelineError> {
        if self.results.contains_key(&stage) {
            return Err(PipelineError::SlotOccupied(stage));
        }
        self.results.insert(stage, outcome);
        Ok(())
    }

    pub fn outcome(&self, stage: StageName) -> Option<&StageOutcome> {
        self.results.get(&stage)
    }

    /// Stages with a recorded outcome, in pipeline order.
    pub fn recorded_stages(&self) -> Vec<StageName> {
        self.results.keys().copied().collect()
    }

    pub fn recorded_count(&self) -> usize {
        self.results.len()
    }

    /// Builds the invocation payload for the next stage: trigger identifiers
    /// plus the payload of every successfully completed stage under its slot
    /// name. Failed outcomes stay in the context for diagnostics but are not
    /// offered as inputs.
    pub fn invocation(&self) -> StageInvocation {
        let mut completed = serde_json::Map::new();
        for (stage, outcome) in &self.results {
            if outcome.status == StageStatus::Succeeded {
                completed.insert(stage.slot().to_string(), outcome.payload.clone());
            }
        }

        StageInvocation {
            document_id: self.trigger.document_id.clone(),
            submission_id: self.trigger.submission_id.clone(),
            source_bucket: self.trigger.source_bucket.clone(),
            source_key: self.trigger.source_key.clone(),
            overlay_id: self.trigger.overlay_id.clone(),
            completed,
        }
    }
}
