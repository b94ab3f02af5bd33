use thiserror::Error;

use super::stage::StageName;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage attempted to write a slot that already holds an outcome.
    /// Stages own exactly one named slot; the context only grows.
    #[error("Stage '{0}' already recorded an outcome")]
    SlotOccupied(StageName),

    #[error("Pipeline plan is empty")]
    EmptyPlan,
}
