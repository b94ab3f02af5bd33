//! Stage types: names, outcomes, errors, and the executor seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ai::ModelError;

/// The six analysis stages, in pipeline order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    StructureCheck,
    ContentCheck,
    GrammarCheck,
    Orchestration,
    Clarification,
    Scoring,
}

impl StageName {
    pub const ALL: [StageName; 6] = [
        StageName::StructureCheck,
        StageName::ContentCheck,
        StageName::GrammarCheck,
        StageName::Orchestration,
        StageName::Clarification,
        StageName::Scoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::StructureCheck => "structure-check",
            StageName::ContentCheck => "content-check",
            StageName::GrammarCheck => "grammar-check",
            StageName::Orchestration => "orchestration",
            StageName::Clarification => "clarification",
            StageName::Scoring => "scoring",
        }
    }

    /// The field name under which this stage's payload appears in every
    /// later stage's invocation payload.
    pub fn slot(&self) -> &'static str {
        match self {
            StageName::StructureCheck => "structureValidation",
            StageName::ContentCheck => "contentAnalysis",
            StageName::GrammarCheck => "grammarCheck",
            StageName::Orchestration => "orchestration",
            StageName::Clarification => "clarification",
            StageName::Scoring => "scoring",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
}

/// The materialized result of one stage. Retries are invisible here: only
/// the final success/failure of the stage is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub status: StageStatus,
    pub payload: serde_json::Value,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl StageOutcome {
    pub fn succeeded(payload: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            status: StageStatus::Succeeded,
            payload,
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(error: &str, duration_ms: u64) -> Self {
        Self {
            status: StageStatus::Failed,
            payload: serde_json::json!({ "error": error }),
            duration_ms,
            completed_at: Utc::now(),
        }
    }
}

/// Errors from a stage invocation.
///
/// Transient errors (throttling, connection resets, service-level timeouts)
/// are retried by the runner under the shared retry policy; fatal errors
/// route the run straight to the failure terminal.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Transient stage failure: {0}")]
    Transient(String),

    #[error("Fatal stage failure: {0}")]
    Fatal(String),
}

impl StageError {
    /// Returns true if the error is likely transient and the invocation can
    /// be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Transient(_))
    }
}

impl From<ModelError> for StageError {
    fn from(e: ModelError) -> Self {
        if e.is_retryable() {
            StageError::Transient(e.to_string())
        } else {
            StageError::Fatal(e.to_string())
        }
    }
}

/// The payload handed to every stage invocation: the trigger identifiers
/// plus the payload of every previously completed stage, each under its
/// own slot name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInvocation {
    pub document_id: String,
    pub submission_id: String,
    pub source_bucket: String,
    pub source_key: String,
    pub overlay_id: String,
    #[serde(flatten)]
    pub completed: serde_json::Map<String, serde_json::Value>,
}

/// One unit of analysis work. Implementations are analysis-domain logic;
/// the runner only depends on this contract.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn name(&self) -> StageName;

    async fn execute(
        &self,
        input: &StageInvocation,
    ) -> Result<serde_json::Value, StageError>;
}
