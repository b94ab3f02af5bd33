//! The six standard stage executors.
//!
//! Each stage is a thin adapter over the generative-model seam: it fetches
//! the document text, builds a stage prompt from the accumulated context,
//! invokes the model, and defensively parses the JSON payload. What the
//! model is asked to judge is deliberately shallow here; the orchestration
//! contract (inputs, outputs, error taxonomy) is the point.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::ai::{strip_code_fences, ModelClient, ModelOptions};
use crate::pipeline::{StageError, StageExecutor, StageInvocation, StageName, StandardStages};
use crate::storage::DocumentStore;

fn instruction(name: StageName) -> &'static str {
    match name {
        StageName::StructureCheck => {
            "Validate the document's structural organization: sections, ordering, required parts."
        }
        StageName::ContentCheck => {
            "Assess the substance of the document against its stated purpose."
        }
        StageName::GrammarCheck => {
            "Check grammar, spelling, and mechanics without judging content."
        }
        StageName::Orchestration => {
            "Reconcile the earlier findings into a single consolidated assessment."
        }
        StageName::Clarification => {
            "Identify passages whose meaning is ambiguous and needs clarification."
        }
        StageName::Scoring => {
            "Produce the final scores using every earlier stage result."
        }
    }
}

fn build_stage_prompt(name: StageName, instruction: &str, document: &str, input: &StageInvocation) -> String {
    // The invocation payload serializes earlier stage payloads under their
    // slot names, so the model sees exactly what downstream code sees.
    let context_json = serde_json::to_string_pretty(&input)
        .unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are the "{name}" stage of a document-evaluation pipeline.
{instruction}
Respond ONLY with a single JSON object. Do not include any other text.

Document:
{document}

Accumulated pipeline context:
{context_json}
"#,
        name = name,
        instruction = instruction,
        document = document,
        context_json = context_json,
    )
}

/// A stage executor backed by the generative model.
pub struct ModelStage {
    name: StageName,
    model: Arc<dyn ModelClient>,
    store: Arc<dyn DocumentStore>,
    options: ModelOptions,
}

impl ModelStage {
    pub fn new(
        name: StageName,
        model: Arc<dyn ModelClient>,
        store: Arc<dyn DocumentStore>,
        options: ModelOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            model,
            store,
            options,
        })
    }
}

#[async_trait]
impl StageExecutor for ModelStage {
    fn name(&self) -> StageName {
        self.name
    }

    async fn execute(
        &self,
        input: &StageInvocation,
    ) -> Result<serde_json::Value, StageError> {
        // Document reads go against the external store on every invocation;
        // a flaky store read is worth a retry, not a failed run.
        let document = self
            .store
            .fetch_text(&input.source_bucket, &input.source_key)
            .await
            .map_err(|e| StageError::Transient(format!("document fetch failed: {}", e)))?;

        let prompt = build_stage_prompt(self.name, instruction(self.name), &document, input);
        debug!(stage = %self.name, prompt_len = prompt.len(), "invoking stage model");

        let reply = self
            .model
            .send_message(&prompt, &self.options)
            .await
            .map_err(StageError::from)?;

        let stripped = strip_code_fences(&reply.text);
        let payload: serde_json::Value = serde_json::from_str(stripped).map_err(|e| {
            StageError::Fatal(format!("stage model reply was not valid JSON: {}", e))
        })?;

        Ok(payload)
    }
}

/// Wires the six standard stages against one model and store.
pub fn standard_suite(
    model: Arc<dyn ModelClient>,
    store: Arc<dyn DocumentStore>,
    options: ModelOptions,
) -> StandardStages {
    let stage = |name: StageName| -> Arc<dyn StageExecutor> {
        ModelStage::new(name, Arc::clone(&model), Arc::clone(&store), options.clone())
    };

    StandardStages {
        structure_check: stage(StageName::StructureCheck),
        content_check: stage(StageName::ContentCheck),
        grammar_checks: vec![stage(StageName::GrammarCheck)],
        orchestration: stage(StageName::Orchestration),
        clarification: stage(StageName::Clarification),
        scoring: stage(StageName::Scoring),
    }
}
