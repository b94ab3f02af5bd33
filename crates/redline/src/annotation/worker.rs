//! The background annotation worker.
//!
//! Runs fully detached from the request that dispatched it and communicates
//! only through the job row: `generating → completed` on success,
//! `generating → failed` on any error. Model output is untrusted — fence
//! stripping, JSON parsing, and schema validation all stand between a
//! generation and the cache. Parse and schema failures are terminal for the
//! attempt; regeneration happens only through a fresh request.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::ai::{strip_code_fences, ModelClient, ModelOptions};
use crate::db::feedback_repo::{
    FeedbackRow, KIND_RECOMMENDATION, KIND_STRENGTH, KIND_WEAKNESS,
};
use crate::db::{annotation_repo, Database};

use super::document::AnnotatedDocument;
use super::manager::AnnotationOptions;
use super::prompt::build_annotation_prompt;

/// One structured feedback finding.
#[derive(Debug, Clone)]
pub struct FeedbackItem {
    pub priority: Option<String>,
    pub body: String,
}

/// Everything the worker needs, captured at dispatch time so its lifetime
/// is independent of the dispatching request.
#[derive(Debug, Clone)]
pub struct WorkerInput {
    pub document_text: String,
    pub weaknesses: Vec<FeedbackItem>,
    pub recommendations: Vec<FeedbackItem>,
    pub strengths: Vec<String>,
}

impl WorkerInput {
    /// Splits raw feedback rows into the worker's buckets. Unknown kinds
    /// are dropped with a warning rather than failing the dispatch.
    pub fn from_feedback(document_text: String, rows: &[FeedbackRow]) -> Self {
        let mut input = Self {
            document_text,
            weaknesses: vec![],
            recommendations: vec![],
            strengths: vec![],
        };

        for row in rows {
            let item = FeedbackItem {
                priority: row.priority.clone(),
                body: row.body.clone(),
            };
            match row.kind.as_str() {
                KIND_WEAKNESS => input.weaknesses.push(item),
                KIND_RECOMMENDATION => input.recommendations.push(item),
                KIND_STRENGTH => input.strengths.push(row.body.clone()),
                other => {
                    warn!("Ignoring feedback row {} with unknown kind '{}'", row.id, other);
                }
            }
        }

        input
    }
}

pub struct AnnotationWorker {
    db: Database,
    model: Arc<dyn ModelClient>,
    options: AnnotationOptions,
}

impl AnnotationWorker {
    pub fn new(db: Database, model: Arc<dyn ModelClient>, options: AnnotationOptions) -> Self {
        Self { db, model, options }
    }

    /// Runs one generation attempt to a terminal job state. Never returns
    /// an error to the caller — there is nobody to return it to.
    pub async fn execute(&self, job_id: &str, input: WorkerInput) {
        if let Err(reason) = self.generate(job_id, &input).await {
            warn!(job_id, "Annotation generation failed: {}", reason);
            match annotation_repo::mark_failed(&self.db, job_id, &reason, &Utc::now().to_rfc3339())
            {
                Ok(true) => {}
                Ok(false) => warn!(job_id, "Job was no longer generating; leaving it untouched"),
                Err(e) => error!(job_id, "Failed to record job failure: {}", e),
            }
        }
    }

    async fn generate(&self, job_id: &str, input: &WorkerInput) -> Result<(), String> {
        let started = Instant::now();
        let prompt = build_annotation_prompt(input);

        // Deterministic sampling, generous output budget: annotated output
        // reproduces the whole document and must be reproducible.
        let model_options = ModelOptions {
            temperature: 0.0,
            max_tokens: self.options.max_output_tokens,
            timeout: self.options.model_timeout,
        };

        let reply = self
            .model
            .send_message(&prompt, &model_options)
            .await
            .map_err(|e| format!("model call failed: {}", e))?;

        let stripped = strip_code_fences(&reply.text);

        let parsed: serde_json::Value = serde_json::from_str(stripped)
            .map_err(|e| format!("model output is not valid JSON: {}", e))?;

        let document: AnnotatedDocument = serde_json::from_value(parsed)
            .map_err(|e| format!("model output does not match the annotated-document schema: {}", e))?;

        document
            .validate()
            .map_err(|e| format!("model output violates the annotated-document schema: {}", e))?;

        let content = serde_json::to_string(&document)
            .map_err(|e| format!("failed to serialize annotated document: {}", e))?;
        let generation_time_ms = started.elapsed().as_millis() as u64;

        let completed = annotation_repo::complete(
            &self.db,
            job_id,
            &content,
            &reply.model,
            reply.input_tokens,
            reply.output_tokens,
            generation_time_ms,
            &Utc::now().to_rfc3339(),
        )
        .map_err(|e| format!("failed to persist annotated document: {}", e))?;

        if completed {
            info!(
                job_id,
                model = %reply.model,
                generation_time_ms,
                "Annotation job completed"
            );
        } else {
            warn!(job_id, "Job was no longer generating; discarding generated content");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::scripted::{ScriptedModelClient, ScriptedReply};
    use crate::db::annotation_repo::GenerationStatus;

    fn setup() -> (Database, Arc<ScriptedModelClient>, AnnotationWorker) {
        let db = Database::open_in_memory().unwrap();
        let model = Arc::new(ScriptedModelClient::new());
        let worker = AnnotationWorker::new(
            db.clone(),
            Arc::clone(&model) as Arc<dyn ModelClient>,
            AnnotationOptions::default(),
        );
        (db, model, worker)
    }

    fn seed_placeholder(db: &Database, job_id: &str) {
        annotation_repo::insert_placeholder(db, job_id, "s1", &Utc::now().to_rfc3339()).unwrap();
    }

    fn sample_input() -> WorkerInput {
        WorkerInput {
            document_text: "Hello".to_string(),
            weaknesses: vec![FeedbackItem {
                priority: Some("high".to_string()),
                body: "Missing date".to_string(),
            }],
            recommendations: vec![],
            strengths: vec![],
        }
    }

    const VALID_OUTPUT: &str = r#"{"sections":[{"type":"text","content":"Hello"},{"type":"annotations","items":[{"priority":"high","type":"weakness","text":"Missing date"}]}]}"#;

    #[tokio::test]
    async fn test_valid_output_completes_job() {
        let (db, model, worker) = setup();
        seed_placeholder(&db, "j1");
        model.push_text(VALID_OUTPUT);

        worker.execute("j1", sample_input()).await;

        let row = annotation_repo::find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.status(), Some(GenerationStatus::Completed));
        assert_eq!(row.model_used.as_deref(), Some("scripted"));
        assert_eq!(row.input_tokens, Some(128));
        assert_eq!(row.output_tokens, Some(64));
        assert!(row.generation_time_ms.is_some());

        // The stored content round-trips to the exact document.
        let stored: AnnotatedDocument =
            serde_json::from_str(row.annotated_content.as_deref().unwrap()).unwrap();
        let expected: AnnotatedDocument = serde_json::from_str(VALID_OUTPUT).unwrap();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn test_fenced_output_completes_job() {
        let (db, model, worker) = setup();
        seed_placeholder(&db, "j1");
        model.push_text(format!("```json\n{}\n```", VALID_OUTPUT));

        worker.execute("j1", sample_input()).await;

        let row = annotation_repo::find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.status(), Some(GenerationStatus::Completed));
    }

    #[tokio::test]
    async fn test_unparseable_output_fails_job() {
        let (db, model, worker) = setup();
        seed_placeholder(&db, "j1");
        model.push_text("Sure! Here is the annotated document you asked for.");

        worker.execute("j1", sample_input()).await;

        let row = annotation_repo::find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.status(), Some(GenerationStatus::Failed));
        assert!(row.annotated_content.is_none());
        assert!(row.error.as_deref().unwrap().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_unknown_section_type_fails_job() {
        let (db, model, worker) = setup();
        seed_placeholder(&db, "j1");
        model.push_text(r#"{"sections":[{"type":"sidebar","content":"Hello"}]}"#);

        worker.execute("j1", sample_input()).await;

        let row = annotation_repo::find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.status(), Some(GenerationStatus::Failed));
        assert!(row.annotated_content.is_none());
    }

    #[tokio::test]
    async fn test_item_missing_priority_fails_job() {
        let (db, model, worker) = setup();
        seed_placeholder(&db, "j1");
        model.push_text(
            r#"{"sections":[{"type":"annotations","items":[{"type":"weakness","text":"x"}]}]}"#,
        );

        worker.execute("j1", sample_input()).await;

        let row = annotation_repo::find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.status(), Some(GenerationStatus::Failed));
    }

    #[tokio::test]
    async fn test_empty_text_content_fails_job() {
        let (db, model, worker) = setup();
        seed_placeholder(&db, "j1");
        model.push_text(r#"{"sections":[{"type":"text","content":""}]}"#);

        worker.execute("j1", sample_input()).await;

        let row = annotation_repo::find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.status(), Some(GenerationStatus::Failed));
        assert!(row
            .error
            .as_deref()
            .unwrap()
            .contains("annotated-document schema"));
    }

    #[tokio::test]
    async fn test_model_timeout_fails_job() {
        let (db, model, worker) = setup();
        seed_placeholder(&db, "j1");
        model.push(ScriptedReply::Timeout);

        worker.execute("j1", sample_input()).await;

        let row = annotation_repo::find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.status(), Some(GenerationStatus::Failed));
        assert!(row.error.as_deref().unwrap().contains("model call failed"));
    }

    #[tokio::test]
    async fn test_worker_uses_deterministic_sampling() {
        let (db, model, worker) = setup();
        seed_placeholder(&db, "j1");
        model.push_text(VALID_OUTPUT);

        worker.execute("j1", sample_input()).await;

        // One call, carrying the document and feedback.
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Missing date"));
    }

    #[tokio::test]
    async fn test_completed_job_not_overwritten_by_late_worker() {
        let (db, model, worker) = setup();
        seed_placeholder(&db, "j1");
        // Another actor completes the job before the worker finishes.
        annotation_repo::complete(&db, "j1", "{}", "other", 1, 1, 1, "2026-01-01").unwrap();
        model.push_text(VALID_OUTPUT);

        worker.execute("j1", sample_input()).await;

        let row = annotation_repo::find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.annotated_content.as_deref(), Some("{}"));
        assert_eq!(row.model_used.as_deref(), Some("other"));
    }

    #[test]
    fn test_worker_input_from_feedback_rows() {
        let rows = vec![
            FeedbackRow {
                id: "f1".to_string(),
                submission_id: "s1".to_string(),
                kind: KIND_WEAKNESS.to_string(),
                priority: Some("high".to_string()),
                body: "w".to_string(),
                created_at: "2026-01-01".to_string(),
            },
            FeedbackRow {
                id: "f2".to_string(),
                submission_id: "s1".to_string(),
                kind: KIND_STRENGTH.to_string(),
                priority: None,
                body: "s".to_string(),
                created_at: "2026-01-01".to_string(),
            },
            FeedbackRow {
                id: "f3".to_string(),
                submission_id: "s1".to_string(),
                kind: "applause".to_string(),
                priority: None,
                body: "x".to_string(),
                created_at: "2026-01-01".to_string(),
            },
        ];

        let input = WorkerInput::from_feedback("doc".to_string(), &rows);
        assert_eq!(input.weaknesses.len(), 1);
        assert_eq!(input.strengths, vec!["s".to_string()]);
        assert!(input.recommendations.is_empty());
    }
}
