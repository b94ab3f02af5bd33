//! Test harness for isolated end-to-end runs.
//!
//! The `TestHarness` wires the real components — in-memory SQLite, the
//! memory document store, and the scripted model client — into the same
//! shapes production uses, so integration tests exercise the actual
//! pipeline and annotation flows without network access.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;

use redline::ai::{ModelClient, ModelOptions, ScriptedModelClient};
use redline::access::AllowAll;
use redline::annotation::AnnotationService;
use redline::db::submission_repo::{self, SubmissionRow};
use redline::db::{feedback_repo, Database};
use redline::pipeline::{FailureHandler, FailureSink, Pipeline, RetryPolicy, TriggerEvent};
use redline::stages::standard_suite;
use redline::storage::{DocumentStore, MemoryStore};

pub struct TestHarness {
    pub db: Database,
    pub model: Arc<ScriptedModelClient>,
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            db: Database::open_in_memory().expect("open in-memory database"),
            model: Arc::new(ScriptedModelClient::new()),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Inserts a submission row, stores its document text, and returns the
    /// trigger event that would start its pipeline run.
    pub fn seed_submission(&self, submission_id: &str, document_text: &str) -> TriggerEvent {
        let now = Utc::now();
        let source_key = format!("{}.txt", submission_id);

        submission_repo::insert(
            &self.db,
            &SubmissionRow {
                id: submission_id.to_string(),
                document_id: format!("doc-{}", submission_id),
                overlay_id: "overlay-1".to_string(),
                source_bucket: "uploads".to_string(),
                source_key: source_key.clone(),
                owner_id: "alice".to_string(),
                analysis_status: "analyzing".to_string(),
                error: None,
                created_at: now.to_rfc3339(),
                updated_at: now.to_rfc3339(),
            },
        )
        .expect("insert submission");

        self.store.insert("uploads", &source_key, document_text);

        TriggerEvent {
            document_id: format!("doc-{}", submission_id),
            submission_id: submission_id.to_string(),
            source_bucket: "uploads".to_string(),
            source_key,
            overlay_id: "overlay-1".to_string(),
            uploaded_at: now,
        }
    }

    pub fn mark_analysis_succeeded(&self, submission_id: &str) {
        submission_repo::set_status(
            &self.db,
            submission_id,
            submission_repo::AnalysisStatus::Succeeded,
            None,
            &Utc::now().to_rfc3339(),
        )
        .expect("mark submission succeeded");
    }

    pub fn seed_feedback(
        &self,
        submission_id: &str,
        kind: &str,
        priority: Option<&str>,
        body: &str,
    ) {
        feedback_repo::insert(
            &self.db,
            &feedback_repo::FeedbackRow {
                id: uuid_like(submission_id, kind, body),
                submission_id: submission_id.to_string(),
                kind: kind.to_string(),
                priority: priority.map(|p| p.to_string()),
                body: body.to_string(),
                created_at: Utc::now().to_rfc3339(),
            },
        )
        .expect("insert feedback");
    }

    /// The standard six-stage pipeline over the scripted model, with fast
    /// retries and the database-backed failure handler.
    pub fn pipeline(&self) -> Pipeline {
        let suite = standard_suite(
            Arc::clone(&self.model) as Arc<dyn ModelClient>,
            Arc::clone(&self.store) as Arc<dyn DocumentStore>,
            ModelOptions::default(),
        );

        Pipeline::new(suite.into_plan())
            .expect("build pipeline")
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                base_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(2),
            })
            .with_failure_sink(
                Arc::new(FailureHandler::new(self.db.clone())) as Arc<dyn FailureSink>
            )
    }

    pub fn annotation_service(&self) -> AnnotationService {
        AnnotationService::new(
            self.db.clone(),
            Arc::clone(&self.model) as Arc<dyn ModelClient>,
            Arc::clone(&self.store) as Arc<dyn DocumentStore>,
            Arc::new(AllowAll),
        )
    }

    /// Queues one scripted JSON payload per pipeline stage.
    pub fn script_successful_analysis(&self) {
        for stage in [
            "structure-check",
            "content-check",
            "grammar-check",
            "orchestration",
            "clarification",
            "scoring",
        ] {
            self.model
                .push_text(format!(r#"{{"stage": "{}", "ok": true}}"#, stage));
        }
    }
}

fn uuid_like(a: &str, b: &str, c: &str) -> String {
    // Stable-but-unique ids keep failures readable.
    format!("{}-{}-{}", a, b, c.len())
}
