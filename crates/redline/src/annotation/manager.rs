//! The annotation job manager: idempotent submission and dispatch.
//!
//! `request` is the whole client-facing contract: gate on existence,
//! visibility, and pipeline success; serve `generating` or cached
//! `completed` jobs as-is; otherwise create the placeholder row and
//! dispatch the detached worker. The placeholder insert is atomic (partial
//! unique index), so two concurrent requests cannot both dispatch — the
//! loser falls back to the winner's row.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::access::{AccessPolicy, Principal};
use crate::ai::ModelClient;
use crate::db::annotation_repo::{self, AnnotationJobRow, GenerationStatus, PlaceholderInsert};
use crate::db::submission_repo::{self, AnalysisStatus, SubmissionRow};
use crate::db::{feedback_repo, Database};
use crate::storage::DocumentStore;

use super::document::AnnotatedDocument;
use super::error::AnnotationError;
use super::worker::{AnnotationWorker, WorkerInput};

/// Generation settings shared by the manager and its workers.
#[derive(Debug, Clone)]
pub struct AnnotationOptions {
    /// Output-token budget, sized for reproducing long documents.
    pub max_output_tokens: u32,
    pub model_timeout: Duration,
}

impl Default for AnnotationOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: 16384,
            model_timeout: Duration::from_secs(120),
        }
    }
}

/// Response to an annotation request, shaped for the HTTP edge.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum AnnotationResponse {
    #[serde(rename = "generating")]
    Generating {
        message: String,
        #[serde(rename = "annotationId")]
        annotation_id: String,
    },
    #[serde(rename = "completed")]
    Completed {
        annotated_json: AnnotatedDocument,
        model_used: String,
        input_tokens: u64,
        output_tokens: u64,
        generation_time_ms: u64,
        cached: bool,
    },
}

impl AnnotationResponse {
    pub fn http_status(&self) -> u16 {
        match self {
            AnnotationResponse::Generating { .. } => 202,
            AnnotationResponse::Completed { .. } => 200,
        }
    }
}

pub struct AnnotationService {
    db: Database,
    model: Arc<dyn ModelClient>,
    store: Arc<dyn DocumentStore>,
    access: Arc<dyn AccessPolicy>,
    options: AnnotationOptions,
}

impl AnnotationService {
    pub fn new(
        db: Database,
        model: Arc<dyn ModelClient>,
        store: Arc<dyn DocumentStore>,
        access: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            db,
            model,
            store,
            access,
            options: AnnotationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AnnotationOptions) -> Self {
        self.options = options;
        self
    }

    /// Requests annotation for a submission.
    ///
    /// Returns `generating` (202) while a job is in flight or was just
    /// dispatched, or `completed` (200) with the cached content. A
    /// `completed` job is never regenerated by asking again; a `failed`
    /// job is superseded by a brand-new one.
    pub async fn request(
        &self,
        submission_id: &str,
        principal: &Principal,
    ) -> Result<AnnotationResponse, AnnotationError> {
        let submission = submission_repo::find_by_id(&self.db, submission_id)?
            .ok_or_else(|| AnnotationError::NotFound(submission_id.to_string()))?;

        if !self.access.can_view_submission(principal, &submission) {
            return Err(AnnotationError::Forbidden(submission_id.to_string()));
        }

        if submission.status() != Some(AnalysisStatus::Succeeded) {
            return Err(AnnotationError::NotReady(submission_id.to_string()));
        }

        // The conditional insert makes the check-then-create sequence safe;
        // the loop only re-runs when we lose the race and the winner has
        // already reached a terminal state by the time we re-read.
        for _ in 0..2 {
            match annotation_repo::find_latest(&self.db, submission_id)? {
                Some(job) if job.status() == Some(GenerationStatus::Generating) => {
                    return Ok(generating_response(&job.id));
                }
                Some(job) if job.status() == Some(GenerationStatus::Completed) => {
                    return completed_response(&job, true);
                }
                // Failed, unparseable status, or no job at all: new attempt.
                _ => {}
            }

            let job_id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            match annotation_repo::insert_placeholder(&self.db, &job_id, submission_id, &now)? {
                PlaceholderInsert::Created => {
                    return self.dispatch(&submission, job_id).await;
                }
                PlaceholderInsert::Raced => {
                    warn!(
                        submission_id,
                        "Lost placeholder race; falling back to winner's job"
                    );
                    continue;
                }
            }
        }

        Err(AnnotationError::Dispatch(
            "placeholder race did not settle".to_string(),
        ))
    }

    /// Current job status for a submission, without side effects. Lets
    /// pollers observe `failed` without triggering regeneration.
    pub fn current_status(
        &self,
        submission_id: &str,
    ) -> Result<Option<GenerationStatus>, AnnotationError> {
        let latest = annotation_repo::find_latest(&self.db, submission_id)?;
        Ok(latest.and_then(|job| job.status()))
    }

    /// Gathers the worker's input and spawns it as a detached task. Any
    /// failure before the spawn flips the just-created placeholder to
    /// `failed` so a retry is not stuck behind a ghost `generating` row.
    async fn dispatch(
        &self,
        submission: &SubmissionRow,
        job_id: String,
    ) -> Result<AnnotationResponse, AnnotationError> {
        let gathered = self.gather_input(submission).await;

        let input = match gathered {
            Ok(input) => input,
            Err(reason) => {
                match annotation_repo::mark_failed(
                    &self.db,
                    &job_id,
                    &reason,
                    &Utc::now().to_rfc3339(),
                ) {
                    Ok(_) => {}
                    Err(e) => warn!(%job_id, "Failed to fail placeholder: {}", e),
                }
                return Err(AnnotationError::Dispatch(reason));
            }
        };

        let worker = AnnotationWorker::new(
            self.db.clone(),
            Arc::clone(&self.model),
            self.options.clone(),
        );

        info!(
            %job_id,
            submission_id = %submission.id,
            "Dispatching annotation worker"
        );

        // Fire-and-forget: the request returns immediately, the worker's
        // lifetime belongs to the runtime, and its result is the job row.
        let spawned_job_id = job_id.clone();
        tokio::spawn(async move {
            worker.execute(&spawned_job_id, input).await;
        });

        Ok(generating_response(&job_id))
    }

    async fn gather_input(&self, submission: &SubmissionRow) -> Result<WorkerInput, String> {
        let document_text = self
            .store
            .fetch_text(&submission.source_bucket, &submission.source_key)
            .await
            .map_err(|e| format!("failed to read document: {}", e))?;

        let feedback = feedback_repo::for_submission(&self.db, &submission.id)
            .map_err(|e| format!("failed to load feedback: {}", e))?;

        Ok(WorkerInput::from_feedback(document_text, &feedback))
    }
}

fn generating_response(job_id: &str) -> AnnotationResponse {
    AnnotationResponse::Generating {
        message: "Annotation generation in progress; poll again shortly".to_string(),
        annotation_id: job_id.to_string(),
    }
}

fn completed_response(
    job: &AnnotationJobRow,
    cached: bool,
) -> Result<AnnotationResponse, AnnotationError> {
    let content = job
        .annotated_content
        .as_deref()
        .ok_or_else(|| AnnotationError::CorruptCache(job.submission_id.clone()))?;

    let annotated_json: AnnotatedDocument = serde_json::from_str(content)
        .map_err(|_| AnnotationError::CorruptCache(job.submission_id.clone()))?;

    Ok(AnnotationResponse::Completed {
        annotated_json,
        model_used: job.model_used.clone().unwrap_or_default(),
        input_tokens: job.input_tokens.unwrap_or(0),
        output_tokens: job.output_tokens.unwrap_or(0),
        generation_time_ms: job.generation_time_ms.unwrap_or(0),
        cached,
    })
}
