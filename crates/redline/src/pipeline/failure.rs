//! Failure routing for pipeline runs.
//!
//! A failure terminal has two side effects: the submission's externally
//! visible status flips to failed (so UI callers stop polling), and the
//! trigger payload lands on the durable retry queue, whose bounded
//! redelivery parks hopeless messages in the dead-letter set.

use chrono::Utc;
use tracing::{error, info};

use crate::db::submission_repo::AnalysisStatus;
use crate::db::{queue_repo, submission_repo, Database};

use super::context::TriggerEvent;
use super::runner::WorkflowRun;

/// Receiver of failure-terminal notifications.
pub trait FailureSink: Send + Sync {
    fn on_run_failure(&self, trigger: &TriggerEvent, run: &WorkflowRun);
}

/// Database-backed failure handler.
pub struct FailureHandler {
    db: Database,
}

impl FailureHandler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl FailureSink for FailureHandler {
    fn on_run_failure(&self, trigger: &TriggerEvent, run: &WorkflowRun) {
        let reason = run
            .error
            .clone()
            .unwrap_or_else(|| format!("run ended in state {:?}", run.state));
        let now = Utc::now().to_rfc3339();

        info!(
            submission_id = %trigger.submission_id,
            execution_id = %run.execution_id,
            state = ?run.state,
            "Routing failed run"
        );

        if let Err(e) = submission_repo::set_status(
            &self.db,
            &trigger.submission_id,
            AnalysisStatus::Failed,
            Some(&reason),
            &now,
        ) {
            error!(
                "Failed to mark submission {} as failed: {}",
                trigger.submission_id, e
            );
        }

        let payload = match serde_json::to_string(trigger) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize trigger for retry queue: {}", e);
                return;
            }
        };

        if let Err(e) = queue_repo::enqueue(&self.db, &trigger.submission_id, &payload, &reason, &now)
        {
            error!(
                "Failed to enqueue failure for submission {}: {}",
                trigger.submission_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::db::submission_repo::SubmissionRow;
    use crate::pipeline::runner::{RunState, STATE_MACHINE_ID};

    fn sample_trigger() -> TriggerEvent {
        TriggerEvent {
            document_id: "d1".to_string(),
            submission_id: "s1".to_string(),
            source_bucket: "uploads".to_string(),
            source_key: "d1.txt".to_string(),
            overlay_id: "o1".to_string(),
            uploaded_at: Utc::now(),
        }
    }

    fn failed_run(error: &str) -> WorkflowRun {
        WorkflowRun {
            state_machine_id: STATE_MACHINE_ID.to_string(),
            execution_id: "exec-1".to_string(),
            state: RunState::Failed,
            failed_stage: None,
            error: Some(error.to_string()),
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
        }
    }

    fn seed_submission(db: &Database, id: &str) {
        let now = Utc::now().to_rfc3339();
        submission_repo::insert(
            db,
            &SubmissionRow {
                id: id.to_string(),
                document_id: "d1".to_string(),
                overlay_id: "o1".to_string(),
                source_bucket: "uploads".to_string(),
                source_key: "d1.txt".to_string(),
                owner_id: "alice".to_string(),
                analysis_status: "analyzing".to_string(),
                error: None,
                created_at: now.clone(),
                updated_at: now,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_failure_marks_submission_and_enqueues() {
        let db = Database::open_in_memory().unwrap();
        seed_submission(&db, "s1");

        let handler = FailureHandler::new(db.clone());
        handler.on_run_failure(&sample_trigger(), &failed_run("grammar-check blew up"));

        let submission = submission_repo::find_by_id(&db, "s1").unwrap().unwrap();
        assert_eq!(submission.status(), Some(AnalysisStatus::Failed));
        assert_eq!(submission.error.as_deref(), Some("grammar-check blew up"));

        assert_eq!(queue_repo::pending_count(&db).unwrap(), 1);
        let leased = queue_repo::lease_next(&db, 3, "2026-01-01").unwrap().unwrap();
        assert_eq!(leased.submission_id, "s1");
        assert_eq!(leased.reason, "grammar-check blew up");
        // The payload is the serialized trigger, replayable as-is.
        let replay: TriggerEvent = serde_json::from_str(&leased.payload).unwrap();
        assert_eq!(replay.document_id, "d1");
    }

    #[test]
    fn test_unknown_submission_still_enqueues() {
        let db = Database::open_in_memory().unwrap();

        let handler = FailureHandler::new(db.clone());
        handler.on_run_failure(&sample_trigger(), &failed_run("boom"));

        // No submission row to update, but the failure is still durable.
        assert_eq!(queue_repo::pending_count(&db).unwrap(), 1);
    }
}
