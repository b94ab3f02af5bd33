//! Run progress reporting.
//!
//! The runner reports through the [`ProgressReporter`] seam; hosts that
//! stream status subscribe to a [`RunProgressBroadcaster`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::runner::RunState;
use super::stage::{StageName, StageStatus};

/// Events emitted by the runner during a pipeline run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    StageStarted {
        stage: StageName,
    },
    StageFinished {
        stage: StageName,
        status: StageStatus,
        duration_ms: u64,
    },
    RunFinished {
        state: RunState,
        error: Option<String>,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Serialized progress event delivered to broadcast subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgressEvent {
    pub execution_id: String,
    pub submission_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageName>,
    pub state: RunState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Fans run progress out to any number of subscribers.
#[derive(Clone)]
pub struct RunProgressBroadcaster {
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl RunProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates the per-run reporter handed to `Pipeline::run`.
    pub fn start_run(&self, execution_id: &str, submission_id: &str) -> BroadcastProgress {
        BroadcastProgress {
            execution_id: execution_id.to_string(),
            submission_id: submission_id.to_string(),
            sender: Arc::clone(&self.sender),
        }
    }
}

impl Default for RunProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Bridges runner events onto the broadcast channel.
pub struct BroadcastProgress {
    execution_id: String,
    submission_id: String,
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl BroadcastProgress {
    fn send(&self, stage: Option<StageName>, state: RunState, message: String) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(RunProgressEvent {
            execution_id: self.execution_id.clone(),
            submission_id: self.submission_id.clone(),
            stage,
            state,
            message,
            timestamp: Utc::now(),
        });
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage } => {
                self.send(Some(stage), RunState::Running, format!("Running {}", stage));
            }
            ProgressEvent::StageFinished {
                stage,
                status,
                duration_ms,
            } => {
                let message = match status {
                    StageStatus::Succeeded => {
                        format!("{} completed in {}ms", stage, duration_ms)
                    }
                    StageStatus::Failed => format!("{} failed after {}ms", stage, duration_ms),
                };
                self.send(Some(stage), RunState::Running, message);
            }
            ProgressEvent::RunFinished { state, error } => {
                let message = match &error {
                    Some(e) => format!("Run finished: {}", e),
                    None => "Run finished".to_string(),
                };
                self.send(None, state, message);
            }
        }
    }
}
