//! The pipeline runner: an explicit, testable sequencer over the six
//! analysis stages.
//!
//! Stages execute in a fixed partial order with a parallel fan-out branch.
//! Every stage receives the entire accumulated context, transient failures
//! are retried under the shared policy, and the run converges to exactly
//! one terminal state. Failure terminals notify the configured sink, which
//! owns the submission-status flip and the durable retry queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{error, warn};

use super::context::{PipelineContext, TriggerEvent};
use super::error::PipelineError;
use super::failure::FailureSink;
use super::progress::{ProgressEvent, ProgressReporter};
use super::retry::RetryPolicy;
use super::stage::{StageError, StageExecutor, StageInvocation, StageName, StageOutcome, StageStatus};

/// Identifier of the analysis state machine; paired with the per-run
/// execution id it names one `WorkflowRun`.
pub const STATE_MACHINE_ID: &str = "document-analysis";

const DEFAULT_DEADLINE: Duration = Duration::from_secs(900);

/// Lifecycle of one run. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

/// One execution of the analysis state machine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub state_machine_id: String,
    pub execution_id: String,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// One step of the execution plan: a single stage, or a fan-out of sibling
/// branches that only communicate through their own context slots.
pub enum PlanNode {
    Stage(Arc<dyn StageExecutor>),
    Parallel(Vec<Arc<dyn StageExecutor>>),
}

/// The six standard stages wired into their fixed partial order. The
/// grammar branch is a vector: degree 1 today, built for more.
pub struct StandardStages {
    pub structure_check: Arc<dyn StageExecutor>,
    pub content_check: Arc<dyn StageExecutor>,
    pub grammar_checks: Vec<Arc<dyn StageExecutor>>,
    pub orchestration: Arc<dyn StageExecutor>,
    pub clarification: Arc<dyn StageExecutor>,
    pub scoring: Arc<dyn StageExecutor>,
}

impl StandardStages {
    /// # Panics
    /// Panics if the grammar branch is empty.
    pub fn into_plan(self) -> Vec<PlanNode> {
        assert!(
            !self.grammar_checks.is_empty(),
            "grammar branch must have at least one stage"
        );
        vec![
            PlanNode::Stage(self.structure_check),
            PlanNode::Stage(self.content_check),
            PlanNode::Parallel(self.grammar_checks),
            PlanNode::Stage(self.orchestration),
            PlanNode::Stage(self.clarification),
            PlanNode::Stage(self.scoring),
        ]
    }
}

/// Handle for externally aborting a run. Checked between stages; an
/// in-flight stage invocation is never preempted.
#[derive(Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct Pipeline {
    plan: Vec<PlanNode>,
    retry: RetryPolicy,
    deadline: Duration,
    abort: Arc<AtomicBool>,
    failure: Option<Arc<dyn FailureSink>>,
}

impl Pipeline {
    pub fn new(plan: Vec<PlanNode>) -> Result<Self, PipelineError> {
        if plan.is_empty() {
            return Err(PipelineError::EmptyPlan);
        }
        Ok(Self {
            plan,
            retry: RetryPolicy::default(),
            deadline: DEFAULT_DEADLINE,
            abort: Arc::new(AtomicBool::new(false)),
            failure: None,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overall wall-clock deadline for one run; exceeding it forces the
    /// `TimedOut` terminal state.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.failure = Some(sink);
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::clone(&self.abort))
    }

    /// Drives the plan to a terminal state.
    ///
    /// Returns the terminal `WorkflowRun` and the accumulated context; the
    /// context keeps every recorded outcome (including failed ones and
    /// completed siblings of a failed branch) for diagnostics.
    pub async fn run(
        &self,
        trigger: TriggerEvent,
        progress: &dyn ProgressReporter,
    ) -> (WorkflowRun, PipelineContext) {
        let started = Instant::now();
        let mut ctx = PipelineContext::new(trigger);
        let mut run = WorkflowRun {
            state_machine_id: STATE_MACHINE_ID.to_string(),
            execution_id: uuid::Uuid::new_v4().to_string(),
            state: RunState::Running,
            failed_stage: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        };

        for node in &self.plan {
            if self.abort.load(Ordering::Relaxed) {
                self.finish(
                    &mut run,
                    &ctx,
                    RunState::Aborted,
                    None,
                    Some("run aborted externally".to_string()),
                    progress,
                );
                return (run, ctx);
            }

            let Some(remaining) = self.deadline.checked_sub(started.elapsed()) else {
                self.finish(
                    &mut run,
                    &ctx,
                    RunState::TimedOut,
                    None,
                    Some(format!("run exceeded deadline of {:?}", self.deadline)),
                    progress,
                );
                return (run, ctx);
            };

            match node {
                PlanNode::Stage(executor) => {
                    let input = ctx.invocation();
                    let timed = tokio::time::timeout(
                        remaining,
                        self.run_stage(executor.as_ref(), &input, progress),
                    )
                    .await;

                    match timed {
                        Err(_) => {
                            self.finish(
                                &mut run,
                                &ctx,
                                RunState::TimedOut,
                                Some(executor.name()),
                                Some(format!(
                                    "run exceeded deadline of {:?} during {}",
                                    self.deadline,
                                    executor.name()
                                )),
                                progress,
                            );
                            return (run, ctx);
                        }
                        Ok((stage, outcome, stage_error)) => {
                            let failed = outcome.status == StageStatus::Failed;
                            if let Err(e) = ctx.record(stage, outcome) {
                                self.finish(
                                    &mut run,
                                    &ctx,
                                    RunState::Failed,
                                    Some(stage),
                                    Some(e.to_string()),
                                    progress,
                                );
                                return (run, ctx);
                            }
                            if failed {
                                self.finish(
                                    &mut run,
                                    &ctx,
                                    RunState::Failed,
                                    Some(stage),
                                    stage_error,
                                    progress,
                                );
                                return (run, ctx);
                            }
                        }
                    }
                }
                PlanNode::Parallel(branches) => {
                    // Siblings all see the context as of the fan-out point
                    // and only write their own slots.
                    let input = ctx.invocation();
                    let timed = tokio::time::timeout(
                        remaining,
                        join_all(
                            branches
                                .iter()
                                .map(|executor| self.run_stage(executor.as_ref(), &input, progress)),
                        ),
                    )
                    .await;

                    let results = match timed {
                        Err(_) => {
                            self.finish(
                                &mut run,
                                &ctx,
                                RunState::TimedOut,
                                None,
                                Some(format!(
                                    "run exceeded deadline of {:?} in parallel branch",
                                    self.deadline
                                )),
                                progress,
                            );
                            return (run, ctx);
                        }
                        Ok(results) => results,
                    };

                    // Record every branch outcome, completed siblings
                    // included, before deciding the terminal.
                    let mut first_failure: Option<(StageName, Option<String>)> = None;
                    for (stage, outcome, stage_error) in results {
                        let failed = outcome.status == StageStatus::Failed;
                        if let Err(e) = ctx.record(stage, outcome) {
                            error!("Failed to record outcome for {}: {}", stage, e);
                            first_failure.get_or_insert((stage, Some(e.to_string())));
                            continue;
                        }
                        if failed && first_failure.is_none() {
                            first_failure = Some((stage, stage_error));
                        }
                    }

                    if let Some((stage, stage_error)) = first_failure {
                        self.finish(
                            &mut run,
                            &ctx,
                            RunState::Failed,
                            Some(stage),
                            stage_error,
                            progress,
                        );
                        return (run, ctx);
                    }
                }
            }
        }

        self.finish(&mut run, &ctx, RunState::Succeeded, None, None, progress);
        (run, ctx)
    }

    /// Runs one stage to its final outcome, applying the shared retry
    /// policy. Intermediate attempts are invisible to the caller.
    async fn run_stage(
        &self,
        executor: &dyn StageExecutor,
        input: &StageInvocation,
        progress: &dyn ProgressReporter,
    ) -> (StageName, StageOutcome, Option<String>) {
        let stage = executor.name();
        progress.report(ProgressEvent::StageStarted { stage });
        let started = Instant::now();

        let mut last_error: Option<StageError> = None;
        for attempt in 1..=self.retry.max_attempts {
            match executor.execute(input).await {
                Ok(payload) => {
                    let outcome =
                        StageOutcome::succeeded(payload, started.elapsed().as_millis() as u64);
                    progress.report(ProgressEvent::StageFinished {
                        stage,
                        status: StageStatus::Succeeded,
                        duration_ms: outcome.duration_ms,
                    });
                    return (stage, outcome, None);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    warn!(
                        stage = %stage,
                        attempt,
                        "Stage failed with retryable error: {}", e
                    );
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "stage failed".to_string());
        let outcome = StageOutcome::failed(&message, started.elapsed().as_millis() as u64);
        progress.report(ProgressEvent::StageFinished {
            stage,
            status: StageStatus::Failed,
            duration_ms: outcome.duration_ms,
        });
        (stage, outcome, Some(message))
    }

    fn finish(
        &self,
        run: &mut WorkflowRun,
        ctx: &PipelineContext,
        state: RunState,
        failed_stage: Option<StageName>,
        error: Option<String>,
        progress: &dyn ProgressReporter,
    ) {
        run.state = state;
        run.failed_stage = failed_stage;
        run.error = error.clone();
        run.finished_at = Some(Utc::now());

        progress.report(ProgressEvent::RunFinished { state, error });

        if state != RunState::Succeeded {
            if let Some(ref sink) = self.failure {
                sink.on_run_failure(ctx.trigger(), run);
            }
        }
    }
}
