pub mod context;
pub mod error;
pub mod failure;
pub mod progress;
pub mod retry;
pub mod runner;
pub mod stage;

pub use context::{PipelineContext, TriggerEvent};
pub use error::PipelineError;
pub use failure::{FailureHandler, FailureSink};
pub use progress::{
    BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter, RunProgressBroadcaster,
    RunProgressEvent,
};
pub use retry::RetryPolicy;
pub use runner::{AbortHandle, Pipeline, PlanNode, RunState, StandardStages, WorkflowRun};
pub use stage::{
    StageError, StageExecutor, StageInvocation, StageName, StageOutcome, StageStatus,
};
