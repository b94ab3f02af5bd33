pub mod access;
pub mod ai;
pub mod annotation;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod stages;
pub mod storage;
pub mod telemetry;

pub use access::{AccessPolicy, AllowAll, OwnerOnly, Principal};
pub use ai::{HttpModelClient, ModelClient, ModelError, ModelOptions, ModelReply};
pub use annotation::{
    AnnotatedDocument, AnnotationError, AnnotationResponse, AnnotationService, AnnotationWorker,
};
pub use config::{load_config, Config};
pub use error::{ConfigError, RedlineError, Result, StorageError, TelemetryError};
pub use pipeline::{
    Pipeline, PipelineContext, PipelineError, RunState, StageExecutor, StageName, StageOutcome,
    TriggerEvent, WorkflowRun,
};
pub use storage::{DocumentStore, FileStore, MemoryStore};
