pub mod document;
pub mod error;
pub mod manager;
pub mod poll;
pub mod prompt;
pub mod sweep;
pub mod worker;

pub use document::{AnnotatedDocument, AnnotationItem, AnnotationKind, Priority, Section};
pub use error::AnnotationError;
pub use manager::{AnnotationOptions, AnnotationResponse, AnnotationService};
pub use poll::{poll_until_terminal, DEFAULT_POLL_INTERVAL};
pub use worker::{AnnotationWorker, WorkerInput};
