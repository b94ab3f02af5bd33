use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedlineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Annotation error: {0}")]
    Annotation(#[from] crate::annotation::AnnotationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] crate::ai::ModelError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Document not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid document key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install log bridge: {0}")]
    LogBridge(String),

    #[error("Failed to set global tracing subscriber: {0}")]
    SetSubscriber(String),
}

pub type Result<T> = std::result::Result<T, RedlineError>;
