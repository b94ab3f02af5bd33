//! Typed configuration loaded from JSON.
//!
//! Loading is three passes: JSON Schema validation of the raw value,
//! deserialization into the typed struct (applying defaults), and semantic
//! checks the schema cannot express.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::annotation::AnnotationOptions;
use crate::error::ConfigError;
use crate::pipeline::RetryPolicy;

const SCHEMA_JSON: &str = include_str!("../schema/config-v1.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    /// Defaults to `~/.redline/data/redline.db` when absent.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    pub model: ModelConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub annotation: AnnotationSettings,
    #[serde(default)]
    pub queue: QueueSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub run_deadline_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            run_deadline_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotationSettings {
    pub max_output_tokens: u32,
    pub model_timeout_secs: u64,
    pub stale_after_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: 16384,
            model_timeout_secs: 120,
            stale_after_secs: 600,
            poll_interval_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueSettings {
    pub max_deliveries: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { max_deliveries: 3 }
    }
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.pipeline.max_attempts,
            base_delay: Duration::from_millis(self.pipeline.base_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.pipeline.run_deadline_secs)
    }

    pub fn annotation_options(&self) -> AnnotationOptions {
        AnnotationOptions {
            max_output_tokens: self.annotation.max_output_tokens,
            model_timeout: Duration::from_secs(self.annotation.model_timeout_secs),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| format!("{} at {}", e, e.instance_path()))
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if !config.model.endpoint.starts_with("http://") && !config.model.endpoint.starts_with("https://")
    {
        return Err(ConfigError::Validation {
            message: format!("Model endpoint must be an HTTP(S) URL: {}", config.model.endpoint),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> &'static str {
        r#"{
            "version": "1.0",
            "model": {
                "endpoint": "https://models.internal/v1/messages",
                "model": "eval-large"
            }
        }"#
    }

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config = load_config_from_str(minimal_config()).unwrap();
        assert_eq!(config.version, "1.0");
        assert!(config.database_path.is_none());
        assert_eq!(config.pipeline.max_attempts, 3);
        assert_eq!(config.pipeline.run_deadline_secs, 900);
        assert_eq!(config.annotation.max_output_tokens, 16384);
        assert_eq!(config.annotation.poll_interval_secs, 3);
        assert_eq!(config.queue.max_deliveries, 3);
        assert_eq!(config.model.request_timeout_secs, 60);
    }

    #[test]
    fn test_full_config_parses() {
        let config = load_config_from_str(
            r#"{
                "version": "1.0",
                "databasePath": "/var/lib/redline/redline.db",
                "model": {
                    "endpoint": "https://models.internal/v1/messages",
                    "model": "eval-large",
                    "apiKeyEnv": "REDLINE_MODEL_KEY",
                    "requestTimeoutSecs": 30
                },
                "pipeline": {
                    "maxAttempts": 5,
                    "baseDelayMs": 100,
                    "runDeadlineSecs": 600
                },
                "annotation": {
                    "maxOutputTokens": 8192,
                    "modelTimeoutSecs": 90,
                    "staleAfterSecs": 300,
                    "pollIntervalSecs": 2
                },
                "queue": {
                    "maxDeliveries": 5
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/var/lib/redline/redline.db"))
        );
        assert_eq!(config.pipeline.max_attempts, 5);
        assert_eq!(config.annotation.stale_after_secs, 300);
        assert_eq!(config.queue.max_deliveries, 5);
        assert_eq!(
            config.model.api_key_env.as_deref(),
            Some("REDLINE_MODEL_KEY")
        );
    }

    #[test]
    fn test_unknown_field_rejected_by_schema() {
        let result = load_config_from_str(
            r#"{
                "version": "1.0",
                "model": {"endpoint": "https://m.test", "model": "m"},
                "shiny": true
            }"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn test_missing_model_rejected_by_schema() {
        let result = load_config_from_str(r#"{"version": "1.0"}"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_zero_max_attempts_rejected_by_schema() {
        let result = load_config_from_str(
            r#"{
                "version": "1.0",
                "model": {"endpoint": "https://m.test", "model": "m"},
                "pipeline": {"maxAttempts": 0}
            }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let result = load_config_from_str(
            r#"{
                "version": "2.0",
                "model": {"endpoint": "https://m.test", "model": "m"}
            }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let result = load_config_from_str(
            r#"{
                "version": "1.0",
                "model": {"endpoint": "ftp://m.test", "model": "m"}
            }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(matches!(
            load_config_from_str("not json at all"),
            Err(ConfigError::ParseJson(_))
        ));
    }

    #[test]
    fn test_conversion_helpers() {
        let config = load_config_from_str(minimal_config()).unwrap();
        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(200));
        assert_eq!(config.run_deadline(), Duration::from_secs(900));
        assert_eq!(config.annotation_options().max_output_tokens, 16384);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, minimal_config()).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.model.model, "eval-large");

        assert!(matches!(
            load_config(dir.path().join("missing.json")),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
