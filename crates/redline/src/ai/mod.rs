//! Generative-model seam.
//!
//! Everything that talks to an LLM goes through [`ModelClient`], so stage
//! executors and the annotation worker are testable without network access.
//! The HTTP implementation lives in [`client`], a scripted in-memory
//! implementation for tests in [`scripted`].

pub mod client;
pub mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use client::HttpModelClient;
pub use scripted::ScriptedModelClient;

/// Per-call sampling and budget options.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A completed model call: generated text plus usage metadata.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Errors from a model invocation.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed model response: {0}")]
    Malformed(String),
}

impl ModelError {
    /// Returns true if the error is likely transient and the call can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Http(e) => e.is_timeout() || e.is_connect(),
            ModelError::Status { status, .. } => *status == 429 || *status >= 500,
            ModelError::Timeout(_) => true,
            ModelError::Malformed(_) => false,
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn send_message(
        &self,
        prompt: &str,
        options: &ModelOptions,
    ) -> Result<ModelReply, ModelError>;
}

/// Strips enclosing markdown code fences from model output.
///
/// Models frequently wrap JSON in ```json ... ``` or ``` ... ``` even when
/// told not to. The stripped slice parses identically to unwrapped output of
/// the same content; text that is not fenced is returned untouched.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };

    // Drop an optional language tag on the opening fence line.
    let rest = match rest.split_once('\n') {
        Some((first_line, body)) if first_line.trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            body
        }
        _ => rest,
    };

    rest.trim()
}
