//! Scripted in-memory model client for tests.
//!
//! Replies are served in FIFO order; every prompt is recorded so tests can
//! assert on what was sent. An exhausted script fails the call, which is
//! usually the bug you want surfaced.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{ModelClient, ModelError, ModelOptions, ModelReply};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    TransientError(String),
    FatalError(String),
    Timeout,
}

#[derive(Default)]
pub struct ScriptedModelClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(ScriptedReply::Text(text.into()));
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .expect("scripted replies lock")
            .push_back(reply);
    }

    /// All prompts sent so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("scripted prompts lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().expect("scripted prompts lock").len()
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedModelClient {
    async fn send_message(
        &self,
        prompt: &str,
        _options: &ModelOptions,
    ) -> Result<ModelReply, ModelError> {
        self.prompts
            .lock()
            .expect("scripted prompts lock")
            .push(prompt.to_string());

        let next = self
            .replies
            .lock()
            .expect("scripted replies lock")
            .pop_front();

        match next {
            Some(ScriptedReply::Text(text)) => Ok(ModelReply {
                text,
                model: "scripted".to_string(),
                input_tokens: 128,
                output_tokens: 64,
            }),
            Some(ScriptedReply::TransientError(body)) => {
                Err(ModelError::Status { status: 429, body })
            }
            Some(ScriptedReply::FatalError(body)) => Err(ModelError::Status { status: 400, body }),
            Some(ScriptedReply::Timeout) => Err(ModelError::Timeout(Duration::from_millis(1))),
            None => Err(ModelError::Malformed(
                "scripted client exhausted: no reply queued for this call".to_string(),
            )),
        }
    }
}
