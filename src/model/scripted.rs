//! A deterministic [`LanguageModel`] that replays queued replies.
//!
//! Used by unit and integration tests to drive agents without a live API.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::api::{ChatMessage, Completion, GenerationOptions, LanguageModel, Usage};
use super::error::LlmError;

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Result<String, LlmError>>,
    /// Returned once `replies` is empty.
    repeat: Option<String>,
    prompts: Vec<Vec<ChatMessage>>,
}

/// Replays queued replies or errors in order and records every prompt.
///
/// Clones share the same script, so a test can keep a handle for inspection
/// after moving the model into an agent.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    model_id: String,
    script: Arc<Mutex<Script>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            model_id: "scripted".to_string(),
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    /// A model preloaded with `replies`.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new();
        for reply in replies {
            model.push_response(reply);
        }
        model
    }

    pub fn push_response(&self, text: impl Into<String>) {
        self.lock().replies.push_back(Ok(text.into()));
    }

    pub fn push_error(&self, err: LlmError) {
        self.lock().replies.push_back(Err(err));
    }

    /// Answer with `text` whenever the queue is empty.
    pub fn repeat(&self, text: impl Into<String>) {
        self.lock().repeat = Some(text.into());
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.lock().prompts.len()
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.lock().prompts.clone()
    }

    /// The most recent prompt, if any.
    pub fn last_prompt(&self) -> Option<Vec<ChatMessage>> {
        self.lock().prompts.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        // A panicking test thread must not hide the script from the others.
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> Result<Completion, LlmError> {
        let mut script = self.lock();
        script.prompts.push(messages.to_vec());

        let reply = match script.replies.pop_front() {
            Some(reply) => reply,
            None => script.repeat.clone().ok_or_else(|| LlmError::Config {
                message: "scripted model has no replies left".into(),
            }),
        }?;

        // Rough 4-chars-per-token estimate keeps usage deterministic.
        let prompt_tokens = (super::api::prompt_chars(messages) / 4) as u64;
        let completion_tokens = (reply.chars().count() / 4) as u64;
        Ok(Completion {
            text: reply,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_repeats() {
        let model = ScriptedModel::with_replies(["one", "two"]);
        model.repeat("again");
        let opts = GenerationOptions::default();
        let msgs = [ChatMessage::user("prompt text")];

        assert_eq!(model.complete(&msgs, &opts).await.unwrap().text, "one");
        assert_eq!(model.complete(&msgs, &opts).await.unwrap().text, "two");
        assert_eq!(model.complete(&msgs, &opts).await.unwrap().text, "again");
        assert_eq!(model.calls(), 3);
        assert_eq!(model.last_prompt().unwrap()[0].content, "prompt text");
    }

    #[tokio::test]
    async fn exhausted_script_is_fatal() {
        let model = ScriptedModel::new();
        let err = model
            .complete(&[ChatMessage::user("x")], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
