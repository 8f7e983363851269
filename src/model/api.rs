//! OpenAI-compatible LLM API client.
//!
//! Provides typed request/response structures, the [`LanguageModel`] trait the
//! agents are written against, and [`LlmClient`], the HTTP implementation of
//! that trait for any `/chat/completions` endpoint.

use std::ops::AddAssign;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::LlmError;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author: `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// The textual content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Convenience constructor for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Convenience constructor for an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Total character count of a prompt. Used as a provider-independent measure
/// of context size.
pub fn prompt_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.content.chars().count()).sum()
}

/// Token usage statistics for a request, as reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens generated in the completion.
    pub completion_tokens: u64,
    /// Total tokens (prompt + completion).
    pub total_tokens: u64,
}

/// Cumulative token accounting for a step or an episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn is_zero(&self) -> bool {
        self.total_tokens == 0 && self.input_tokens == 0 && self.output_tokens == 0
    }
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        // Some providers omit total_tokens.
        let total = usage
            .total_tokens
            .max(usage.prompt_tokens + usage.completion_tokens);
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: total,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

impl AddAssign<Usage> for TokenUsage {
    fn add_assign(&mut self, rhs: Usage) {
        *self += TokenUsage::from(rhs);
    }
}

/// A single completion choice returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Zero-based index of this choice within the response.
    pub index: usize,
    /// The generated message.
    pub message: ChatMessage,
    /// The reason the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// A chat completion response from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Unique identifier for this completion.
    #[serde(default)]
    pub id: String,
    /// The list of generated choices.
    pub choices: Vec<Choice>,
    /// Token usage statistics.
    #[serde(default)]
    pub usage: Usage,
}

/// Sampling options for a single call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl GenerationOptions {
    pub fn new(temperature: f64, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
            stop: None,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::new(0.0, 256)
    }
}

/// The generated text of the first choice plus the usage of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// Model trait
// ---------------------------------------------------------------------------

/// The capability every agent variant needs from a language model.
#[allow(async_fn_in_trait)]
pub trait LanguageModel: Send + Sync {
    /// Identifier of the underlying model, recorded in experiment summaries.
    fn model_id(&self) -> &str;

    /// Generate a completion for `messages`.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<Completion, LlmError>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct LlmClient {
    /// The base URL for API requests (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// The API key used for bearer authentication.
    api_key: String,
    /// Model sent with every request.
    model_id: String,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client pointing at `base_url` (e.g. `"https://api.openai.com/v1"`).
    ///
    /// Fails with [`LlmError::Config`] when no API key is available.
    pub fn new(
        base_url: &str,
        api_key: &str,
        model_id: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Config {
                message: "no API key configured (set OPENAI_API_KEY or model.api_key)".into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            api_base: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model_id: model_id.to_string(),
            http,
        })
    }

    /// Send a chat completion request and return the parsed response.
    ///
    /// Calls `POST {base_url}/chat/completions`.
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(
            model = %self.model_id,
            temperature = options.temperature,
            max_tokens = options.max_tokens,
            messages = messages.len(),
            "sending chat completion request"
        );

        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if let Some(stop) = &options.stop {
            body["stop"] = serde_json::json!(stop);
        }

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), text));
        }

        let chat_response: ChatResponse = resp.json().await.map_err(|e| LlmError::Decode {
            message: e.to_string(),
        })?;

        info!(
            model = %self.model_id,
            prompt_tokens = chat_response.usage.prompt_tokens,
            completion_tokens = chat_response.usage.completion_tokens,
            "chat completion succeeded"
        );

        Ok(chat_response)
    }
}

impl LanguageModel for LlmClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<Completion, LlmError> {
        let response = self.chat_completion(messages, options).await?;
        let text = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(Completion {
            text,
            usage: response.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are helpful.");
        assert_eq!(sys.role, "system");
        assert_eq!(sys.content, "You are helpful.");

        let usr = ChatMessage::user("Hello");
        assert_eq!(usr.role, "user");

        let asst = ChatMessage::assistant("Hi there");
        assert_eq!(asst.role, "assistant");
    }

    #[test]
    fn test_chat_response_without_usage_defaults_to_zero() {
        let json = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"look"},"finish_reason":"stop"}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "look");
        assert_eq!(parsed.usage, Usage::default());
    }

    #[test]
    fn test_token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total += Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        total += Usage {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 0,
        };
        assert_eq!(total.input_tokens, 13);
        assert_eq!(total.output_tokens, 7);
        assert_eq!(total.total_tokens, 20);
    }

    #[test]
    fn test_client_requires_api_key() {
        let err = LlmClient::new("http://localhost:8000/v1", "", "gpt-4o-mini", Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, LlmError::Config { .. }));
    }

    #[test]
    fn test_prompt_chars_counts_all_messages() {
        let messages = vec![ChatMessage::system("abc"), ChatMessage::user("de")];
        assert_eq!(prompt_chars(&messages), 5);
    }
}
