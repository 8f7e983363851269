//! Language-model access for every agent variant.
//!
//! This module provides:
//! - [`api::LanguageModel`] -- the capability agents are generic over, and
//!   [`api::LlmClient`], its OpenAI-compatible HTTP implementation.
//! - [`error::LlmError`] -- typed failures classified as transient or fatal.
//! - [`retry`] -- bounded exponential backoff for transient failures.
//! - [`prompt`] -- the template library keyed by environment, family and role.

pub mod api;
pub mod error;
pub mod prompt;
pub mod retry;

#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

pub use api::{
    prompt_chars, ChatMessage, ChatResponse, Choice, Completion, GenerationOptions,
    LanguageModel, LlmClient, TokenUsage, Usage,
};
pub use error::{ErrorKind, LlmError};
pub use prompt::{PromptError, PromptFamily, PromptKey, PromptLibrary, PromptRole};
pub use retry::{complete_with_retry, RetryPolicy};
