//! Bounded exponential backoff for model calls.
//!
//! Only [`ErrorKind::Transient`](super::error::ErrorKind) failures are retried;
//! fatal failures are returned on the first attempt.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::api::{ChatMessage, Completion, GenerationOptions, LanguageModel};
use super::error::LlmError;

/// Retry schedule applied at every model call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one (default: 4).
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 500).
    pub base_delay_ms: u64,
    /// Upper bound for any single delay in milliseconds (default: 8000).
    pub max_delay_ms: u64,
    /// Scale each delay by a random factor in `[0.5, 1.0]` (default: true).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_attempts - 1` times without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let raw = self.base_delay_ms.saturating_mul(1u64 << exp);
        let capped = raw.min(self.max_delay_ms);
        let millis = if self.jitter && capped > 0 {
            let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
            (capped as f64 * factor) as u64
        } else {
            capped
        };
        Duration::from_millis(millis)
    }
}

/// Call `model.complete` under `policy`.
///
/// Returns the last transient error once the attempt budget is spent.
pub async fn complete_with_retry<M: LanguageModel>(
    model: &M,
    messages: &[ChatMessage],
    options: &GenerationOptions,
    policy: &RetryPolicy,
) -> Result<Completion, LlmError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match model.complete(messages, options).await {
            Ok(completion) => return Ok(completion),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                debug!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient model error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(attempts, error = %err, "model retries exhausted");
                }
                return Err(err);
            }
        }
    }
}
