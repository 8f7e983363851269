//! The Actor: picks the next action from the structured state and the latest
//! observation only.

use std::sync::Arc;

use minijinja::context;
use tracing::{debug, warn};

use super::parse::{fallback_action, parse_action, resolve_admissible, ActionParseError};
use super::{AgentError, Decision};
use crate::env::{EnvKind, EnvObservation};
use crate::model::{
    complete_with_retry, prompt_chars, ChatMessage, GenerationOptions, LanguageModel,
    PromptFamily, PromptKey, PromptLibrary, PromptRole, RetryPolicy, TokenUsage,
};
use crate::state::StructuredState;

pub struct Actor<M> {
    model: Arc<M>,
    prompts: Arc<PromptLibrary>,
    env: EnvKind,
    options: GenerationOptions,
    retry: RetryPolicy,
    fallback_action: String,
}

impl<M: LanguageModel> Actor<M> {
    pub fn new(
        model: Arc<M>,
        prompts: Arc<PromptLibrary>,
        env: EnvKind,
        options: GenerationOptions,
        retry: RetryPolicy,
        fallback_action: String,
    ) -> Self {
        Self {
            model,
            prompts,
            env,
            options,
            retry,
            fallback_action,
        }
    }

    fn key(&self, role: PromptRole) -> PromptKey {
        PromptKey::new(self.env, PromptFamily::ZipAct, role)
    }

    fn fallback(
        &self,
        observation: &EnvObservation,
        thought: &str,
        usage: TokenUsage,
        prompt_chars: usize,
    ) -> Decision {
        Decision {
            action: fallback_action(
                &self.fallback_action,
                observation.admissible_actions.as_deref(),
            ),
            thought: thought.to_string(),
            degraded: true,
            usage,
            prompt_chars,
        }
    }

    /// Extract an action that is admissible and not a known failure.
    fn validate(
        state: &StructuredState,
        observation: &EnvObservation,
        reply: &str,
    ) -> Result<(String, String), ActionParseError> {
        let (thought, action) = parse_action(reply)?;
        let action = resolve_admissible(&action, observation.admissible_actions.as_deref())?;
        if state.constraints.is_known_failure(&action) {
            return Err(ActionParseError::KnownFailure(action));
        }
        Ok((thought, action))
    }

    /// Choose the next action. Never touches `state`.
    ///
    /// An unusable reply gets one corrective follow-up; after that, or when
    /// retries are exhausted, the fallback action is returned as a degraded
    /// decision.
    pub async fn decide(
        &self,
        state: &StructuredState,
        observation: &EnvObservation,
        task: &str,
    ) -> Result<Decision, AgentError> {
        let system = self.prompts.render(
            self.key(PromptRole::Actor),
            context! { actions => self.prompts.actions(self.env) },
        )?;
        let user = self.prompts.render(
            self.key(PromptRole::ActStep),
            context! {
                task,
                state => state.to_prompt_json(),
                constraints => state.constraints.summarize(),
                observation => &observation.text,
                admissible => &observation.admissible_actions,
            },
        )?;
        let mut messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let chars = prompt_chars(&messages);
        let mut usage = TokenUsage::default();

        let first = match complete_with_retry(&*self.model, &messages, &self.options, &self.retry)
            .await
        {
            Ok(c) => c,
            Err(err) if err.is_transient() => {
                warn!(error = %err, fallback = %self.fallback_action, "actor call failed, using fallback");
                return Ok(self.fallback(observation, "", usage, chars));
            }
            Err(err) => return Err(err.into()),
        };
        usage += first.usage;

        let error = match Self::validate(state, observation, &first.text) {
            Ok((thought, action)) => {
                debug!(action = %action, "actor chose action");
                return Ok(Decision {
                    action,
                    thought,
                    degraded: false,
                    usage,
                    prompt_chars: chars,
                });
            }
            Err(err) => err,
        };

        warn!(error = %error, "unusable actor reply, asking for a correction");
        let correction = self.prompts.render(
            self.key(PromptRole::Correction),
            context! {
                error => error.to_string(),
                admissible => &observation.admissible_actions,
            },
        )?;
        messages.push(ChatMessage::assistant(first.text));
        messages.push(ChatMessage::user(correction));

        let second = match complete_with_retry(&*self.model, &messages, &self.options, &self.retry)
            .await
        {
            Ok(c) => c,
            Err(err) if err.is_transient() => {
                warn!(error = %err, fallback = %self.fallback_action, "correction call failed, using fallback");
                return Ok(self.fallback(observation, "", usage, chars));
            }
            Err(err) => return Err(err.into()),
        };
        usage += second.usage;

        match Self::validate(state, observation, &second.text) {
            Ok((thought, action)) => Ok(Decision {
                action,
                thought,
                degraded: false,
                usage,
                prompt_chars: chars,
            }),
            Err(err) => {
                warn!(error = %err, fallback = %self.fallback_action, "corrected reply still unusable, using fallback");
                Ok(self.fallback(observation, &second.text, usage, chars))
            }
        }
    }
}
