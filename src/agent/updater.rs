//! The State Updater: rewrites the structured state after every action.

use std::sync::Arc;

use minijinja::context;
use tracing::{debug, warn};

use super::AgentError;
use crate::env::EnvKind;
use crate::model::{
    complete_with_retry, ChatMessage, GenerationOptions, LanguageModel, PromptFamily, PromptKey,
    PromptLibrary, PromptRole, RetryPolicy, TokenUsage,
};
use crate::state::{parse_patch, parse_plan, GoalState, StateBounds, StructuredState};

/// Result of one Updater call.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub state: StructuredState,
    pub usage: TokenUsage,
    /// The state is a fallback rather than the model's revision.
    pub degraded: bool,
}

pub struct StateUpdater<M> {
    model: Arc<M>,
    prompts: Arc<PromptLibrary>,
    env: EnvKind,
    plan_options: GenerationOptions,
    update_options: GenerationOptions,
    retry: RetryPolicy,
    bounds: StateBounds,
}

impl<M: LanguageModel> StateUpdater<M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Arc<M>,
        prompts: Arc<PromptLibrary>,
        env: EnvKind,
        plan_options: GenerationOptions,
        update_options: GenerationOptions,
        retry: RetryPolicy,
        bounds: StateBounds,
    ) -> Self {
        Self {
            model,
            prompts,
            env,
            plan_options,
            update_options,
            retry,
            bounds,
        }
    }

    fn key(&self, role: PromptRole) -> PromptKey {
        PromptKey::new(self.env, PromptFamily::ZipAct, role)
    }

    /// `S_0` for `instruction`, without asking the model.
    pub fn empty(&self, instruction: &str) -> StructuredState {
        StructuredState::new(instruction, self.bounds)
    }

    /// `S_0` with a model-proposed sub-goal plan. Falls back to the unplanned
    /// state on parse failure or retry exhaustion.
    pub async fn initialize(&self, instruction: &str) -> Result<StateUpdate, AgentError> {
        let prompt = self
            .prompts
            .render(self.key(PromptRole::Init), context! { instruction })?;
        let messages = [ChatMessage::user(prompt)];

        let mut state = self.empty(instruction);
        let completion =
            match complete_with_retry(&*self.model, &messages, &self.plan_options, &self.retry)
                .await
            {
                Ok(c) => c,
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "planning call failed, starting without sub-goals");
                    return Ok(StateUpdate {
                        state,
                        usage: TokenUsage::default(),
                        degraded: true,
                    });
                }
                Err(err) => return Err(err.into()),
            };

        let degraded = match parse_plan(&completion.text) {
            Ok(plan) => {
                state.goal = GoalState::planned(
                    instruction,
                    plan.current_objective.as_deref(),
                    &plan.sub_goals,
                );
                debug!(sub_goals = plan.sub_goals.len(), "initial plan parsed");
                false
            }
            Err(err) => {
                warn!(error = %err, "unparseable plan, starting without sub-goals");
                true
            }
        };
        Ok(StateUpdate {
            state,
            usage: completion.usage.into(),
            degraded,
        })
    }

    /// `S_next` from `prev`, the last action and its observation.
    ///
    /// Retry exhaustion returns `prev` unchanged; an unparseable reply returns
    /// `prev` plus a parse-failure constraint. Only fatal model errors and
    /// template errors surface as `Err`.
    pub async fn update(
        &self,
        prev: &StructuredState,
        last_action: &str,
        observation: &str,
        task: &str,
    ) -> Result<StateUpdate, AgentError> {
        let system = self.prompts.render(
            self.key(PromptRole::Updater),
            context! { actions => self.prompts.actions(self.env) },
        )?;
        let user = self.prompts.render(
            self.key(PromptRole::UpdateStep),
            context! {
                task,
                state => prev.to_prompt_json(),
                constraints => prev.constraints.summarize(),
                action => last_action,
                observation,
            },
        )?;
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];

        let completion =
            match complete_with_retry(&*self.model, &messages, &self.update_options, &self.retry)
                .await
            {
                Ok(c) => c,
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "state update failed, keeping previous state");
                    return Ok(StateUpdate {
                        state: prev.clone(),
                        usage: TokenUsage::default(),
                        degraded: true,
                    });
                }
                Err(err) => return Err(err.into()),
            };

        let usage = TokenUsage::from(completion.usage);
        match parse_patch(&completion.text) {
            Ok(patch) => Ok(StateUpdate {
                state: prev.apply(&patch, last_action, observation),
                usage,
                degraded: false,
            }),
            Err(err) => {
                warn!(error = %err, "unparseable state patch, keeping previous state");
                Ok(StateUpdate {
                    state: prev.with_parse_failure(),
                    usage,
                    degraded: true,
                })
            }
        }
    }
}
