//! The state-dependent agent.
//!
//! Each step runs the State Updater on the previous action's outcome, then the
//! Actor on the revised state. The model never sees the transcript, so the
//! prompt size depends on the state bounds rather than the episode length.

use tracing::{debug, info};

use super::actor::Actor;
use super::updater::StateUpdater;
use super::{Agent, AgentContext, AgentError, AgentKind, Decision, EpisodeCounters, EpisodeOutcome};
use crate::env::EnvObservation;
use crate::model::{LanguageModel, TokenUsage};
use crate::state::StructuredState;

pub struct ZipActAgent<M> {
    updater: StateUpdater<M>,
    actor: Actor<M>,
    plan_on_reset: bool,
    counters: EpisodeCounters,
    task: String,
    state: Option<StructuredState>,
    last_action: Option<String>,
}

impl<M: LanguageModel> ZipActAgent<M> {
    pub fn new(ctx: AgentContext<M>) -> Self {
        let settings = &ctx.settings;
        let updater = StateUpdater::new(
            ctx.model.clone(),
            ctx.prompts.clone(),
            ctx.env,
            ctx.generation.init.clone(),
            ctx.generation.updater.clone(),
            ctx.retry.clone(),
            settings.state_bounds(),
        );
        let actor = Actor::new(
            ctx.model.clone(),
            ctx.prompts.clone(),
            ctx.env,
            ctx.generation.actor.clone(),
            ctx.retry.clone(),
            settings.fallback_for(ctx.env),
        );
        Self {
            updater,
            actor,
            plan_on_reset: settings.plan_on_reset,
            counters: EpisodeCounters::new(settings.max_steps),
            task: String::new(),
            state: None,
            last_action: None,
        }
    }

    /// The live structured state, once reset.
    pub fn state(&self) -> Option<&StructuredState> {
        self.state.as_ref()
    }

    pub fn task(&self) -> &str {
        &self.task
    }
}

impl<M: LanguageModel> Agent for ZipActAgent<M> {
    fn kind(&self) -> AgentKind {
        AgentKind::ZipAct
    }

    async fn reset(&mut self, instruction: &str) -> Result<(), AgentError> {
        self.counters.check_reset()?;

        let (state, usage) = if self.plan_on_reset {
            let init = self.updater.initialize(instruction).await?;
            (init.state, init.usage)
        } else {
            (self.updater.empty(instruction), TokenUsage::default())
        };

        info!(
            task = %instruction,
            sub_goals = state.goal.sub_goals().count(),
            "zipact episode started"
        );
        self.task = instruction.trim().to_string();
        self.state = Some(state);
        self.last_action = None;
        self.counters.begin(usage);
        Ok(())
    }

    async fn step(&mut self, observation: &EnvObservation) -> Result<Decision, AgentError> {
        self.counters.check_step()?;
        let current = self.state.as_ref().ok_or(AgentError::NotReset)?;

        let mut usage = TokenUsage::default();
        let mut degraded = false;
        let next = match &self.last_action {
            Some(action) => {
                let update = self
                    .updater
                    .update(current, action, &observation.text, &self.task)
                    .await?;
                usage += update.usage;
                degraded |= update.degraded;
                update.state
            }
            None => current.clone(),
        };

        let mut decision = self.actor.decide(&next, observation, &self.task).await?;
        decision.usage += usage;
        decision.degraded |= degraded;

        debug!(
            step = self.counters.steps(),
            state = %next.to_prompt_json(),
            constraints = %next.constraints.summarize(),
            thought = %decision.thought,
            "zipact state after update"
        );

        self.state = Some(next);
        self.last_action = Some(decision.action.clone());
        self.counters.commit(decision.usage);
        Ok(decision)
    }

    async fn finish(&mut self, _outcome: &EpisodeOutcome) -> Result<(), AgentError> {
        self.counters.terminate(TokenUsage::default());
        Ok(())
    }

    fn step_count(&self) -> usize {
        self.counters.steps()
    }

    fn usage(&self) -> TokenUsage {
        self.counters.usage()
    }
}
