//! Observation masking: only the most recent transcript entries are shown.

use super::history::{HistoryCore, Transcript};
use super::{Agent, AgentContext, AgentError, AgentKind, Decision, EpisodeOutcome};
use crate::env::EnvObservation;
use crate::model::{LanguageModel, TokenUsage};

pub struct MaskingAgent<M> {
    core: HistoryCore<M>,
    keep_recent: usize,
}

impl<M: LanguageModel> MaskingAgent<M> {
    pub fn new(ctx: AgentContext<M>) -> Self {
        Self {
            keep_recent: ctx.settings.keep_recent.max(1),
            core: HistoryCore::new(&ctx),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.core.transcript
    }
}

impl<M: LanguageModel> Agent for MaskingAgent<M> {
    fn kind(&self) -> AgentKind {
        AgentKind::ObsMask
    }

    async fn reset(&mut self, instruction: &str) -> Result<(), AgentError> {
        self.core.reset(instruction)
    }

    async fn step(&mut self, observation: &EnvObservation) -> Result<Decision, AgentError> {
        self.core.counters.check_step()?;
        let history = self.core.transcript.render_recent(self.keep_recent);
        let decision = self.core.decide(&history, &[], observation).await?;
        self.core.commit(None, observation, &decision);
        Ok(decision)
    }

    async fn finish(&mut self, _outcome: &EpisodeOutcome) -> Result<(), AgentError> {
        self.core.counters.terminate(TokenUsage::default());
        Ok(())
    }

    fn step_count(&self) -> usize {
        self.core.counters.steps()
    }

    fn usage(&self) -> TokenUsage {
        self.core.counters.usage()
    }
}
