//! ReAct: the whole transcript goes into every prompt.

use super::history::{HistoryCore, Transcript};
use super::{Agent, AgentContext, AgentError, AgentKind, Decision, EpisodeOutcome};
use crate::env::EnvObservation;
use crate::model::{LanguageModel, TokenUsage};

pub struct ReactAgent<M> {
    core: HistoryCore<M>,
}

impl<M: LanguageModel> ReactAgent<M> {
    pub fn new(ctx: AgentContext<M>) -> Self {
        Self {
            core: HistoryCore::new(&ctx),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.core.transcript
    }
}

impl<M: LanguageModel> Agent for ReactAgent<M> {
    fn kind(&self) -> AgentKind {
        AgentKind::React
    }

    async fn reset(&mut self, instruction: &str) -> Result<(), AgentError> {
        self.core.reset(instruction)
    }

    async fn step(&mut self, observation: &EnvObservation) -> Result<Decision, AgentError> {
        self.core.counters.check_step()?;
        let history = self.core.transcript.render();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::context;
    use crate::model::scripted::ScriptedModel;

    #[tokio::test]
    async fn prompt_grows_with_every_step() {
        let model = ScriptedModel::new();
        model.repeat("Thought: keep searching.\nAction: go to cabinet 1");
        let mut agent = ReactAgent::new(context(&model));
        agent.reset("find a mug").await.unwrap();

        let mut sizes = Vec::new();
        for i in 0..5 {
            let decision = agent
                .step(&EnvObservation::text(format!("You see cabinet {i}.")))
                .await
                .unwrap();
            sizes.push(decision.prompt_chars);
        }
        assert!(sizes.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(agent.transcript().len(), 5);
        assert_eq!(agent.step_count(), 5);
    }

    #[tokio::test]
    async fn malformed_reply_falls_back() {
        let model = ScriptedModel::with_replies(["no idea"]);
        let mut agent = ReactAgent::new(context(&model));
        agent.reset("find a mug").await.unwrap();
        let decision = agent.step(&EnvObservation::text("You are in a room.")).await.unwrap();
        assert_eq!(decision.action, "look");
        assert!(decision.degraded);
        assert_eq!(agent.step_count(), 1);
    }

    #[tokio::test]
    async fn reset_clears_transcript() {
        let model = ScriptedModel::new();
        model.repeat("Action: look");
        let mut agent = ReactAgent::new(context(&model));
        agent.reset("find a mug").await.unwrap();
        agent.step(&EnvObservation::text("You are in a room.")).await.unwrap();
        agent
            .finish(&EpisodeOutcome::Failure {
                reason: "step budget".into(),
            })
            .await
            .unwrap();
        agent.reset("find a pen").await.unwrap();
        assert!(agent.transcript().is_empty());
        assert_eq!(agent.step_count(), 0);
    }
}
