//! Periodic summary: every `summary_interval` steps the transcript so far is
//! replaced by one model-written summary.

use minijinja::context;
use tracing::{info, warn};

use super::history::{HistoryCore, Transcript};
use super::{Agent, AgentContext, AgentError, AgentKind, Decision, EpisodeOutcome};
use crate::env::EnvObservation;
use crate::model::{
    complete_with_retry, ChatMessage, GenerationOptions, LanguageModel, PromptRole, TokenUsage,
};

pub struct SummaryAgent<M> {
    core: HistoryCore<M>,
    summary_options: GenerationOptions,
    interval: usize,
}

impl<M: LanguageModel> SummaryAgent<M> {
    pub fn new(ctx: AgentContext<M>) -> Self {
        Self {
            summary_options: ctx.generation.summary.clone(),
            interval: ctx.settings.summary_interval.max(1),
            core: HistoryCore::new(&ctx),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.core.transcript
    }

    /// A compacted copy of the transcript, or `None` when compaction is not
    /// due or the summary call failed transiently.
    async fn compacted(&self) -> Result<(Option<Transcript>, TokenUsage), AgentError> {
        if self.core.transcript.entries_since_summary() < self.interval {
            return Ok((None, TokenUsage::default()));
        }
        let prompt = self.core.prompts.render(
            self.core.key(PromptRole::Summary),
            context! { task => &self.core.task, history => self.core.transcript.render() },
        )?;
        let messages = [ChatMessage::user(prompt)];

        let completion = match complete_with_retry(
            &*self.core.model,
            &messages,
            &self.summary_options,
            &self.core.retry,
        )
        .await
        {
            Ok(c) => c,
            Err(err) if err.is_transient() => {
                warn!(error = %err, "summary call failed, keeping the full transcript");
                return Ok((None, TokenUsage::default()));
            }
            Err(err) => return Err(err.into()),
        };

        let usage = TokenUsage::from(completion.usage);
        let summary = completion.text.trim();
        if summary.is_empty() {
            warn!("empty summary, keeping the full transcript");
            return Ok((None, usage));
        }
        info!(
            entries = self.core.transcript.len(),
            summary_chars = summary.len(),
            "compacted transcript"
        );
        let mut transcript = self.core.transcript.clone();
        transcript.compact(summary);
        Ok((Some(transcript), usage))
    }
}

impl<M: LanguageModel> Agent for SummaryAgent<M> {
    fn kind(&self) -> AgentKind {
        AgentKind::Summary
    }

    async fn reset(&mut self, instruction: &str) -> Result<(), AgentError> {
        self.core.reset(instruction)
    }

    async fn step(&mut self, observation: &EnvObservation) -> Result<Decision, AgentError> {
        self.core.counters.check_step()?;
        let (compacted, summary_usage) = self.compacted().await?;
        let history = compacted
            .as_ref()
            .unwrap_or(&self.core.transcript)
            .render();
        let mut decision = self.core.decide(&history, &[], observation).await?;
        decision.usage += summary_usage;
        self.core.commit(compacted, observation, &decision);
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
    use crate::agent::history::TranscriptItem;
    use crate::agent::tests::context;
    use crate::model::scripted::ScriptedModel;
    use crate::model::LlmError;

    fn agent(model: &ScriptedModel, interval: usize) -> SummaryAgent<ScriptedModel> {
        let mut ctx = context(model);
        ctx.settings.summary_interval = interval;
        SummaryAgent::new(ctx)
    }

    #[tokio::test]
    async fn compacts_every_interval() {
        let model = ScriptedModel::with_replies([
            "Action: go to cabinet 1",
            "Action: go to cabinet 2",
            "Checked cabinets 1 and 2, both empty.",
            "Action: go to countertop 1",
        ]);
        let mut agent = agent(&model, 2);
        agent.reset("find a mug").await.unwrap();
        for obs in ["You are in a room.", "Cabinet 1 is empty.", "Cabinet 2 is empty."] {
            agent.step(&EnvObservation::text(obs)).await.unwrap();
        }

        let items = agent.transcript().items();
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], TranscriptItem::Summary(s) if s.contains("both empty")));
        let user = &model.last_prompt().unwrap()[1].content;
        assert!(user.contains("both empty"));
        assert!(!user.contains("Cabinet 1 is empty."));
    }

    #[tokio::test]
    async fn failed_summary_keeps_transcript() {
        let model = ScriptedModel::with_replies(["Action: look", "Action: look"]);
        model.push_error(LlmError::Timeout {
            message: "slow".into(),
        });
        model.push_error(LlmError::Timeout {
            message: "slow".into(),
        });
        model.push_response("Action: look");
        let mut agent = agent(&model, 2);
        agent.reset("find a mug").await.unwrap();
        for _ in 0..3 {
            agent.step(&EnvObservation::text("You are in a room.")).await.unwrap();
        }
        assert_eq!(agent.transcript().len(), 3);
        assert_eq!(agent.transcript().entries_since_summary(), 3);
    }

    #[tokio::test]
    async fn fatal_error_after_summary_commits_nothing() {
        let model = ScriptedModel::with_replies([
            "Action: look",
            "Action: look",
            "Looked around twice.",
        ]);
        model.push_error(LlmError::Auth {
            status: 401,
            message: "revoked".into(),
        });
        let mut agent = agent(&model, 2);
        agent.reset("find a mug").await.unwrap();
        for _ in 0..2 {
            agent.step(&EnvObservation::text("You are in a room.")).await.unwrap();
        }
        let before = agent.transcript().clone();
        assert!(agent.step(&EnvObservation::text("You are in a room.")).await.is_err());
        assert_eq!(agent.transcript(), &before);
        assert_eq!(agent.step_count(), 2);
    }
}
