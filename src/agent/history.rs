//! Transcript memory shared by the history-dependent baselines.

use std::sync::Arc;

use minijinja::context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::parse::{fallback_action, parse_action, resolve_admissible};
use super::{AgentContext, AgentError, Decision, EpisodeCounters};
use crate::env::{EnvKind, EnvObservation};
use crate::model::{
    complete_with_retry, prompt_chars, ChatMessage, GenerationOptions, LanguageModel,
    PromptFamily, PromptKey, PromptLibrary, PromptRole, RetryPolicy, TokenUsage,
};

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// One observation/action exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub step_index: usize,
    pub observation: String,
    pub thought: String,
    pub action: String,
    pub reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TranscriptItem {
    Step(TranscriptEntry),
    /// Model-written stand-in for every item before it.
    Summary(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    items: Vec<TranscriptItem>,
}

impl Transcript {
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.items.push(TranscriptItem::Step(entry));
    }

    /// Replace everything recorded so far with one summary item.
    pub fn compact(&mut self, summary: &str) {
        self.items = vec![TranscriptItem::Summary(summary.trim().to_string())];
    }

    pub fn items(&self) -> &[TranscriptItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Step entries recorded after the latest summary.
    pub fn entries_since_summary(&self) -> usize {
        self.items
            .iter()
            .rev()
            .take_while(|item| matches!(item, TranscriptItem::Step(_)))
            .count()
    }

    fn render_item(item: &TranscriptItem) -> String {
        match item {
            TranscriptItem::Step(entry) => {
                let mut text = format!(
                    "Step {}:\nObservation: {}\n",
                    entry.step_index + 1,
                    entry.observation.trim()
                );
                if !entry.thought.is_empty() {
                    text.push_str(&format!("Thought: {}\n", entry.thought));
                }
                text.push_str(&format!("Action: {}", entry.action));
                text
            }
            TranscriptItem::Summary(summary) => format!("Summary of earlier steps: {summary}"),
        }
    }

    /// Every item, oldest first.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "(no steps yet)".to_string();
        }
        self.items
            .iter()
            .map(Self::render_item)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Only the last `keep` items, with a note counting the omitted ones.
    pub fn render_recent(&self, keep: usize) -> String {
        let omitted = self.items.len().saturating_sub(keep);
        if omitted == 0 {
            return self.render();
        }
        let mut parts = vec![format!("({omitted} earlier steps omitted)")];
        parts.extend(self.items[omitted..].iter().map(Self::render_item));
        parts.join("\n\n")
    }
}

// ---------------------------------------------------------------------------
// Shared baseline machinery
// ---------------------------------------------------------------------------

/// Model access, episode bookkeeping and the transcript of one baseline agent.
pub(crate) struct HistoryCore<M> {
    pub(crate) model: Arc<M>,
    pub(crate) prompts: Arc<PromptLibrary>,
    pub(crate) env: EnvKind,
    pub(crate) options: GenerationOptions,
    pub(crate) retry: RetryPolicy,
    pub(crate) fallback_action: String,
    pub(crate) counters: EpisodeCounters,
    pub(crate) task: String,
    pub(crate) transcript: Transcript,
}

impl<M: LanguageModel> HistoryCore<M> {
    pub(crate) fn new(ctx: &AgentContext<M>) -> Self {
        Self {
            model: ctx.model.clone(),
            prompts: ctx.prompts.clone(),
            env: ctx.env,
            options: ctx.generation.history.clone(),
            retry: ctx.retry.clone(),
            fallback_action: ctx.settings.fallback_for(ctx.env),
            counters: EpisodeCounters::new(ctx.settings.max_steps),
            task: String::new(),
            transcript: Transcript::default(),
        }
    }

    pub(crate) fn key(&self, role: PromptRole) -> PromptKey {
        PromptKey::new(self.env, PromptFamily::History, role)
    }

    pub(crate) fn reset(&mut self, instruction: &str) -> Result<(), AgentError> {
        self.counters.check_reset()?;
        self.task = instruction.trim().to_string();
        self.transcript = Transcript::default();
        self.counters.begin(TokenUsage::default());
        info!(task = %instruction, "episode started");
        Ok(())
    }

    /// Ask the model for an action given a rendered `history`. Unusable
    /// replies and retry exhaustion fall back without a corrective follow-up.
    pub(crate) async fn decide(
        &self,
        history: &str,
        reflections: &[String],
        observation: &EnvObservation,
    ) -> Result<Decision, AgentError> {
        let system = self.prompts.render(
            self.key(PromptRole::System),
            context! { actions => self.prompts.actions(self.env) },
        )?;
        let user = self.prompts.render(
            self.key(PromptRole::Step),
            context! {
                task => &self.task,
                reflections,
                history,
                observation => &observation.text,
                admissible => &observation.admissible_actions,
            },
        )?;
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let chars = prompt_chars(&messages);

        let fallback = |thought: String, usage: TokenUsage| Decision {
            action: fallback_action(
                &self.fallback_action,
                observation.admissible_actions.as_deref(),
            ),
            thought,
            degraded: true,
            usage,
            prompt_chars: chars,
        };

        let completion =
            match complete_with_retry(&*self.model, &messages, &self.options, &self.retry).await {
                Ok(c) => c,
                Err(err) if err.is_transient() => {
                    warn!(error = %err, fallback = %self.fallback_action, "model call failed, using fallback");
                    return Ok(fallback(String::new(), TokenUsage::default()));
                }
                Err(err) => return Err(err.into()),
            };
        let usage = TokenUsage::from(completion.usage);

        let parsed = parse_action(&completion.text).and_then(|(thought, action)| {
            resolve_admissible(&action, observation.admissible_actions.as_deref())
                .map(|action| (thought, action))
        });
        match parsed {
            Ok((thought, action)) => {
                debug!(action = %action, prompt_chars = chars, "baseline chose action");
                Ok(Decision {
                    action,
                    thought,
                    degraded: false,
                    usage,
                    prompt_chars: chars,
                })
            }
            Err(err) => {
                warn!(error = %err, fallback = %self.fallback_action, "unusable reply, using fallback");
                Ok(fallback(completion.text, usage))
            }
        }
    }

    /// Record a decided step. `transcript` replaces the current transcript
    /// first when the step rewrote it.
    pub(crate) fn commit(
        &mut self,
        transcript: Option<Transcript>,
        observation: &EnvObservation,
        decision: &Decision,
    ) {
        if let Some(transcript) = transcript {
            self.transcript = transcript;
        }
        self.transcript.push(TranscriptEntry {
            step_index: self.counters.steps(),
            observation: observation.text.clone(),
            thought: decision.thought.clone(),
            action: decision.action.clone(),
            reward: observation.reward,
        });
        self.counters.commit(decision.usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(i: usize) -> TranscriptEntry {
        TranscriptEntry {
            step_index: i,
            observation: format!("obs {i}"),
            thought: String::new(),
            action: format!("go to cabinet {i}"),
            reward: 0.0,
        }
    }

    #[test]
    fn renders_steps_in_order() {
        let mut transcript = Transcript::default();
        assert_eq!(transcript.render(), "(no steps yet)");
        transcript.push(entry(0));
        transcript.push(entry(1));
        let text = transcript.render();
        assert!(text.find("go to cabinet 0").unwrap() < text.find("go to cabinet 1").unwrap());
        assert!(text.starts_with("Step 1:"));
    }

    #[test]
    fn recent_window_notes_omissions() {
        let mut transcript = Transcript::default();
        for i in 0..7 {
            transcript.push(entry(i));
        }
        let text = transcript.render_recent(3);
        assert!(text.starts_with("(4 earlier steps omitted)"));
        assert!(!text.contains("go to cabinet 3"));
        assert!(text.contains("go to cabinet 4"));
        assert!(text.contains("go to cabinet 6"));
        assert_eq!(transcript.render_recent(10), transcript.render());
    }

    #[test]
    fn compaction_resets_the_count() {
        let mut transcript = Transcript::default();
        for i in 0..4 {
            transcript.push(entry(i));
        }
        assert_eq!(transcript.entries_since_summary(), 4);
        transcript.compact("explored cabinets 0-3");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.entries_since_summary(), 0);
        transcript.push(entry(4));
        assert_eq!(transcript.entries_since_summary(), 1);
        assert!(transcript.render().starts_with("Summary of earlier steps: explored"));
    }
}
