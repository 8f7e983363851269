//! Reflexion: ReAct plus self-critiques written after failed episodes and
//! carried into later ones.

use minijinja::context;
use tracing::{info, warn};

use super::history::{HistoryCore, Transcript};
use super::{Agent, AgentContext, AgentError, AgentKind, Decision, EpisodeOutcome};
use crate::env::EnvObservation;
use crate::model::{
    complete_with_retry, ChatMessage, GenerationOptions, LanguageModel, PromptRole, TokenUsage,
};

/// Characters kept from each end of a long transcript in the critique prompt.
const TRANSCRIPT_EDGE_CHARS: usize = 500;

fn head_tail(text: &str, edge: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= edge * 2 {
        return text.to_string();
    }
    let head: String = chars[..edge].iter().collect();
    let tail: String = chars[chars.len() - edge..].iter().collect();
    format!("{head}\n...\n{tail}")
}

pub struct ReflexionAgent<M> {
    core: HistoryCore<M>,
    reflection_options: GenerationOptions,
    /// Survives `reset`. Holds at most `window` entries.
    reflections: Vec<String>,
    window: usize,
}

impl<M: LanguageModel> ReflexionAgent<M> {
    pub fn new(ctx: AgentContext<M>) -> Self {
        Self {
            reflection_options: ctx.generation.reflection.clone(),
            reflections: Vec::new(),
            window: ctx.settings.reflection_window,
            core: HistoryCore::new(&ctx),
        }
    }

    pub fn reflections(&self) -> &[String] {
        &self.reflections
    }

    pub fn transcript(&self) -> &Transcript {
        &self.core.transcript
    }

    fn recent_reflections(&self) -> &[String] {
        let start = self.reflections.len().saturating_sub(self.window);
        &self.reflections[start..]
    }

    /// Ask for a critique of the finished episode. Transient failures skip
    /// the reflection.
    async fn reflect(&mut self, reason: &str) -> Result<TokenUsage, AgentError> {
        let transcript = head_tail(&self.core.transcript.render(), TRANSCRIPT_EDGE_CHARS);
        let prompt = self.core.prompts.render(
            self.core.key(PromptRole::Reflection),
            context! { task => &self.core.task, transcript, reason },
        )?;
        let messages = [ChatMessage::user(prompt)];

        let completion = match complete_with_retry(
            &*self.core.model,
            &messages,
            &self.reflection_options,
            &self.core.retry,
        )
        .await
        {
            Ok(c) => c,
            Err(err) if err.is_transient() => {
                warn!(error = %err, "reflection call failed, skipping");
                return Ok(TokenUsage::default());
            }
            Err(err) => return Err(err.into()),
        };

        let reflection = completion.text.trim();
        if !reflection.is_empty() {
            info!(reflection = %reflection, "recorded reflection");
            self.reflections.push(reflection.to_string());
            let excess = self.reflections.len().saturating_sub(self.window);
            self.reflections.drain(..excess);
        }
        Ok(completion.usage.into())
    }
}

impl<M: LanguageModel> Agent for ReflexionAgent<M> {
    fn kind(&self) -> AgentKind {
        AgentKind::Reflexion
    }

    async fn reset(&mut self, instruction: &str) -> Result<(), AgentError> {
        self.core.reset(instruction)
    }

    async fn step(&mut self, observation: &EnvObservation) -> Result<Decision, AgentError> {
        self.core.counters.check_step()?;
        let history = self.core.transcript.render();
        let decision = self
            .core
            .decide(&history, self.recent_reflections(), observation)
            .await?;
        self.core.commit(None, observation, &decision);
        Ok(decision)
    }

    async fn finish(&mut self, outcome: &EpisodeOutcome) -> Result<(), AgentError> {
        let usage = match outcome {
            EpisodeOutcome::Failure { reason } if !self.core.transcript.is_empty() => {
                self.reflect(reason).await?
            }
            _ => TokenUsage::default(),
        };
        self.core.counters.terminate(usage);
        Ok(())
    }

    fn step_count(&self) -> usize {
        self.core.counters.steps()
    }

    fn usage(&self) -> TokenUsage {
        self.core.counters.usage()
    }
}
