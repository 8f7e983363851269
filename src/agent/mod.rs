//! Agent variants and the contract they share.
//!
//! Every variant implements [`Agent`]: `reset` starts an episode, `step` turns
//! the latest observation into exactly one action, `finish` delivers the
//! terminal signal. Variants differ only in what memory they feed the model:
//!
//! - [`zipact::ZipActAgent`] -- a structured state rewritten by a State
//!   Updater and read by an Actor.
//! - [`react::ReactAgent`] -- the full transcript.
//! - [`reflexion::ReflexionAgent`] -- the full transcript plus self-critiques
//!   carried across episodes.
//! - [`masking::MaskingAgent`] -- the last N transcript entries.
//! - [`summary::SummaryAgent`] -- a model-written summary of older entries.
//!
//! Concrete variants are chosen by name through [`create_agent`].

pub mod actor;
pub mod history;
pub mod masking;
pub mod parse;
pub mod react;
pub mod reflexion;
pub mod summary;
pub mod updater;
pub mod zipact;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AgentConfig, GenerationConfig};
use crate::env::{EnvKind, EnvObservation};
use crate::model::{LanguageModel, LlmError, PromptError, PromptLibrary, RetryPolicy, TokenUsage};

pub use parse::{fallback_action, parse_action, resolve_admissible, ActionParseError};

// ---------------------------------------------------------------------------
// Contract types
// ---------------------------------------------------------------------------

/// The action chosen for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: String,
    pub thought: String,
    /// A fallback was used somewhere in the step (retry exhaustion, parse
    /// failure).
    pub degraded: bool,
    /// Usage of every model call made during the step.
    pub usage: TokenUsage,
    /// Size in characters of the action prompt.
    pub prompt_chars: usize,
}

/// How an episode ended, as reported to [`Agent::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Success,
    Failure { reason: String },
}

impl EpisodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent has not been reset for an episode")]
    NotReset,

    #[error("reset called mid-episode after {steps} steps")]
    EpisodeInProgress { steps: usize },

    #[error("step budget of {max} steps exhausted")]
    StepLimitReached { max: usize },

    #[error("model call failed: {0}")]
    Model(#[from] LlmError),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// The reset/step protocol shared by every agent variant.
#[allow(async_fn_in_trait)]
pub trait Agent: Send {
    fn kind(&self) -> AgentKind;

    /// Start a new episode for `instruction`, discarding per-episode memory.
    /// Fails with [`AgentError::EpisodeInProgress`] after a step has been
    /// taken without a terminal signal.
    async fn reset(&mut self, instruction: &str) -> Result<(), AgentError>;

    /// Choose the next action. On error the agent is left exactly as it was.
    async fn step(&mut self, observation: &EnvObservation) -> Result<Decision, AgentError>;

    /// Deliver the terminal signal.
    async fn finish(&mut self, outcome: &EpisodeOutcome) -> Result<(), AgentError>;

    /// Steps taken in the current episode.
    fn step_count(&self) -> usize;

    /// Cumulative usage of the current episode.
    fn usage(&self) -> TokenUsage;
}

// ---------------------------------------------------------------------------
// Episode bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Ready,
    Terminated,
}

/// Lifecycle, step counter and token totals every variant carries.
#[derive(Debug, Clone)]
pub(crate) struct EpisodeCounters {
    phase: Phase,
    steps: usize,
    usage: TokenUsage,
    max_steps: usize,
}

impl EpisodeCounters {
    pub(crate) fn new(max_steps: usize) -> Self {
        Self {
            phase: Phase::Uninitialized,
            steps: 0,
            usage: TokenUsage::default(),
            max_steps,
        }
    }

    pub(crate) fn check_reset(&self) -> Result<(), AgentError> {
        if self.phase == Phase::Ready && self.steps > 0 {
            return Err(AgentError::EpisodeInProgress { steps: self.steps });
        }
        Ok(())
    }

    pub(crate) fn begin(&mut self, usage: TokenUsage) {
        self.phase = Phase::Ready;
        self.steps = 0;
        self.usage = usage;
    }

    pub(crate) fn check_step(&self) -> Result<(), AgentError> {
        if self.phase != Phase::Ready {
            return Err(AgentError::NotReset);
        }
        if self.steps >= self.max_steps {
            return Err(AgentError::StepLimitReached {
                max: self.max_steps,
            });
        }
        Ok(())
    }

    pub(crate) fn commit(&mut self, usage: TokenUsage) {
        self.steps += 1;
        self.usage += usage;
    }

    pub(crate) fn terminate(&mut self, usage: TokenUsage) {
        self.phase = Phase::Terminated;
        self.usage += usage;
    }

    pub(crate) fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn usage(&self) -> TokenUsage {
        self.usage
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Everything a variant needs to be built. Shared pieces are reference
/// counted and read-only for the run.
pub struct AgentContext<M> {
    pub model: Arc<M>,
    pub prompts: Arc<PromptLibrary>,
    pub env: EnvKind,
    pub settings: AgentConfig,
    pub generation: GenerationConfig,
    pub retry: RetryPolicy,
}

impl<M> Clone for AgentContext<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            prompts: Arc::clone(&self.prompts),
            env: self.env,
            settings: self.settings.clone(),
            generation: self.generation.clone(),
            retry: self.retry.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    ZipAct,
    React,
    Reflexion,
    #[serde(alias = "observation_masking")]
    ObsMask,
    Summary,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        Self::ZipAct,
        Self::React,
        Self::Reflexion,
        Self::ObsMask,
        Self::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZipAct => "zipact",
            Self::React => "react",
            Self::Reflexion => "reflexion",
            Self::ObsMask => "obs_mask",
            Self::Summary => "summary",
        }
    }

    /// The registered constructor for this variant.
    pub fn constructor<M: LanguageModel>(self) -> Constructor<M> {
        match self {
            Self::ZipAct => |ctx| AnyAgent::ZipAct(zipact::ZipActAgent::new(ctx)),
            Self::React => |ctx| AnyAgent::React(react::ReactAgent::new(ctx)),
            Self::Reflexion => |ctx| AnyAgent::Reflexion(reflexion::ReflexionAgent::new(ctx)),
            Self::ObsMask => |ctx| AnyAgent::ObsMask(masking::MaskingAgent::new(ctx)),
            Self::Summary => |ctx| AnyAgent::Summary(summary::SummaryAgent::new(ctx)),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zipact" => Ok(Self::ZipAct),
            "react" => Ok(Self::React),
            "reflexion" => Ok(Self::Reflexion),
            "obs_mask" | "observation_masking" => Ok(Self::ObsMask),
            "summary" => Ok(Self::Summary),
            other => Err(format!(
                "unknown agent '{other}' (expected one of: zipact, react, reflexion, obs_mask, summary)"
            )),
        }
    }
}

pub type Constructor<M> = fn(AgentContext<M>) -> AnyAgent<M>;

/// Name to constructor mapping for every variant.
pub fn registry<M: LanguageModel>() -> Vec<(&'static str, Constructor<M>)> {
    AgentKind::ALL
        .iter()
        .map(|kind| (kind.as_str(), kind.constructor::<M>()))
        .collect()
}

/// Build the variant registered under `name` (aliases accepted).
pub fn create_agent<M: LanguageModel>(
    name: &str,
    ctx: AgentContext<M>,
) -> Result<AnyAgent<M>, String> {
    let kind: AgentKind = name.parse()?;
    Ok(kind.constructor()(ctx))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Enum wrapper that dispatches to the concrete variant.
pub enum AnyAgent<M: LanguageModel> {
    ZipAct(zipact::ZipActAgent<M>),
    React(react::ReactAgent<M>),
    Reflexion(reflexion::ReflexionAgent<M>),
    ObsMask(masking::MaskingAgent<M>),
    Summary(summary::SummaryAgent<M>),
}

macro_rules! dispatch {
    ($self:expr, $agent:ident => $body:expr) => {
        match $self {
            AnyAgent::ZipAct($agent) => $body,
            AnyAgent::React($agent) => $body,
            AnyAgent::Reflexion($agent) => $body,
            AnyAgent::ObsMask($agent) => $body,
            AnyAgent::Summary($agent) => $body,
        }
    };
}

impl<M: LanguageModel> Agent for AnyAgent<M> {
    fn kind(&self) -> AgentKind {
        dispatch!(self, a => a.kind())
    }

    async fn reset(&mut self, instruction: &str) -> Result<(), AgentError> {
        dispatch!(self, a => a.reset(instruction).await)
    }

    async fn step(&mut self, observation: &EnvObservation) -> Result<Decision, AgentError> {
        dispatch!(self, a => a.step(observation).await)
    }

    async fn finish(&mut self, outcome: &EpisodeOutcome) -> Result<(), AgentError> {
        dispatch!(self, a => a.finish(outcome).await)
    }

    fn step_count(&self) -> usize {
        dispatch!(self, a => a.step_count())
    }

    fn usage(&self) -> TokenUsage {
        dispatch!(self, a => a.usage())
    }
}
