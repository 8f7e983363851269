//! Core environment trait and shared types.
//!
//! Every task environment (ALFWorld, ScienceWorld, WebShop, ...) implements the
//! [`Environment`] trait so that the episode runner can drive it uniformly.

use serde::{Deserialize, Serialize};

use super::EnvKind;

/// An observation returned by the environment after a reset or step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvObservation {
    /// The textual observation the agent sees.
    pub text: String,
    /// The scalar reward for the transition that produced this observation.
    pub reward: f64,
    /// Whether the episode has terminated.
    pub done: bool,
    /// Arbitrary extra information from the environment (task-specific).
    pub info: serde_json::Value,
    /// The commands the environment currently accepts, when it publishes them.
    pub admissible_actions: Option<Vec<String>>,
}

impl EnvObservation {
    /// A non-terminal observation with zero reward.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reward: 0.0,
            done: false,
            info: serde_json::Value::Null,
            admissible_actions: None,
        }
    }

    pub fn with_admissible<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admissible_actions = Some(actions.into_iter().map(Into::into).collect());
        self
    }
}

/// The core environment trait.
///
/// Adapter failures are plain `anyhow` errors; the episode runner treats any of
/// them as fatal for the current episode only.
#[allow(async_fn_in_trait)]
pub trait Environment: Send + Sync {
    /// Start a new episode and return its initial observation.
    async fn reset(&mut self) -> anyhow::Result<EnvObservation>;

    /// Execute an action in the environment and return the resulting observation.
    async fn step(&mut self, action: &str) -> anyhow::Result<EnvObservation>;

    /// The natural-language instruction of the current task.
    fn task(&self) -> &str;

    /// Which environment family this adapter speaks for.
    fn kind(&self) -> EnvKind;
}
