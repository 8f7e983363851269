//! Records written for every step and every episode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::TokenUsage;

/// One line of the step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub episode_id: String,
    /// Zero-based index within the episode.
    pub step_index: usize,
    /// The observation the action was chosen from.
    pub observation: String,
    pub action: String,
    /// Reward returned for `action`.
    pub reward: f64,
    pub done: bool,
    /// Usage of the model calls made while choosing `action`.
    pub token_usage_delta: TokenUsage,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thought: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The environment signalled completion with a positive reward.
    Success,
    /// The environment signalled completion without reward.
    Done,
    StepBudget,
    EnvironmentError,
    ModelError,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Done => "done",
            Self::StepBudget => "step_budget",
            Self::EnvironmentError => "environment_error",
            Self::ModelError => "model_error",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the summary log, written when an episode ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: String,
    pub success: bool,
    pub total_reward: f64,
    pub steps: usize,
    pub total_tokens: u64,
    pub termination_reason: TerminationReason,
    #[serde(default)]
    pub task: String,
    /// Input/output split of `total_tokens`.
    #[serde(default)]
    pub token_usage: TokenUsage,
}
