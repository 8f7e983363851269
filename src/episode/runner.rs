//! Drives one agent through one environment episode at a time.
//!
//! The runner repeatedly:
//!   1. hands the latest observation to the agent,
//!   2. forwards the chosen action to the environment,
//!   3. logs the step,
//!
//! until the environment signals `done`, the step budget runs out, or an
//! error ends the episode. Environment failures end only the current episode;
//! agent failures end the run.

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::logger::EpisodeLogger;
use super::types::{EpisodeSummary, StepRecord, TerminationReason};
use crate::agent::{Agent, AgentError, EpisodeOutcome};
use crate::env::Environment;
use crate::model::TokenUsage;

#[derive(Debug, Error)]
pub enum RunError {
    /// The agent failed fatally; the episode summary has been logged.
    #[error("episode {} aborted: {source}", .summary.episode_id)]
    Agent {
        summary: Box<EpisodeSummary>,
        #[source]
        source: AgentError,
    },

    #[error(transparent)]
    Log(#[from] anyhow::Error),
}

#[derive(Debug, Default)]
struct Progress {
    steps: usize,
    total_reward: f64,
}

pub struct EpisodeRunner<'a> {
    logger: &'a mut EpisodeLogger,
    max_steps: usize,
}

impl<'a> EpisodeRunner<'a> {
    pub fn new(logger: &'a mut EpisodeLogger, max_steps: usize) -> Self {
        Self { logger, max_steps }
    }

    fn finalize(
        &mut self,
        episode_id: &str,
        task: &str,
        progress: &Progress,
        usage: TokenUsage,
        reason: TerminationReason,
    ) -> Result<EpisodeSummary, RunError> {
        let summary = EpisodeSummary {
            episode_id: episode_id.to_string(),
            success: reason == TerminationReason::Success,
            total_reward: progress.total_reward,
            steps: progress.steps,
            total_tokens: usage.total_tokens,
            termination_reason: reason,
            task: task.to_string(),
            token_usage: usage,
        };
        self.logger.log_episode(&summary)?;
        info!(
            episode = %episode_id,
            success = summary.success,
            steps = summary.steps,
            reward = summary.total_reward,
            total_tokens = summary.total_tokens,
            reason = %reason,
            "episode finished"
        );
        Ok(summary)
    }

    fn abort<A: Agent>(
        &mut self,
        agent: &A,
        episode_id: &str,
        task: &str,
        progress: &Progress,
        source: AgentError,
    ) -> Result<EpisodeSummary, RunError> {
        warn!(episode = %episode_id, error = %source, "agent failed, aborting run");
        let summary = self.finalize(
            episode_id,
            task,
            progress,
            agent.usage(),
            TerminationReason::ModelError,
        )?;
        Err(RunError::Agent {
            summary: Box::new(summary),
            source,
        })
    }

    /// Run one episode and log its steps and summary.
    pub async fn run_episode<A, E>(
        &mut self,
        agent: &mut A,
        env: &mut E,
    ) -> Result<EpisodeSummary, RunError>
    where
        A: Agent,
        E: Environment,
    {
        let episode_id = Uuid::new_v4().to_string();
        let mut progress = Progress::default();

        let mut observation = match env.reset().await {
            Ok(obs) => obs,
            Err(err) => {
                warn!(episode = %episode_id, error = %err, "environment reset failed");
                return self.finalize(
                    &episode_id,
                    "",
                    &progress,
                    TokenUsage::default(),
                    TerminationReason::EnvironmentError,
                );
            }
        };
        let task = env.task().to_string();
        info!(episode = %episode_id, env = %env.kind(), agent = %agent.kind(), task = %task, "episode started");

        if let Err(err) = agent.reset(&task).await {
            return self.abort(agent, &episode_id, &task, &progress, err);
        }

        let mut reason = TerminationReason::StepBudget;
        for step_index in 0..self.max_steps {
            let decision = match agent.step(&observation).await {
                Ok(decision) => decision,
                Err(err) => return self.abort(agent, &episode_id, &task, &progress, err),
            };

            let next = match env.step(&decision.action).await {
                Ok(next) => next,
                Err(err) => {
                    warn!(episode = %episode_id, step = step_index, error = %err, "environment step failed");
                    reason = TerminationReason::EnvironmentError;
                    break;
                }
            };

            progress.steps += 1;
            progress.total_reward += next.reward;
            info!(
                episode = %episode_id,
                step = step_index,
                action = %decision.action,
                reward = next.reward,
                degraded = decision.degraded,
                prompt_tokens = decision.usage.input_tokens,
                "step"
            );
            self.logger.log_step(&StepRecord {
                episode_id: episode_id.clone(),
                step_index,
                observation: std::mem::take(&mut observation.text),
                action: decision.action,
                reward: next.reward,
                done: next.done,
                token_usage_delta: decision.usage,
                thought: decision.thought,
                degraded: decision.degraded,
            })?;

            if next.done {
                reason = if next.reward > 0.0 {
                    TerminationReason::Success
                } else {
                    TerminationReason::Done
                };
                break;
            }
            observation = next;
        }

        let outcome = match reason {
            TerminationReason::Success => EpisodeOutcome::Success,
            TerminationReason::StepBudget => EpisodeOutcome::Failure {
                reason: "Max steps reached".into(),
            },
            TerminationReason::EnvironmentError => EpisodeOutcome::Failure {
                reason: "Environment error".into(),
            },
            TerminationReason::Done | TerminationReason::ModelError => EpisodeOutcome::Failure {
                reason: "Task failed".into(),
            },
        };
        if let Err(err) = agent.finish(&outcome).await {
            return self.abort(agent, &episode_id, &task, &progress, err);
        }

        self.finalize(&episode_id, &task, &progress, agent.usage(), reason)
    }
}
