//! HTTP adapter for environment servers.
//!
//! ALFWorld, ScienceWorld and WebShop each run behind a small server that
//! exposes two endpoints:
//! - `POST {base_url}/reset` -- body: `{}`
//! - `POST {base_url}/step`  -- body: `{"action": "<action string>"}`
//!
//! Both return JSON matching [`ServerResponse`].

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing;

use super::traits::{EnvObservation, Environment};
use super::EnvKind;

/// An environment reached over HTTP.
#[derive(Debug)]
pub struct HttpEnv {
    kind: EnvKind,
    /// Base URL of the server (e.g. `http://localhost:3000`).
    base_url: String,
    http: reqwest::Client,
    task: String,
    done: bool,
}

/// The JSON shape returned by an environment server.
#[derive(Debug, Deserialize)]
struct ServerResponse {
    observation: String,
    #[serde(default)]
    reward: f64,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    task: Option<String>,
    #[serde(default, alias = "admissible_commands", alias = "available_actions")]
    admissible_actions: Option<Vec<String>>,
    #[serde(default)]
    info: Option<serde_json::Value>,
}

impl HttpEnv {
    pub fn new(kind: EnvKind, base_url: &str) -> Self {
        Self {
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            task: String::new(),
            done: false,
        }
    }

    async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<ServerResponse> {
        let url = format!("{}/{endpoint}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach {} server at {url}", self.kind))?
            .error_for_status()
            .with_context(|| format!("{} server rejected {endpoint}", self.kind))?;
        resp.json()
            .await
            .with_context(|| format!("failed to parse {} {endpoint} response", self.kind))
    }
}

/// Pull the instruction out of an initial observation (`"Your task is to: ..."`).
pub(crate) fn task_from_observation(observation: &str) -> Option<String> {
    observation
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("Your task is to:"))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl Environment for HttpEnv {
    async fn reset(&mut self) -> Result<EnvObservation> {
        self.done = false;
        let resp = self.post("reset", serde_json::json!({})).await?;

        self.task = resp
            .task
            .or_else(|| task_from_observation(&resp.observation))
            .unwrap_or_else(|| resp.observation.clone());

        tracing::debug!(env = %self.kind, task = %self.task, "environment reset");

        Ok(EnvObservation {
            text: resp.observation,
            reward: 0.0,
            done: false,
            info: resp.info.unwrap_or(serde_json::Value::Null),
            admissible_actions: resp.admissible_actions,
        })
    }

    async fn step(&mut self, action: &str) -> Result<EnvObservation> {
        if self.done {
            anyhow::bail!("cannot step in a terminated episode");
        }

        let resp = self
            .post("step", serde_json::json!({ "action": action }))
            .await?;
        self.done = resp.done;

        Ok(EnvObservation {
            text: resp.observation,
            reward: resp.reward,
            done: resp.done,
            info: resp.info.unwrap_or(serde_json::Value::Null),
            admissible_actions: resp.admissible_actions,
        })
    }

    fn task(&self) -> &str {
        &self.task
    }

    fn kind(&self) -> EnvKind {
        self.kind
    }
}
