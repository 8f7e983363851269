use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::env::EnvKind;
use crate::model::{GenerationOptions, RetryPolicy};
use crate::state::StateBounds;

/// Complete configuration for an experiment run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZipActConfig {
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub retry: RetryPolicy,
    pub env: EnvConfig,
    pub logging: LoggingConfig,
    /// JSON file overriding built-in prompt templates.
    pub prompts_path: Option<PathBuf>,
}

/// Model endpoint and per-role sampling options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    /// Falls back to `OPENAI_API_KEY` when empty.
    pub api_key: String,
    pub model_id: String,
    pub request_timeout_secs: u64,
    pub generation: GenerationConfig,
}

/// Sampling options for each kind of model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Sub-goal planning on reset.
    pub init: GenerationOptions,
    pub updater: GenerationOptions,
    pub actor: GenerationOptions,
    /// Action calls of the transcript baselines.
    pub history: GenerationOptions,
    pub reflection: GenerationOptions,
    pub summary: GenerationOptions,
}

/// Per-agent behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Step budget per episode (default: 50).
    pub max_steps: usize,
    /// Bound of the attempted-actions FIFO (default: 10).
    pub max_attempted_actions: usize,
    /// Bound of the negative-constraint list (default: 20).
    pub max_negative_constraints: usize,
    /// Bound of tracked entity statuses and discoveries (default: 30).
    pub max_entities: usize,
    /// Bound of the visited-locations list (default: 20).
    pub max_visited_locations: usize,
    /// Ask the model for a sub-goal plan on reset (default: true).
    pub plan_on_reset: bool,
    /// Transcript entries kept by observation masking (default: 5).
    pub keep_recent: usize,
    /// Steps between transcript compressions (default: 10).
    pub summary_interval: usize,
    /// Reflections shown in Reflexion prompts (default: 3).
    pub reflection_window: usize,
    /// Action used when no usable action can be extracted. Unset means the
    /// environment's own no-op (`look`, `look around`, `click[Back to Search]`).
    pub fallback_action: Option<String>,
}

impl AgentConfig {
    pub fn state_bounds(&self) -> StateBounds {
        StateBounds {
            max_attempts: self.max_attempted_actions,
            max_constraints: self.max_negative_constraints,
            max_entities: self.max_entities,
            max_visited: self.max_visited_locations,
        }
    }

    /// The configured fallback, or the default for `env`.
    pub fn fallback_for(&self, env: EnvKind) -> String {
        self.fallback_action
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(env.default_fallback_action())
            .to_string()
    }
}

/// Environment server endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub alfworld_url: String,
    pub sciworld_url: String,
    pub webshop_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for JSONL step logs and summaries (default: "logs").
    pub log_dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model_id: "gpt-4o-mini".into(),
            request_timeout_secs: 60,
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            init: GenerationOptions::new(0.0, 256),
            updater: GenerationOptions::new(0.0, 512),
            actor: GenerationOptions::new(0.0, 256),
            history: GenerationOptions::new(0.0, 256),
            reflection: GenerationOptions::new(0.7, 256),
            summary: GenerationOptions::new(0.0, 384),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_attempted_actions: 10,
            max_negative_constraints: 20,
            max_entities: 30,
            max_visited_locations: 20,
            plan_on_reset: true,
            keep_recent: 5,
            summary_interval: 10,
            reflection_window: 3,
            fallback_action: None,
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            alfworld_url: "http://localhost:3000".into(),
            sciworld_url: "http://localhost:3001".into(),
            webshop_url: "http://localhost:3002".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl EnvConfig {
    pub fn url_for(&self, kind: EnvKind) -> &str {
        match kind {
            EnvKind::AlfWorld => &self.alfworld_url,
            EnvKind::SciWorld => &self.sciworld_url,
            EnvKind::WebShop => &self.webshop_url,
        }
    }
}

impl ZipActConfig {
    /// Load from a JSON file, or defaults when `path` is `None`. Empty API
    /// settings are filled from `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str::<ZipActConfig>(&text)
                    .with_context(|| format!("Failed to parse config from {}", path.display()))?
            }
            None => ZipActConfig::default(),
        };
        config.apply_env_fallbacks(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("OPENAI_BASE_URL").ok(),
        );
        Ok(config)
    }

    fn apply_env_fallbacks(&mut self, api_key: Option<String>, base_url: Option<String>) {
        if self.model.api_key.is_empty() {
            if let Some(key) = api_key.filter(|k| !k.is_empty()) {
                self.model.api_key = key;
            }
        }
        if let Some(url) = base_url.filter(|u| !u.is_empty()) {
            if self.model.api_base == ModelConfig::default().api_base {
                self.model.api_base = url;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ZipActConfig::default();
        assert_eq!(config.agent.max_steps, 50);
        assert_eq!(config.agent.max_attempted_actions, 10);
        assert_eq!(config.agent.max_negative_constraints, 20);
        assert!(config.agent.plan_on_reset);
        assert_eq!(config.agent.fallback_for(EnvKind::AlfWorld), "look");
        assert_eq!(config.agent.fallback_for(EnvKind::SciWorld), "look around");
        assert_eq!(config.agent.state_bounds(), StateBounds::default());
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.logging.log_dir, PathBuf::from("logs"));
        assert!(config.prompts_path.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"agent": {"max_steps": 12}, "model": {"model_id": "local", "api_key": "k"}}"#,
        )
        .unwrap();

        let config = ZipActConfig::load(Some(&path)).unwrap();
        assert_eq!(config.agent.max_steps, 12);
        assert_eq!(config.agent.keep_recent, 5);
        assert_eq!(config.model.model_id, "local");
        assert_eq!(config.model.api_key, "k");
        assert_eq!(config.model.generation.updater.max_tokens, 512);
    }

    #[test]
    fn configured_fallback_overrides_the_environment_default() {
        let mut agent = AgentConfig::default();
        assert_eq!(agent.fallback_for(EnvKind::WebShop), "click[Back to Search]");
        agent.fallback_action = Some("inventory".into());
        assert_eq!(agent.fallback_for(EnvKind::WebShop), "inventory");
        agent.fallback_action = Some("  ".into());
        assert_eq!(agent.fallback_for(EnvKind::SciWorld), "look around");
    }

    #[test]
    fn env_fallbacks_fill_only_empty_settings() {
        let mut config = ZipActConfig::default();
        config.apply_env_fallbacks(Some("sk-env".into()), Some("http://proxy/v1".into()));
        assert_eq!(config.model.api_key, "sk-env");
        assert_eq!(config.model.api_base, "http://proxy/v1");

        let mut config = ZipActConfig::default();
        config.model.api_key = "sk-file".into();
        config.model.api_base = "http://file/v1".into();
        config.apply_env_fallbacks(Some("sk-env".into()), Some("http://proxy/v1".into()));
        assert_eq!(config.model.api_key, "sk-file");
        assert_eq!(config.model.api_base, "http://file/v1");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = ZipActConfig::load(Some(Path::new("/nonexistent/zipact.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
