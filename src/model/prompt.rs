//! Prompt templates for every agent variant.
//!
//! Templates are configuration data: a mapping from
//! `(environment, family, role)` to template text, rendered with minijinja.
//! The built-in set lives in `src/prompts/*.md`; a JSON file may override any
//! entry. The library is loaded once at start-up and shared read-only.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::env::EnvKind;

const ACTIONS_ALFWORLD: &str = include_str!("../prompts/actions_alfworld.md");
const ACTIONS_SCIWORLD: &str = include_str!("../prompts/actions_sciworld.md");
const ACTIONS_WEBSHOP: &str = include_str!("../prompts/actions_webshop.md");

const ZIPACT_INIT: &str = include_str!("../prompts/zipact_init.md");
const ZIPACT_UPDATER: &str = include_str!("../prompts/zipact_updater.md");
const ZIPACT_UPDATE_STEP: &str = include_str!("../prompts/zipact_update_step.md");
const ZIPACT_ACTOR: &str = include_str!("../prompts/zipact_actor.md");
const ZIPACT_ACT_STEP: &str = include_str!("../prompts/zipact_act_step.md");
const HISTORY_SYSTEM: &str = include_str!("../prompts/history_system.md");
const HISTORY_STEP: &str = include_str!("../prompts/history_step.md");
const CORRECTION: &str = include_str!("../prompts/correction.md");
const REFLECTION: &str = include_str!("../prompts/reflection.md");
const SUMMARY: &str = include_str!("../prompts/summary.md");

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Which agent family a template belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptFamily {
    /// The state-dependent agent (planner, updater, actor).
    ZipAct,
    /// The transcript-based baselines (ReAct, Reflexion, masking, summary).
    History,
}

impl PromptFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZipAct => "zipact",
            Self::History => "history",
        }
    }
}

/// The purpose of a template within its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptRole {
    /// Sub-goal planning on reset.
    Init,
    /// State Updater system prompt.
    Updater,
    /// State Updater user prompt: previous state, last action, observation.
    UpdateStep,
    /// Actor system prompt.
    Actor,
    /// Actor user prompt: state table and observation.
    ActStep,
    /// Baseline system prompt.
    System,
    /// Baseline user prompt: history and observation.
    Step,
    /// Follow-up after an unusable action reply.
    Correction,
    /// End-of-episode self-critique.
    Reflection,
    /// Transcript compression.
    Summary,
}

impl PromptRole {
    pub const ZIPACT: [PromptRole; 6] = [
        Self::Init,
        Self::Updater,
        Self::UpdateStep,
        Self::Actor,
        Self::ActStep,
        Self::Correction,
    ];

    pub const HISTORY: [PromptRole; 5] = [
        Self::System,
        Self::Step,
        Self::Correction,
        Self::Reflection,
        Self::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Updater => "updater",
            Self::UpdateStep => "update_step",
            Self::Actor => "actor",
            Self::ActStep => "act_step",
            Self::System => "system",
            Self::Step => "step",
            Self::Correction => "correction",
            Self::Reflection => "reflection",
            Self::Summary => "summary",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            Self::Init => ZIPACT_INIT,
            Self::Updater => ZIPACT_UPDATER,
            Self::UpdateStep => ZIPACT_UPDATE_STEP,
            Self::Actor => ZIPACT_ACTOR,
            Self::ActStep => ZIPACT_ACT_STEP,
            Self::System => HISTORY_SYSTEM,
            Self::Step => HISTORY_STEP,
            Self::Correction => CORRECTION,
            Self::Reflection => REFLECTION,
            Self::Summary => SUMMARY,
        }
    }
}

/// Full address of one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromptKey {
    pub env: EnvKind,
    pub family: PromptFamily,
    pub role: PromptRole,
}

impl PromptKey {
    pub fn new(env: EnvKind, family: PromptFamily, role: PromptRole) -> Self {
        Self { env, family, role }
    }
}

impl fmt::Display for PromptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.env.as_str(),
            self.family.as_str(),
            self.role.as_str()
        )
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("no prompt template registered for {0}")]
    Missing(PromptKey),

    #[error("failed to render prompt {key}: {source}")]
    Render {
        key: PromptKey,
        #[source]
        source: minijinja::Error,
    },
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// Override file shape: `{"<env>": {"<family>": {"<role>": "<template>"}}}`.
/// The reserved family `"actions"` with role `"vocabulary"` replaces the
/// action list shown to the model.
type PromptOverrides = HashMap<String, HashMap<String, HashMap<String, String>>>;

/// Immutable set of templates for one run.
pub struct PromptLibrary {
    templates: HashMap<PromptKey, String>,
    actions: HashMap<EnvKind, String>,
    jinja: Environment<'static>,
}

impl fmt::Debug for PromptLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptLibrary")
            .field("templates", &self.templates.len())
            .finish()
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptLibrary {
    /// The built-in templates for every environment.
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        let mut actions = HashMap::new();
        for env in EnvKind::ALL {
            for role in PromptRole::ZIPACT {
                templates.insert(
                    PromptKey::new(env, PromptFamily::ZipAct, role),
                    role.builtin().to_string(),
                );
            }
            for role in PromptRole::HISTORY {
                templates.insert(
                    PromptKey::new(env, PromptFamily::History, role),
                    role.builtin().to_string(),
                );
            }
            let vocabulary = match env {
                EnvKind::AlfWorld => ACTIONS_ALFWORLD,
                EnvKind::SciWorld => ACTIONS_SCIWORLD,
                EnvKind::WebShop => ACTIONS_WEBSHOP,
            };
            actions.insert(env, vocabulary.trim_end().to_string());
        }

        // Undefined variables are render errors.
        let mut jinja = Environment::new();
        jinja.set_undefined_behavior(UndefinedBehavior::Strict);

        Self {
            templates,
            actions,
            jinja,
        }
    }

    /// Built-in templates, with overrides from `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut library = Self::builtin();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read prompts from {}", path.display()))?;
            let overrides: PromptOverrides = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse prompts from {}", path.display()))?;
            library.apply_overrides(overrides)?;
            debug!(path = %path.display(), "loaded prompt overrides");
        }
        Ok(library)
    }

    fn apply_overrides(&mut self, overrides: PromptOverrides) -> Result<()> {
        for (env_name, families) in overrides {
            let env: EnvKind = env_name.parse().map_err(anyhow::Error::msg)?;
            for (family_name, roles) in families {
                for (role_name, text) in roles {
                    if family_name == "actions" && role_name == "vocabulary" {
                        self.actions.insert(env, text);
                        continue;
                    }
                    let key = self.resolve_key(env, &family_name, &role_name)?;
                    self.jinja
                        .template_from_str(&text)
                        .with_context(|| format!("invalid template for {key}"))?;
                    self.templates.insert(key, text);
                }
            }
        }
        Ok(())
    }

    fn resolve_key(&self, env: EnvKind, family: &str, role: &str) -> Result<PromptKey> {
        let (family, roles): (PromptFamily, &[PromptRole]) = match family {
            "zipact" => (PromptFamily::ZipAct, &PromptRole::ZIPACT),
            "history" => (PromptFamily::History, &PromptRole::HISTORY),
            other => anyhow::bail!("unknown prompt family '{other}'"),
        };
        let role = roles
            .iter()
            .copied()
            .find(|r| r.as_str() == role)
            .with_context(|| format!("unknown {} prompt role '{role}'", family.as_str()))?;
        Ok(PromptKey::new(env, family, role))
    }

    /// Raw template text for `key`.
    pub fn template(&self, key: PromptKey) -> Result<&str, PromptError> {
        self.templates
            .get(&key)
            .map(String::as_str)
            .ok_or(PromptError::Missing(key))
    }

    /// Action vocabulary shown to the model for `env`.
    pub fn actions(&self, env: EnvKind) -> &str {
        self.actions.get(&env).map(String::as_str).unwrap_or_default()
    }

    /// Render the template at `key` with `ctx`.
    pub fn render<S: Serialize>(&self, key: PromptKey, ctx: S) -> Result<String, PromptError> {
        let source = self.template(key)?;
        self.jinja
            .render_str(source, ctx)
            .map(|s| s.trim().to_string())
            .map_err(|source| PromptError::Render { key, source })
    }
}
