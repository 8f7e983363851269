//! Structured patches proposed by the State Updater.
//!
//! The model answers with a JSON object holding three sections:
//!
//! ```json
//! {"goal":       {"subgoal_completed": true, "current_objective": null, "add_subgoals": []},
//!  "world":      {"location": "fridge 1", "inventory_add": [], "inventory_remove": [],
//!                 "entity_status": {"fridge 1": "open"}, "discovered": ["apple 1"]},
//!  "reflection": {"last_action_failed": false, "negative_constraints": []}}
//! ```
//!
//! All three sections must be present; any field inside a section may be
//! omitted and then means "unchanged".

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalPatch {
    /// The front sub-goal is done and should be popped.
    pub subgoal_completed: bool,
    pub current_objective: Option<String>,
    pub add_subgoals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldPatch {
    pub location: Option<String>,
    pub inventory_add: Vec<String>,
    pub inventory_remove: Vec<String>,
    pub entity_status: BTreeMap<String, String>,
    pub discovered: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionPatch {
    /// `None` leaves the verdict to the observation heuristic.
    pub last_action_failed: Option<bool>,
    pub negative_constraints: Vec<String>,
}

/// A validated patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePatch {
    pub goal: GoalPatch,
    pub world: WorldPatch,
    pub reflection: ReflectionPatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchParseError {
    #[error("response contains no JSON object")]
    NoJson,

    #[error("response JSON is invalid: {0}")]
    InvalidJson(String),

    #[error("patch is missing the '{0}' section")]
    MissingSection(&'static str),

    #[error("patch section '{section}' is malformed: {message}")]
    InvalidSection {
        section: &'static str,
        message: String,
    },
}

/// Strip a surrounding Markdown code fence, if any.
pub(crate) fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let stripped = stripped.strip_suffix("```").unwrap_or(stripped);
    stripped.trim()
}

/// Cut the outermost `{...}` out of a model reply and tidy it for parsing.
pub(crate) fn extract_json_object(response: &str) -> Option<String> {
    static TRAILING_COMMA_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

    let body = strip_code_fences(response);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    Some(TRAILING_COMMA_RE.replace_all(&body[start..=end], "$1").into_owned())
}

fn section<T: serde::de::DeserializeOwned>(
    root: &mut serde_json::Map<String, serde_json::Value>,
    name: &'static str,
) -> Result<T, PatchParseError> {
    let value = root
        .remove(name)
        .filter(|v| !v.is_null())
        .ok_or(PatchParseError::MissingSection(name))?;
    serde_json::from_value(value).map_err(|e| PatchParseError::InvalidSection {
        section: name,
        message: e.to_string(),
    })
}

/// Parse a State Updater reply into a [`StatePatch`].
pub fn parse_patch(response: &str) -> Result<StatePatch, PatchParseError> {
    let json = extract_json_object(response).ok_or(PatchParseError::NoJson)?;
    let value: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| PatchParseError::InvalidJson(e.to_string()))?;
    let serde_json::Value::Object(mut root) = value else {
        return Err(PatchParseError::NoJson);
    };

    Ok(StatePatch {
        goal: section(&mut root, "goal")?,
        world: section(&mut root, "world")?,
        reflection: section(&mut root, "reflection")?,
    })
}

/// Sub-goal plan produced on reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialPlan {
    pub current_objective: Option<String>,
    pub sub_goals: Vec<String>,
}

/// Parse a planning reply. A plan without any sub-goal is rejected.
pub fn parse_plan(response: &str) -> Result<InitialPlan, PatchParseError> {
    let json = extract_json_object(response).ok_or(PatchParseError::NoJson)?;
    let plan: InitialPlan =
        serde_json::from_str(&json).map_err(|e| PatchParseError::InvalidJson(e.to_string()))?;
    if plan.sub_goals.iter().all(|g| g.trim().is_empty()) {
        return Err(PatchParseError::MissingSection("sub_goals"));
    }
    Ok(plan)
}
