//! Task environment abstractions and concrete implementations.
//!
//! Every environment implements the [`Environment`] trait so that the episode
//! runner can interact with it uniformly.
//!
//! Included environments:
//! - **HTTP** ([`http`]) -- adapter for ALFWorld, ScienceWorld and WebShop
//!   servers.
//! - **Household** ([`household`]) -- an offline ALFWorld-style simulator.
//! - **Scripted** ([`scripted`]) -- replays canned episodes for every
//!   environment kind, for `--mock` runs and tests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod household;
pub mod http;
pub mod scripted;
pub mod traits;

// Re-export the core trait and observation type at the module level.
pub use traits::{EnvObservation, Environment};

// ---------------------------------------------------------------------------
// Environment kinds
// ---------------------------------------------------------------------------

/// The environment families the framework knows how to prompt for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvKind {
    #[serde(alias = "alf")]
    AlfWorld,
    #[serde(alias = "sci", alias = "scienceworld")]
    SciWorld,
    #[serde(alias = "web")]
    WebShop,
}

impl EnvKind {
    pub const ALL: [EnvKind; 3] = [Self::AlfWorld, Self::SciWorld, Self::WebShop];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlfWorld => "alfworld",
            Self::SciWorld => "sciworld",
            Self::WebShop => "webshop",
        }
    }

    /// A harmless action the environment always understands.
    pub fn default_fallback_action(&self) -> &'static str {
        match self {
            Self::AlfWorld => "look",
            Self::SciWorld => "look around",
            Self::WebShop => "click[Back to Search]",
        }
    }
}

impl fmt::Display for EnvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alfworld" | "alf" => Ok(Self::AlfWorld),
            "sciworld" | "sci" | "scienceworld" => Ok(Self::SciWorld),
            "webshop" | "web" => Ok(Self::WebShop),
            other => Err(format!(
                "unknown environment '{other}' (expected alfworld, sciworld or webshop)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// AnyEnv: enum dispatch wrapper for dynamic environment selection
// ---------------------------------------------------------------------------

/// An enum wrapper around all concrete environment types, enabling runtime
/// environment selection without `dyn` (which is incompatible with async trait
/// methods).
#[derive(Debug)]
pub enum AnyEnv {
    Http(http::HttpEnv),
    Household(household::HouseholdEnv),
    Scripted(scripted::ScriptedEnv),
}

impl Environment for AnyEnv {
    async fn reset(&mut self) -> anyhow::Result<EnvObservation> {
        match self {
            Self::Http(e) => e.reset().await,
            Self::Household(e) => e.reset().await,
            Self::Scripted(e) => e.reset().await,
        }
    }

    async fn step(&mut self, action: &str) -> anyhow::Result<EnvObservation> {
        match self {
            Self::Http(e) => e.step(action).await,
            Self::Household(e) => e.step(action).await,
            Self::Scripted(e) => e.step(action).await,
        }
    }

    fn task(&self) -> &str {
        match self {
            Self::Http(e) => e.task(),
            Self::Household(e) => e.task(),
            Self::Scripted(e) => e.task(),
        }
    }

    fn kind(&self) -> EnvKind {
        match self {
            Self::Http(e) => e.kind(),
            Self::Household(e) => e.kind(),
            Self::Scripted(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_kind_aliases() {
        assert_eq!("alf".parse::<EnvKind>().unwrap(), EnvKind::AlfWorld);
        assert_eq!("ScienceWorld".parse::<EnvKind>().unwrap(), EnvKind::SciWorld);
        assert_eq!("web".parse::<EnvKind>().unwrap(), EnvKind::WebShop);
        assert!("minecraft".parse::<EnvKind>().is_err());
    }

    #[test]
    fn env_kind_serde_accepts_aliases() {
        let kind: EnvKind = serde_json::from_str("\"sci\"").unwrap();
        assert_eq!(kind, EnvKind::SciWorld);
        assert_eq!(serde_json::to_string(&EnvKind::WebShop).unwrap(), "\"webshop\"");
    }

    #[tokio::test]
    async fn any_env_dispatches() {
        let mut env = AnyEnv::Scripted(scripted::ScriptedEnv::new(EnvKind::SciWorld));
        env.reset().await.unwrap();
        assert_eq!(env.kind(), EnvKind::SciWorld);
        assert!(env.task().contains("boil water"));
    }
}
