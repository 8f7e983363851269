//! ZipAct: state-dependent memory for LLM agents in text environments.
//!
//! An experimental framework comparing how an agent remembers its past
//! interactions. The state-dependent agent keeps a compact structured state
//! (goal, world, constraints) rewritten after every action; the baselines
//! keep all or part of the raw transcript.

pub mod agent;
pub mod config;
pub mod env;
pub mod episode;
pub mod model;
pub mod state;
