//! Episode orchestration and its artifacts.
//!
//! - [`runner::EpisodeRunner`] -- drives an agent against an environment.
//! - [`logger::EpisodeLogger`] -- JSONL step records and episode summaries.
//! - [`report`] -- per-run aggregates and the cross-run comparison table.

pub mod logger;
pub mod report;
pub mod runner;
pub mod types;

pub use logger::EpisodeLogger;
pub use report::{comparison_table, load_summaries, ExperimentSummary, RunInfo};
pub use runner::{EpisodeRunner, RunError};
pub use types::{EpisodeSummary, StepRecord, TerminationReason};
