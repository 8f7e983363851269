//! Experiment-level aggregation and cross-run comparison.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::EpisodeSummary;

const SUMMARY_SUFFIX: &str = "_summary.json";

/// Aggregate of one run, written as `<experiment>_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub experiment: String,
    pub run_id: String,
    pub agent: String,
    pub model: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_episodes: usize,
    pub successful_episodes: usize,
    pub success_rate: f64,
    pub avg_steps: f64,
    pub avg_reward: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub avg_tokens_per_episode: f64,
    /// Episode count per termination reason.
    #[serde(default)]
    pub terminations: BTreeMap<String, usize>,
}

/// Identity of a run, fixed before any episode starts.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub experiment: String,
    pub run_id: String,
    pub agent: String,
    pub model: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
}

impl ExperimentSummary {
    pub fn from_episodes(run: &RunInfo, episodes: &[EpisodeSummary]) -> Self {
        let total = episodes.len();
        let mean = |sum: f64| if total == 0 { 0.0 } else { sum / total as f64 };

        let successful = episodes.iter().filter(|e| e.success).count();
        let total_input_tokens = episodes.iter().map(|e| e.token_usage.input_tokens).sum();
        let total_output_tokens = episodes.iter().map(|e| e.token_usage.output_tokens).sum();
        let total_tokens: u64 = episodes.iter().map(|e| e.total_tokens).sum();
        let mut terminations = BTreeMap::new();
        for episode in episodes {
            *terminations
                .entry(episode.termination_reason.to_string())
                .or_insert(0) += 1;
        }

        Self {
            experiment: run.experiment.clone(),
            run_id: run.run_id.clone(),
            agent: run.agent.clone(),
            model: run.model.clone(),
            environment: run.environment.clone(),
            started_at: run.started_at,
            finished_at: Utc::now(),
            total_episodes: total,
            successful_episodes: successful,
            success_rate: mean(successful as f64),
            avg_steps: mean(episodes.iter().map(|e| e.steps as f64).sum()),
            avg_reward: mean(episodes.iter().map(|e| e.total_reward).sum()),
            total_input_tokens,
            total_output_tokens,
            total_tokens,
            avg_tokens_per_episode: mean(total_tokens as f64),
            terminations,
        }
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let path = dir.join(format!("{}{SUMMARY_SUFFIX}", self.experiment));
        let json = serde_json::to_string_pretty(self).context("Failed to serialize summary")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        Ok(path)
    }
}

/// Load every `*_summary.json` in `dir`, sorted by model then agent.
/// Unreadable files are skipped with a warning.
pub fn load_summaries(dir: &Path) -> Result<Vec<ExperimentSummary>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut summaries = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_summary = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(SUMMARY_SUFFIX));
        if !is_summary {
            continue;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|text| Ok(serde_json::from_str::<ExperimentSummary>(&text)?));
        match parsed {
            Ok(summary) => summaries.push(summary),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable summary"),
        }
    }
    summaries.sort_by(|a, b| {
        (a.model.as_str(), a.agent.as_str(), a.experiment.as_str()).cmp(&(
            b.model.as_str(),
            b.agent.as_str(),
            b.experiment.as_str(),
        ))
    });
    Ok(summaries)
}

/// Fixed-width comparison table of `summaries`, in the given order.
pub fn comparison_table(summaries: &[ExperimentSummary]) -> String {
    let header = [
        "Model",
        "Agent",
        "Env",
        "Success",
        "Episodes",
        "Avg Steps",
        "Avg Tokens/Ep",
        "Total Tokens",
        "Experiment",
    ];
    let rows: Vec<[String; 9]> = summaries
        .iter()
        .map(|s| {
            [
                s.model.clone(),
                s.agent.clone(),
                s.environment.clone(),
                format!("{:.1}%", s.success_rate * 100.0),
                format!("{}/{}", s.successful_episodes, s.total_episodes),
                format!("{:.1}", s.avg_steps),
                format!("{:.0}", s.avg_tokens_per_episode),
                s.total_tokens.to_string(),
                s.experiment.clone(),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let format_row = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_row(header.to_vec())];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in &rows {
        lines.push(format_row(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}
