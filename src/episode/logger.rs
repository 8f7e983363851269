//! JSON Lines persistence for step records and episode summaries.
//!
//! For an experiment named `name` the logger writes, inside its directory:
//! - `name.jsonl` -- one [`StepRecord`] per line;
//! - `name_episodes.jsonl` -- one [`EpisodeSummary`] per line.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::types::{EpisodeSummary, StepRecord};

pub struct EpisodeLogger {
    dir: PathBuf,
    experiment: String,
    steps: BufWriter<File>,
    episodes: BufWriter<File>,
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn write_line<T: Serialize>(writer: &mut BufWriter<File>, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, value).context("Failed to serialize log record")?;
    writer.write_all(b"\n")?;
    writer.flush().context("Failed to flush log file")?;
    Ok(())
}

impl EpisodeLogger {
    /// Create `dir` if needed and open the experiment's log files for append.
    pub fn create(dir: &Path, experiment: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let steps = open_append(&dir.join(format!("{experiment}.jsonl")))?;
        let episodes = open_append(&dir.join(format!("{experiment}_episodes.jsonl")))?;
        debug!(dir = %dir.display(), experiment, "opened episode logs");
        Ok(Self {
            dir: dir.to_path_buf(),
            experiment: experiment.to_string(),
            steps,
            episodes,
        })
    }

    pub fn steps_path(&self) -> PathBuf {
        self.dir.join(format!("{}.jsonl", self.experiment))
    }

    pub fn episodes_path(&self) -> PathBuf {
        self.dir.join(format!("{}_episodes.jsonl", self.experiment))
    }

    pub fn log_step(&mut self, record: &StepRecord) -> Result<()> {
        write_line(&mut self.steps, record)
    }

    pub fn log_episode(&mut self, summary: &EpisodeSummary) -> Result<()> {
        write_line(&mut self.episodes, summary)
    }
}

/// Read every record of a JSON Lines file, skipping blank lines.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record at {}:{}", path.display(), i + 1))?;
        records.push(record);
    }
    Ok(records)
}
