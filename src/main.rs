//! ZipAct: state-dependent memory for LLM agents
//!
//! Provides subcommands:
//!
//! - `run`      -- Run one agent variant for a batch of episodes
//! - `analyze`  -- Compare the experiment summaries in a log directory

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use zipact::agent::{create_agent, AgentContext, AgentKind};
use zipact::config::ZipActConfig;
use zipact::env::household::HouseholdEnv;
use zipact::env::http::HttpEnv;
use zipact::env::scripted::ScriptedEnv;
use zipact::env::{AnyEnv, EnvKind};
use zipact::episode::{
    comparison_table, load_summaries, EpisodeLogger, EpisodeRunner, ExperimentSummary, RunError,
    RunInfo, TerminationReason,
};
use zipact::model::{LlmClient, PromptLibrary};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// ZipAct: state-dependent memory for LLM agents
#[derive(Parser)]
#[command(name = "zipact", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log per-step thoughts, state snapshots and token usage.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an agent for a batch of episodes.
    Run(RunArgs),

    /// Print a comparison table of every experiment summary in a directory.
    Analyze {
        /// Directory containing `*_summary.json` files.
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Agent variant: zipact, react, reflexion, obs_mask, summary.
    #[arg(long, default_value = "zipact")]
    agent: AgentKind,

    /// Environment: alfworld, sciworld, webshop.
    #[arg(long, default_value = "alfworld")]
    env: EnvKind,

    /// Number of episodes to run.
    #[arg(long, default_value_t = 1)]
    episodes: usize,

    /// Step budget per episode (overrides the config).
    #[arg(long)]
    max_steps: Option<usize>,

    /// Model identifier (overrides the config).
    #[arg(long)]
    model: Option<String>,

    /// Replay canned episodes instead of connecting to an environment server.
    #[arg(long, conflicts_with = "household")]
    mock: bool,

    /// Use the built-in offline household simulator (alfworld only).
    #[arg(long)]
    household: bool,

    /// Directory for step logs and summaries (overrides the config).
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialise tracing (reads RUST_LOG env var, defaults to info or debug).
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = ZipActConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => cmd_run(config, args).await,
        Commands::Analyze { log_dir } => cmd_analyze(&log_dir).map(|_| ExitCode::SUCCESS),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_run(mut config: ZipActConfig, args: RunArgs) -> Result<ExitCode> {
    if let Some(model) = args.model {
        config.model.model_id = model;
    }
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }
    if let Some(log_dir) = args.log_dir {
        config.logging.log_dir = log_dir;
    }
    if args.household && args.env != EnvKind::AlfWorld {
        anyhow::bail!("--household is only available for the alfworld environment");
    }

    let prompts = PromptLibrary::load(config.prompts_path.as_deref())?;
    let client = LlmClient::new(
        &config.model.api_base,
        &config.model.api_key,
        &config.model.model_id,
        Duration::from_secs(config.model.request_timeout_secs),
    )
    .context("Failed to create model client")?;

    let ctx = AgentContext {
        model: Arc::new(client),
        prompts: Arc::new(prompts),
        env: args.env,
        settings: config.agent.clone(),
        generation: config.model.generation.clone(),
        retry: config.retry.clone(),
    };
    let mut agent = create_agent(args.agent.as_str(), ctx).map_err(anyhow::Error::msg)?;
    let mut env = build_env(&config, args.env, args.mock, args.household);

    let started_at = Utc::now();
    let model_slug = config.model.model_id.replace(['/', ':'], "-");
    let run = RunInfo {
        experiment: format!(
            "{}_{}_{}_{}",
            args.agent,
            args.env,
            model_slug,
            started_at.format("%Y%m%d_%H%M%S")
        ),
        run_id: Uuid::new_v4().to_string(),
        agent: args.agent.to_string(),
        model: config.model.model_id.clone(),
        environment: args.env.to_string(),
        started_at,
    };
    tracing::info!(
        experiment = %run.experiment,
        agent = %run.agent,
        env = %run.environment,
        model = %run.model,
        episodes = args.episodes,
        max_steps = config.agent.max_steps,
        "Starting run"
    );

    let log_dir = config.logging.log_dir.clone();
    let mut logger = EpisodeLogger::create(&log_dir, &run.experiment)?;
    let mut runner = EpisodeRunner::new(&mut logger, config.agent.max_steps);

    let mut summaries = Vec::with_capacity(args.episodes);
    let mut fatal = false;
    for episode in 0..args.episodes {
        match runner.run_episode(&mut agent, &mut env).await {
            Ok(summary) => {
                tracing::info!(
                    episode,
                    success = summary.success,
                    steps = summary.steps,
                    "Episode {}/{} complete",
                    episode + 1,
                    args.episodes
                );
                summaries.push(summary);
            }
            Err(RunError::Agent { summary, source }) => {
                tracing::error!(episode, error = %source, "Fatal agent error, stopping run");
                summaries.push(*summary);
                fatal = true;
                break;
            }
            Err(RunError::Log(err)) => return Err(err),
        }
    }

    let report = ExperimentSummary::from_episodes(&run, &summaries);
    let path = report.write(&log_dir)?;
    tracing::info!(
        path = %path.display(),
        success_rate = report.success_rate,
        successes = report.successful_episodes,
        total = report.total_episodes,
        avg_steps = report.avg_steps,
        total_tokens = report.total_tokens,
        "Saved experiment summary"
    );

    let completed = summaries
        .iter()
        .filter(|s| {
            !matches!(
                s.termination_reason,
                TerminationReason::EnvironmentError | TerminationReason::ModelError
            )
        })
        .count();
    if fatal || (args.episodes > 0 && completed == 0) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_analyze(log_dir: &std::path::Path) -> Result<()> {
    let summaries = load_summaries(log_dir)
        .with_context(|| format!("Failed to load summaries from {}", log_dir.display()))?;
    if summaries.is_empty() {
        println!("No summary files found in {}", log_dir.display());
        return Ok(());
    }
    println!("{}", comparison_table(&summaries));
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_env(config: &ZipActConfig, kind: EnvKind, mock: bool, household: bool) -> AnyEnv {
    if household {
        tracing::info!("Using offline household simulator");
        AnyEnv::Household(HouseholdEnv::new(config.agent.max_steps))
    } else if mock {
        tracing::info!(env = %kind, "Using scripted environment");
        AnyEnv::Scripted(ScriptedEnv::new(kind))
    } else {
        let url = config.env.url_for(kind);
        tracing::info!(env = %kind, url, "Using environment server");
        AnyEnv::Http(HttpEnv::new(kind, url))
    }
}
