//! End-to-end runs: agent registry, episode runner, logs and reports.

use std::sync::Arc;

use chrono::Utc;
use zipact::agent::{create_agent, registry, Agent, AgentContext, AgentKind};
use zipact::config::{AgentConfig, GenerationConfig};
use zipact::env::scripted::{ScriptedEnv, ScriptedEpisode, ScriptedStep};
use zipact::env::EnvKind;
use zipact::episode::logger::read_jsonl;
use zipact::episode::{
    comparison_table, load_summaries, EpisodeLogger, EpisodeRunner, EpisodeSummary,
    ExperimentSummary, RunError, RunInfo, StepRecord, TerminationReason,
};
use zipact::model::scripted::ScriptedModel;
use zipact::model::{LlmError, PromptLibrary, RetryPolicy};

/// Usable by every variant: planners and updaters read the JSON object,
/// actors read the trailing action line.
const UNIVERSAL_REPLY: &str = "{\"current_objective\": \"find the mug\", \"sub_goals\": [\"find the mug\"], \"goal\": {}, \"world\": {}, \"reflection\": {\"last_action_failed\": false}}\nAction: look";

fn context(model: &ScriptedModel) -> AgentContext<ScriptedModel> {
    AgentContext {
        model: Arc::new(model.clone()),
        prompts: Arc::new(PromptLibrary::builtin()),
        env: EnvKind::AlfWorld,
        settings: AgentConfig::default(),
        generation: GenerationConfig::default(),
        retry: RetryPolicy::immediate(1),
    }
}

fn two_step_env() -> ScriptedEnv {
    ScriptedEnv::from_episodes(
        EnvKind::AlfWorld,
        vec![
            ScriptedEpisode::new(
                "find the mug",
                vec![
                    ScriptedStep::obs("You are in the middle of a room."),
                    ScriptedStep::obs("On the desk 1, you see a mug 1."),
                    ScriptedStep::terminal("You pick up the mug 1.", 1.0),
                ],
            ),
            ScriptedEpisode::new(
                "find the pen",
                vec![
                    ScriptedStep::obs("You are in the middle of a room."),
                    ScriptedStep::terminal("You give up.", 0.0),
                ],
            ),
        ],
    )
}

fn run_info(agent: AgentKind) -> RunInfo {
    RunInfo {
        experiment: format!("{agent}_alfworld_scripted"),
        run_id: "test-run".into(),
        agent: agent.to_string(),
        model: "scripted".into(),
        environment: "alfworld".into(),
        started_at: Utc::now(),
    }
}

#[test]
fn registry_covers_every_variant() {
    let names: Vec<_> = registry::<ScriptedModel>()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, ["zipact", "react", "reflexion", "obs_mask", "summary"]);

    let model = ScriptedModel::new();
    let agent = create_agent("observation_masking", context(&model)).unwrap();
    assert_eq!(agent.kind(), AgentKind::ObsMask);
    assert!(create_agent("mystery", context(&model)).is_err());
}

#[tokio::test]
async fn every_variant_completes_a_batch() {
    let dir = tempfile::tempdir().unwrap();

    for kind in AgentKind::ALL {
        let model = ScriptedModel::new();
        model.repeat(UNIVERSAL_REPLY);
        let mut agent = create_agent(kind.as_str(), context(&model)).unwrap();
        let mut env = two_step_env();
        let run = run_info(kind);
        let mut logger = EpisodeLogger::create(dir.path(), &run.experiment).unwrap();

        let mut summaries = Vec::new();
        {
            let mut runner = EpisodeRunner::new(&mut logger, 10);
            for _ in 0..2 {
                summaries.push(runner.run_episode(&mut agent, &mut env).await.unwrap());
            }
        }
        assert!(summaries[0].success, "{kind}");
        assert_eq!(summaries[0].steps, 2);
        assert!(!summaries[1].success, "{kind}");
        assert_eq!(summaries[1].termination_reason, TerminationReason::Done);

        let steps: Vec<StepRecord> = read_jsonl(&logger.steps_path()).unwrap();
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.action == "look"));
        let logged: Vec<EpisodeSummary> = read_jsonl(&logger.episodes_path()).unwrap();
        assert_eq!(logged, summaries);

        ExperimentSummary::from_episodes(&run, &summaries)
            .write(dir.path())
            .unwrap();
    }

    let reports = load_summaries(dir.path()).unwrap();
    assert_eq!(reports.len(), AgentKind::ALL.len());
    assert!(reports.iter().all(|r| (r.success_rate - 0.5).abs() < 1e-9));
    let table = comparison_table(&reports);
    assert_eq!(table.lines().count(), 2 + AgentKind::ALL.len());
    assert!(table.contains("zipact"));
}

#[tokio::test]
async fn environment_failure_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut logger = EpisodeLogger::create(dir.path(), "flaky").unwrap();
    let model = ScriptedModel::new();
    model.repeat(UNIVERSAL_REPLY);
    let mut agent = create_agent("zipact", context(&model)).unwrap();
    let mut env = ScriptedEnv::from_episodes(
        EnvKind::AlfWorld,
        vec![
            ScriptedEpisode::new("find the mug", vec![ScriptedStep::failure("server unreachable")]),
            ScriptedEpisode::new(
                "find the mug",
                vec![
                    ScriptedStep::obs("You are in a room."),
                    ScriptedStep::terminal("You pick up the mug 1.", 1.0),
                ],
            ),
        ],
    );

    let mut runner = EpisodeRunner::new(&mut logger, 10);
    let first = runner.run_episode(&mut agent, &mut env).await.unwrap();
    let second = runner.run_episode(&mut agent, &mut env).await.unwrap();
    assert_eq!(first.termination_reason, TerminationReason::EnvironmentError);
    assert_eq!(first.steps, 0);
    assert!(second.success);
}

#[tokio::test]
async fn fatal_model_error_ends_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut logger = EpisodeLogger::create(dir.path(), "fatal").unwrap();
    let model = ScriptedModel::new();
    model.push_error(LlmError::Auth {
        status: 401,
        message: "invalid api key".into(),
    });
    let mut agent = create_agent("zipact", context(&model)).unwrap();
    let mut env = two_step_env();

    let err = EpisodeRunner::new(&mut logger, 10)
        .run_episode(&mut agent, &mut env)
        .await
        .unwrap_err();
    match err {
        RunError::Agent { summary, .. } => {
            assert_eq!(summary.termination_reason, TerminationReason::ModelError);
            assert_eq!(summary.steps, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}
