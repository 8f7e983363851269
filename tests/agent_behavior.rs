//! Cross-variant agent behavior driven by a scripted model.

use std::sync::Arc;

use zipact::agent::react::ReactAgent;
use zipact::agent::zipact::ZipActAgent;
use zipact::agent::{Agent, AgentContext, AgentError, EpisodeOutcome};
use zipact::config::{AgentConfig, GenerationConfig};
use zipact::env::{EnvKind, EnvObservation};
use zipact::model::scripted::ScriptedModel;
use zipact::model::{LlmError, PromptLibrary, RetryPolicy};
use zipact::state::PARSE_FAILURE_CONSTRAINT;

const PLAN: &str =
    r#"{"current_objective": "find a mug", "sub_goals": ["find a mug", "put it in the sink"]}"#;

/// Serves both the State Updater (JSON object) and the Actor (last `Action:`).
const PATCH_AND_ACTION: &str = "{\"goal\": {}, \"world\": {}, \"reflection\": {\"last_action_failed\": false}}\nAction: look";

fn context(model: &ScriptedModel, settings: AgentConfig) -> AgentContext<ScriptedModel> {
    AgentContext {
        model: Arc::new(model.clone()),
        prompts: Arc::new(PromptLibrary::builtin()),
        env: EnvKind::AlfWorld,
        settings,
        generation: GenerationConfig::default(),
        retry: RetryPolicy::immediate(2),
    }
}

fn obs(text: &str) -> EnvObservation {
    EnvObservation::text(text)
}

#[tokio::test]
async fn zipact_prompt_stays_bounded_while_react_grows() {
    let observation = obs("You are in the middle of a room. Nothing much has changed.");

    let model = ScriptedModel::with_replies([PLAN]);
    model.repeat(PATCH_AND_ACTION);
    let mut zipact = ZipActAgent::new(context(&model, AgentConfig::default()));
    zipact.reset("put a mug in the sink").await.unwrap();
    let mut zipact_chars = Vec::new();
    for _ in 0..30 {
        zipact_chars.push(zipact.step(&observation).await.unwrap().prompt_chars);
    }

    let model = ScriptedModel::new();
    model.repeat("Thought: keep looking.\nAction: look");
    let mut react = ReactAgent::new(context(&model, AgentConfig::default()));
    react.reset("put a mug in the sink").await.unwrap();
    let mut react_chars = Vec::new();
    for _ in 0..30 {
        react_chars.push(react.step(&observation).await.unwrap().prompt_chars);
    }

    // Once the attempt log is full the state prompt stops changing.
    let settled = &zipact_chars[15..];
    assert!(settled.iter().all(|&c| c == settled[0]), "{zipact_chars:?}");
    assert!(react_chars.windows(2).all(|w| w[1] > w[0]), "{react_chars:?}");
    assert!(react_chars[29] > zipact_chars[29]);
}

#[tokio::test]
async fn negative_constraints_never_exceed_the_bound() {
    let settings = AgentConfig {
        max_negative_constraints: 3,
        ..AgentConfig::default()
    };
    let model = ScriptedModel::with_replies([PLAN, "Action: look"]);
    let mut agent = ZipActAgent::new(context(&model, settings));
    agent.reset("put a mug in the sink").await.unwrap();
    agent.step(&obs("You are in a room.")).await.unwrap();

    for i in 0..8 {
        model.push_response(format!(
            r#"{{"goal": {{}}, "world": {{}}, "reflection": {{"last_action_failed": false, "negative_constraints": ["mug is not in cabinet {i}"]}}}}"#
        ));
        model.push_response("Action: look");
        agent.step(&obs("You are in a room.")).await.unwrap();

        let kept: Vec<_> = agent
            .state()
            .unwrap()
            .constraints
            .negative_constraints()
            .collect();
        assert!(kept.len() <= 3);
        assert_eq!(kept.last().copied(), Some(format!("mug is not in cabinet {i}").as_str()));
    }
}

#[tokio::test]
async fn failed_action_is_remembered_and_not_repeated() {
    let model = ScriptedModel::with_replies([
        PLAN,
        "Action: open drawer 1",
        r#"{"goal": {}, "world": {}, "reflection": {"last_action_failed": true, "negative_constraints": ["drawer 1 is locked"]}}"#,
        "Action: open drawer 1",
        "Thought: try the cabinet.\nAction: open cabinet 1",
    ]);
    let mut agent = ZipActAgent::new(context(&model, AgentConfig::default()));
    agent.reset("put a mug in the sink").await.unwrap();
    agent.step(&obs("You are in a room.")).await.unwrap();

    let decision = agent.step(&obs("The drawer 1 is locked.")).await.unwrap();
    assert_eq!(decision.action, "open cabinet 1");
    assert!(!decision.degraded);

    let state = agent.state().unwrap();
    assert!(state.constraints.is_known_failure("open drawer 1"));
    assert!(state
        .constraints
        .negative_constraints()
        .any(|c| c == "drawer 1 is locked"));
    // The correction told the model why its first choice was rejected.
    let correction = model.last_prompt().unwrap();
    assert!(correction.last().unwrap().content.contains("already failed"));
}

#[tokio::test]
async fn completed_sub_goal_advances_the_objective() {
    let model = ScriptedModel::with_replies([
        PLAN,
        "Action: take mug 1 from countertop 1",
        r#"{"goal": {"subgoal_completed": true}, "world": {"inventory_add": ["mug 1"]}, "reflection": {"last_action_failed": false}}"#,
        "Action: go to sinkbasin 1",
    ]);
    let mut agent = ZipActAgent::new(context(&model, AgentConfig::default()));
    agent.reset("put a mug in the sink").await.unwrap();
    assert_eq!(
        agent.state().unwrap().goal.current_objective(),
        Some("find a mug")
    );
    agent.step(&obs("On the countertop 1, you see a mug 1.")).await.unwrap();
    agent.step(&obs("You pick up the mug 1 from the countertop 1.")).await.unwrap();

    let state = agent.state().unwrap();
    assert_eq!(state.goal.current_objective(), Some("put it in the sink"));
    assert!(state.goal.completed().any(|g| g == "find a mug"));
    assert!(state.world.holds("mug 1"));
}

#[tokio::test]
async fn unparseable_replies_degrade_to_the_fallback_action() {
    let model = ScriptedModel::with_replies([
        PLAN,
        "Action: look",
        "the state is fine, I think",
        "I am not sure what to do.",
        "Still thinking about it.",
    ]);
    let mut agent = ZipActAgent::new(context(&model, AgentConfig::default()));
    agent.reset("put a mug in the sink").await.unwrap();
    agent.step(&obs("You are in a room.")).await.unwrap();

    let decision = agent.step(&obs("You see nothing special.")).await.unwrap();
    assert_eq!(decision.action, "look");
    assert!(decision.degraded);
    assert!(agent
        .state()
        .unwrap()
        .constraints
        .negative_constraints()
        .any(|c| c == PARSE_FAILURE_CONSTRAINT));
    assert_eq!(agent.step_count(), 2);
}

#[tokio::test]
async fn reset_replaces_the_previous_task() {
    let model = ScriptedModel::with_replies([
        PLAN,
        "Action: look",
        r#"{"current_objective": "find a pen", "sub_goals": ["find a pen"]}"#,
    ]);
    let mut agent = ZipActAgent::new(context(&model, AgentConfig::default()));
    agent.reset("put a mug in the sink").await.unwrap();
    agent.step(&obs("You are in a room.")).await.unwrap();
    agent
        .finish(&EpisodeOutcome::Failure {
            reason: "Task failed".into(),
        })
        .await
        .unwrap();

    agent.reset("find a pen").await.unwrap();
    let state = agent.state().unwrap();
    assert_eq!(agent.task(), "find a pen");
    assert_eq!(agent.step_count(), 0);
    assert_eq!(state.goal.current_objective(), Some("find a pen"));
    assert!(!state.goal.sub_goals().any(|g| g.contains("mug")));
    assert_eq!(state.constraints.attempt_count(), 0);
}

#[tokio::test]
async fn back_to_back_resets_keep_only_the_second_task() {
    let model = ScriptedModel::with_replies([
        PLAN,
        r#"{"current_objective": "find a pen", "sub_goals": ["find a pen"]}"#,
    ]);
    let mut agent = ZipActAgent::new(context(&model, AgentConfig::default()));
    agent.reset("put a mug in the sink").await.unwrap();
    agent.reset("find a pen").await.unwrap();

    let state = agent.state().unwrap();
    assert_eq!(agent.task(), "find a pen");
    assert_eq!(agent.step_count(), 0);
    assert_eq!(state.goal.instruction(), "find a pen");
    assert_eq!(state.goal.sub_goals().collect::<Vec<_>>(), ["find a pen"]);
    assert!(state.world.is_empty());
    assert!(state.constraints.is_empty());
}

#[tokio::test]
async fn reset_clears_world_and_constraints() {
    let model = ScriptedModel::with_replies([
        PLAN,
        "Action: go to countertop 1",
        r#"{"goal": {}, "world": {"location": "countertop 1", "inventory_add": ["mug 1"], "entity_status": {"drawer 1": "locked"}, "discovered": ["knife 1"]}, "reflection": {"last_action_failed": true, "negative_constraints": ["drawer 1 is locked"]}}"#,
        "Action: open cabinet 1",
        r#"{"current_objective": "find a pen", "sub_goals": ["find a pen"]}"#,
    ]);
    let mut agent = ZipActAgent::new(context(&model, AgentConfig::default()));
    agent.reset("put a mug in the sink").await.unwrap();
    agent.step(&obs("You are in a room.")).await.unwrap();
    agent.step(&obs("The drawer 1 is locked.")).await.unwrap();

    let filled = agent.state().unwrap();
    assert!(filled.world.holds("mug 1"));
    assert_eq!(filled.world.location(), Some("countertop 1"));
    assert!(!filled.constraints.is_empty());

    agent
        .finish(&EpisodeOutcome::Failure {
            reason: "Task failed".into(),
        })
        .await
        .unwrap();
    agent.reset("find a pen").await.unwrap();

    let state = agent.state().unwrap();
    assert!(state.world.is_empty());
    assert!(state.constraints.is_empty());
    assert_eq!(state.goal.instruction(), "find a pen");
    assert_eq!(state.goal.current_objective(), Some("find a pen"));
    assert!(state
        .goal
        .sub_goals()
        .chain(state.goal.completed())
        .all(|g| !g.contains("mug")));
}

#[tokio::test]
async fn prompt_settles_when_every_patch_adds_entities() {
    let settings = AgentConfig {
        max_entities: 4,
        max_visited_locations: 3,
        max_steps: 100,
        ..AgentConfig::default()
    };
    let observation = obs("You see a new shelf.");
    let model = ScriptedModel::with_replies([PLAN, "Action: look"]);
    let mut agent = ZipActAgent::new(context(&model, settings));
    agent.reset("put a mug in the sink").await.unwrap();

    let mut chars = vec![agent.step(&observation).await.unwrap().prompt_chars];
    for i in 100..140 {
        model.push_response(format!(
            r#"{{"goal": {{}}, "world": {{"location": "shelf {i}", "entity_status": {{"box {i}": "closed"}}, "discovered": ["book {i}"]}}, "reflection": {{"last_action_failed": false}}}}"#
        ));
        model.push_response("Action: look");
        chars.push(agent.step(&observation).await.unwrap().prompt_chars);
    }

    let state = agent.state().unwrap();
    assert_eq!(state.world.entities().len(), 4);
    assert_eq!(state.world.discovered().count(), 4);
    assert_eq!(state.constraints.visited_locations().count(), 3);
    assert_eq!(state.world.location(), Some("shelf 139"));

    let settled = &chars[20..];
    assert!(settled.iter().all(|&c| c == settled[0]), "{chars:?}");
}

#[tokio::test]
async fn fatal_model_error_is_not_retried_or_masked() {
    let model = ScriptedModel::with_replies([PLAN]);
    model.push_error(LlmError::Auth {
        status: 401,
        message: "invalid api key".into(),
    });
    let mut agent = ZipActAgent::new(context(&model, AgentConfig::default()));
    agent.reset("put a mug in the sink").await.unwrap();

    let err = agent.step(&obs("You are in a room.")).await.unwrap_err();
    assert!(matches!(err, AgentError::Model(LlmError::Auth { .. })));
    assert_eq!(model.calls(), 2);
    assert_eq!(agent.step_count(), 0);
}

#[tokio::test]
async fn transient_errors_degrade_instead_of_failing() {
    let model = ScriptedModel::with_replies([PLAN, "Action: go to desk 1"]);
    for _ in 0..2 {
        model.push_error(LlmError::RateLimited {
            message: "slow down".into(),
        });
    }
    model.push_response("Action: open drawer 1");
    let mut agent = ZipActAgent::new(context(&model, AgentConfig::default()));
    agent.reset("put a mug in the sink").await.unwrap();
    agent.step(&obs("You are in a room.")).await.unwrap();
    let before = agent.state().cloned().unwrap();

    let decision = agent.step(&obs("On the desk 1, you see a pen.")).await.unwrap();
    assert_eq!(decision.action, "open drawer 1");
    assert!(decision.degraded);
    // The updater gave up, so the state is exactly the previous one.
    assert_eq!(agent.state().unwrap(), &before);
}
