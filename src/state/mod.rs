//! The structured state `S_t = <G_t, W_t, C_t>` kept by the state-dependent
//! agent in place of a transcript.
//!
//! - [`goal::GoalState`] -- instruction, sub-goal queue, current objective.
//! - [`world::WorldState`] -- location, inventory, entity status, discoveries.
//! - [`constraint::ConstraintTracker`] -- negative constraints, visited
//!   locations, bounded attempt history.
//! - [`patch`] -- the model-proposed patch format and its parser.

pub mod constraint;
pub mod goal;
pub mod patch;
pub mod world;

use serde::{Deserialize, Serialize};

pub use constraint::{
    normalize_action, observation_indicates_failure, AttemptRecord, ConstraintTracker, Outcome,
};
pub use goal::GoalState;
pub use patch::{parse_patch, parse_plan, InitialPlan, PatchParseError, StatePatch};
pub use world::WorldState;

/// Negative constraint recorded when the Updater reply cannot be parsed.
pub const PARSE_FAILURE_CONSTRAINT: &str = "state update parse failure";

/// Size limits that keep the rendered state independent of episode length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBounds {
    pub max_attempts: usize,
    pub max_constraints: usize,
    pub max_entities: usize,
    pub max_visited: usize,
}

impl Default for StateBounds {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_constraints: 20,
            max_entities: world::DEFAULT_MAX_ENTITIES,
            max_visited: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredState {
    pub goal: GoalState,
    pub world: WorldState,
    pub constraints: ConstraintTracker,
}

impl StructuredState {
    /// Fresh state for `instruction`: unplanned goal, empty world and
    /// constraints.
    pub fn new(instruction: &str, bounds: StateBounds) -> Self {
        Self {
            goal: GoalState::new(instruction),
            world: WorldState::new(bounds.max_entities),
            constraints: ConstraintTracker::new(
                bounds.max_attempts,
                bounds.max_constraints,
                bounds.max_visited,
            ),
        }
    }

    /// Produce `S_next` from `self`, the last action, its observation and a
    /// validated patch. `self` is left untouched.
    pub fn apply(&self, patch: &StatePatch, last_action: &str, observation: &str) -> Self {
        let mut next = self.clone();

        if patch.goal.subgoal_completed {
            next.goal.complete_front();
        }
        if let Some(objective) = &patch.goal.current_objective {
            next.goal.set_objective(objective);
        }
        next.goal.add_sub_goals(&patch.goal.add_subgoals);

        if let Some(moved_to) = next.world.apply(&patch.world) {
            next.constraints.visit(&moved_to);
        }

        let failed = patch
            .reflection
            .last_action_failed
            .unwrap_or_else(|| observation_indicates_failure(observation));
        for constraint in &patch.reflection.negative_constraints {
            next.constraints.add_constraint(constraint);
        }
        if failed {
            if patch.reflection.negative_constraints.is_empty() {
                next.constraints
                    .add_constraint(&format!("{}: {}", last_action.trim(), observation.trim()));
            }
            next.constraints.record_attempt(last_action, Outcome::Failed);
        } else {
            next.constraints.record_attempt(last_action, Outcome::Succeeded);
        }
        next
    }

    /// `S_prev` plus the parse-failure constraint.
    pub fn with_parse_failure(&self) -> Self {
        let mut next = self.clone();
        next.constraints.add_constraint(PARSE_FAILURE_CONSTRAINT);
        next
    }

    /// Compact JSON rendering of the goal and world parts. The constraint
    /// part goes into prompts as [`ConstraintTracker::summarize`] text.
    pub fn to_prompt_json(&self) -> String {
        let view = serde_json::json!({
            "goal_state": {
                "instruction": self.goal.instruction(),
                "current_objective": self.goal.current_objective(),
                "sub_goal_queue": self.goal.sub_goals().collect::<Vec<_>>(),
            },
            "world_state": {
                "location": self.world.location(),
                "inventory": self.world.inventory().collect::<Vec<_>>(),
                "entity_status": self.world.entities(),
                "discovered": self.world.discovered().collect::<Vec<_>>(),
            },
        });
        serde_json::to_string_pretty(&view).unwrap_or_else(|_| view.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> StatePatch {
        parse_patch(json).unwrap()
    }

    #[test]
    fn failed_action_records_constraint_and_attempt() {
        let prev = StructuredState::new("open the drawer", StateBounds::default());
        assert!(prev.constraints.is_empty());

        let patch = parse(
            r#"{"goal": {}, "world": {},
                "reflection": {"last_action_failed": true, "negative_constraints": ["drawer_1 is locked"]}}"#,
        );
        let next = prev.apply(&patch, "open drawer_1", "drawer_1 is locked");

        let constraints: Vec<_> = next.constraints.negative_constraints().collect();
        assert!(constraints
            .iter()
            .any(|c| c.contains("drawer_1") && c.contains("locked")));
        let attempt = next.constraints.attempts().last().unwrap();
        assert_eq!(attempt.action, "open drawer_1");
        assert_eq!(attempt.outcome, Outcome::Failed);
        assert!(next.constraints.is_known_failure("open drawer_1"));
        // The previous state is untouched.
        assert!(prev.constraints.is_empty());
    }

    #[test]
    fn heuristic_fills_in_missing_verdict() {
        let prev = StructuredState::new("open the drawer", StateBounds::default());
        let next = prev.apply(&StatePatch::default(), "open drawer_1", "drawer_1 is locked");
        let constraints: Vec<_> = next.constraints.negative_constraints().collect();
        assert_eq!(constraints, vec!["open drawer_1: drawer_1 is locked"]);
        assert_eq!(
            next.constraints.attempts().last().unwrap().outcome,
            Outcome::Failed
        );
    }

    #[test]
    fn completed_sub_goal_is_popped() {
        let mut prev = StructuredState::new("put a clean apple in the fridge", StateBounds::default());
        prev.goal = GoalState::planned(
            "put a clean apple in the fridge",
            None,
            ["clean apple_1", "find refrigerator"],
        );
        let patch = parse(
            r#"{"goal": {"subgoal_completed": true}, "world": {"entity_status": {"apple_1": "clean"}},
                "reflection": {"last_action_failed": false}}"#,
        );
        let next = prev.apply(&patch, "clean apple_1 with sinkbasin_1", "apple_1 is now clean");
        assert_eq!(next.goal.sub_goals().collect::<Vec<_>>(), vec!["find refrigerator"]);
        assert_eq!(next.goal.current_objective(), Some("find refrigerator"));
        assert_eq!(
            next.constraints.attempts().last().unwrap().outcome,
            Outcome::Succeeded
        );
    }

    #[test]
    fn movement_marks_location_visited() {
        let prev = StructuredState::new("find a mug", StateBounds::default());
        let patch = parse(r#"{"goal": {}, "world": {"location": "countertop 1"}, "reflection": {}}"#);
        let next = prev.apply(&patch, "go to countertop 1", "You arrive at countertop 1.");
        assert_eq!(next.world.location(), Some("countertop 1"));
        assert_eq!(
            next.constraints.visited_locations().collect::<Vec<_>>(),
            vec!["countertop 1"]
        );
    }

    #[test]
    fn parse_failure_keeps_everything_else() {
        let prev = StructuredState::new("find a mug", StateBounds::default());
        let next = prev.with_parse_failure();
        assert_eq!(next.goal, prev.goal);
        assert_eq!(next.world, prev.world);
        assert_eq!(
            next.constraints.negative_constraints().collect::<Vec<_>>(),
            vec![PARSE_FAILURE_CONSTRAINT]
        );
    }

    #[test]
    fn prompt_json_has_goal_and_world() {
        let state = StructuredState::new("find a mug", StateBounds::default());
        let json: serde_json::Value = serde_json::from_str(&state.to_prompt_json()).unwrap();
        assert_eq!(json["goal_state"]["instruction"], "find a mug");
        assert!(json["world_state"]["inventory"].as_array().unwrap().is_empty());
        assert!(json.get("constraint_state").is_none());
    }
}
