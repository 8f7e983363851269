//! Anti-loop constraint tracking.
//!
//! The [`ConstraintTracker`] owns the constraint part of the structured state:
//! negative constraints, visited locations, and a bounded FIFO of recently
//! attempted actions tagged with their outcome.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Phrases in an observation that mark the last action as failed or a no-op.
const FAILURE_MARKERS: &[&str] = &[
    "nothing happens",
    "nothing happened",
    "locked",
    "cannot",
    "can't",
    "not possible",
    "invalid",
    "no known action",
    "unknown action",
    "you don't see",
];

/// Whether `observation` reads like a failed or ineffective action.
pub fn observation_indicates_failure(observation: &str) -> bool {
    let lower = observation.to_lowercase();
    FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Canonical form used for near-exact action comparison: lowercase, `_` read
/// as a space, whitespace collapsed.
pub fn normalize_action(action: &str) -> String {
    action
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Failed,
    Succeeded,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed => f.write_str("failed"),
            Self::Succeeded => f.write_str("succeeded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub action: String,
    pub outcome: Outcome,
}

/// Constraint state `C_t`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintTracker {
    negative_constraints: VecDeque<String>,
    /// First-visit order, oldest first.
    visited_locations: VecDeque<String>,
    attempted_actions: VecDeque<AttemptRecord>,
    max_attempts: usize,
    max_constraints: usize,
    max_visited: usize,
}

impl ConstraintTracker {
    /// An empty tracker keeping at most `max_attempts` attempt records,
    /// `max_constraints` negative constraints and `max_visited` locations.
    pub fn new(max_attempts: usize, max_constraints: usize, max_visited: usize) -> Self {
        Self {
            negative_constraints: VecDeque::new(),
            visited_locations: VecDeque::new(),
            attempted_actions: VecDeque::new(),
            max_attempts: max_attempts.max(1),
            max_constraints: max_constraints.max(1),
            max_visited: max_visited.max(1),
        }
    }

    pub fn record_attempt(&mut self, action: &str, outcome: Outcome) {
        self.attempted_actions.push_back(AttemptRecord {
            action: action.trim().to_string(),
            outcome,
        });
        while self.attempted_actions.len() > self.max_attempts {
            self.attempted_actions.pop_front();
        }
    }

    /// Add a negative constraint. Blank and duplicate entries are ignored;
    /// the oldest entry is evicted past the bound.
    pub fn add_constraint(&mut self, constraint: &str) {
        let constraint = constraint.trim();
        if constraint.is_empty() || self.negative_constraints.iter().any(|c| c == constraint) {
            return;
        }
        self.negative_constraints.push_back(constraint.to_string());
        while self.negative_constraints.len() > self.max_constraints {
            self.negative_constraints.pop_front();
        }
    }

    pub fn visit(&mut self, location: &str) {
        let location = location.trim();
        if location.is_empty() || self.visited_locations.iter().any(|l| l == location) {
            return;
        }
        self.visited_locations.push_back(location.to_string());
        while self.visited_locations.len() > self.max_visited {
            self.visited_locations.pop_front();
        }
    }

    /// Whether `action` matches (exactly or after normalization) an attempt
    /// recorded as failed.
    pub fn is_known_failure(&self, action: &str) -> bool {
        let wanted = normalize_action(action);
        self.attempted_actions
            .iter()
            .filter(|a| a.outcome == Outcome::Failed)
            .any(|a| a.action == action || normalize_action(&a.action) == wanted)
    }

    /// Bounded plain-text summary for prompting.
    pub fn summarize(&self) -> String {
        let mut lines = Vec::new();
        if !self.negative_constraints.is_empty() {
            lines.push(format!(
                "Avoid: {}",
                self.negative_constraints
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join("; ")
            ));
        }
        if !self.visited_locations.is_empty() {
            lines.push(format!(
                "Visited: {}",
                self.visited_locations
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !self.attempted_actions.is_empty() {
            lines.push(format!(
                "Recent attempts: {}",
                self.attempted_actions
                    .iter()
                    .map(|a| format!("{} ({})", a.action, a.outcome))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if lines.is_empty() {
            "(no constraints)".to_string()
        } else {
            lines.join("\n")
        }
    }

    pub fn negative_constraints(&self) -> impl Iterator<Item = &str> {
        self.negative_constraints.iter().map(String::as_str)
    }

    pub fn visited_locations(&self) -> impl Iterator<Item = &str> {
        self.visited_locations.iter().map(String::as_str)
    }

    pub fn attempts(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.attempted_actions.iter()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempted_actions.len()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn is_empty(&self) -> bool {
        self.negative_constraints.is_empty()
            && self.visited_locations.is_empty()
            && self.attempted_actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_are_bounded_fifo() {
        let bound = 10;
        let mut tracker = ConstraintTracker::new(bound, 20, 20);
        for i in 0..bound + 5 {
            tracker.record_attempt(&format!("go to cabinet {i}"), Outcome::Succeeded);
            assert!(tracker.attempt_count() <= bound);
        }
        let kept: Vec<_> = tracker.attempts().map(|a| a.action.clone()).collect();
        assert_eq!(kept.len(), bound);
        for i in 0..5 {
            assert!(!kept.contains(&format!("go to cabinet {i}")));
        }
        assert_eq!(kept.first().unwrap(), "go to cabinet 5");
        assert_eq!(kept.last().unwrap(), "go to cabinet 14");
    }

    #[test]
    fn known_failure_uses_normalized_match() {
        let mut tracker = ConstraintTracker::new(10, 20, 20);
        tracker.record_attempt("open drawer_1", Outcome::Failed);
        tracker.record_attempt("go to desk 1", Outcome::Succeeded);

        assert!(tracker.is_known_failure("open drawer_1"));
        assert!(tracker.is_known_failure("  Open  Drawer 1 "));
        assert!(!tracker.is_known_failure("open drawer 2"));
        assert!(!tracker.is_known_failure("go to desk 1"));
    }

    #[test]
    fn constraints_dedupe_and_evict_oldest() {
        let mut tracker = ConstraintTracker::new(10, 2, 20);
        tracker.add_constraint("drawer 1 is locked");
        tracker.add_constraint("drawer 1 is locked");
        tracker.add_constraint("  ");
        tracker.add_constraint("safe needs a key");
        tracker.add_constraint("fridge is empty");
        let kept: Vec<_> = tracker.negative_constraints().collect();
        assert_eq!(kept, vec!["safe needs a key", "fridge is empty"]);
    }

    #[test]
    fn failure_heuristic() {
        assert!(observation_indicates_failure("Nothing happens."));
        assert!(observation_indicates_failure("drawer_1 is locked"));
        assert!(observation_indicates_failure("You can't do that."));
        assert!(!observation_indicates_failure("You pick up the apple 1 from the countertop 1."));
    }

    #[test]
    fn summary_lists_every_part() {
        let mut tracker = ConstraintTracker::new(10, 20, 20);
        assert_eq!(tracker.summarize(), "(no constraints)");
        tracker.add_constraint("drawer 1 is locked");
        tracker.visit("desk 1");
        tracker.record_attempt("open drawer 1", Outcome::Failed);
        let text = tracker.summarize();
        assert!(text.contains("Avoid: drawer 1 is locked"));
        assert!(text.contains("Visited: desk 1"));
        assert!(text.contains("open drawer 1 (failed)"));
    }

    #[test]
    fn visited_locations_keep_the_most_recent() {
        let mut tracker = ConstraintTracker::new(10, 20, 2);
        for location in ["desk 1", "shelf 1", "desk 1", "fridge 1"] {
            tracker.visit(location);
        }
        let kept: Vec<_> = tracker.visited_locations().collect();
        assert_eq!(kept, vec!["shelf 1", "fridge 1"]);
    }
}
