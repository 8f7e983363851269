//! Goal state `G_t`: the instruction, the pending sub-goal queue and the
//! current objective.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalState {
    instruction: String,
    /// Pending sub-goals; the front is the one being pursued.
    sub_goals: VecDeque<String>,
    current_objective: Option<String>,
    /// Sub-goals already popped. Never re-queued.
    completed: Vec<String>,
}

impl GoalState {
    /// A goal with no plan: the instruction itself is the objective.
    pub fn new(instruction: &str) -> Self {
        let instruction = instruction.trim().to_string();
        Self {
            current_objective: (!instruction.is_empty()).then(|| instruction.clone()),
            instruction,
            sub_goals: VecDeque::new(),
            completed: Vec::new(),
        }
    }

    /// A goal seeded from a plan. Blank and duplicate sub-goals are dropped;
    /// without an explicit objective the first sub-goal becomes current.
    pub fn planned<I, S>(instruction: &str, objective: Option<&str>, sub_goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut goal = Self::new(instruction);
        goal.add_sub_goals(sub_goals);
        let objective = objective
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .or_else(|| goal.sub_goals.front().cloned());
        if objective.is_some() {
            goal.current_objective = objective;
        }
        goal
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn sub_goals(&self) -> impl Iterator<Item = &str> {
        self.sub_goals.iter().map(String::as_str)
    }

    pub fn current_objective(&self) -> Option<&str> {
        self.current_objective.as_deref()
    }

    /// Pop the front sub-goal. The objective moves to the next sub-goal, or
    /// back to the instruction once the queue is empty.
    pub fn complete_front(&mut self) -> Option<String> {
        let done = self.sub_goals.pop_front()?;
        self.completed.push(done.clone());
        self.current_objective = self
            .sub_goals
            .front()
            .cloned()
            .or_else(|| (!self.instruction.is_empty()).then(|| self.instruction.clone()));
        Some(done)
    }

    pub fn set_objective(&mut self, objective: &str) {
        let objective = objective.trim();
        if !objective.is_empty() {
            self.current_objective = Some(objective.to_string());
        }
    }

    /// Append sub-goals that are neither pending nor already completed.
    pub fn add_sub_goals<I, S>(&mut self, sub_goals: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for sub_goal in sub_goals {
            let sub_goal = sub_goal.as_ref().trim();
            if sub_goal.is_empty()
                || self.sub_goals.iter().any(|g| g == sub_goal)
                || self.completed.iter().any(|g| g == sub_goal)
            {
                continue;
            }
            self.sub_goals.push_back(sub_goal.to_string());
        }
    }

    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.completed.iter().map(String::as_str)
    }
}
