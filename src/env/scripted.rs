//! Scripted environments that replay canned episodes.
//!
//! The replay ignores the action it is given, which makes runs fully
//! deterministic. Used by `--mock` runs and by controller tests. Each
//! [`EnvKind`] ships with a small pool of realistic episodes; tests can supply
//! their own with [`ScriptedEnv::from_episodes`].

use anyhow::Result;

use super::http::task_from_observation;
use super::traits::{EnvObservation, Environment};
use super::EnvKind;

/// One canned episode. `steps[0]` is returned by `reset`.
#[derive(Debug, Clone)]
pub struct ScriptedEpisode {
    pub task: String,
    pub steps: Vec<ScriptedStep>,
}

impl ScriptedEpisode {
    pub fn new(task: impl Into<String>, steps: Vec<ScriptedStep>) -> Self {
        Self {
            task: task.into(),
            steps,
        }
    }
}

/// A single transition of a canned episode.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    pub observation: String,
    pub reward: f64,
    pub done: bool,
    pub admissible_actions: Option<Vec<String>>,
    /// When set, the adapter fails with this message instead of answering.
    pub error: Option<String>,
}

impl ScriptedStep {
    pub fn obs(observation: impl Into<String>) -> Self {
        Self {
            observation: observation.into(),
            reward: 0.0,
            done: false,
            admissible_actions: None,
            error: None,
        }
    }

    /// A terminal step with `reward`.
    pub fn terminal(observation: impl Into<String>, reward: f64) -> Self {
        Self {
            reward,
            done: true,
            ..Self::obs(observation)
        }
    }

    /// An adapter failure.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::obs("")
        }
    }

    pub fn with_admissible<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admissible_actions = Some(actions.into_iter().map(Into::into).collect());
        self
    }
}

/// Replays [`ScriptedEpisode`]s in order, cycling when the pool runs out.
#[derive(Debug, Clone)]
pub struct ScriptedEnv {
    kind: EnvKind,
    episodes: Vec<ScriptedEpisode>,
    /// Index of the current episode in `episodes`.
    episode_index: usize,
    /// Index of the last returned step within the current episode.
    step_index: usize,
    started: bool,
    done: bool,
}

impl ScriptedEnv {
    /// The built-in pool for `kind`.
    pub fn new(kind: EnvKind) -> Self {
        let episodes = match kind {
            EnvKind::AlfWorld => alfworld_episodes(),
            EnvKind::SciWorld => sciworld_episodes(),
            EnvKind::WebShop => webshop_episodes(),
        };
        Self::from_episodes(kind, episodes)
    }

    pub fn from_episodes(kind: EnvKind, episodes: Vec<ScriptedEpisode>) -> Self {
        Self {
            kind,
            episodes,
            episode_index: 0,
            step_index: 0,
            started: false,
            done: false,
        }
    }

    fn current_episode(&self) -> Result<&ScriptedEpisode> {
        if self.episodes.is_empty() {
            anyhow::bail!("scripted {} environment has no episodes", self.kind);
        }
        Ok(&self.episodes[self.episode_index % self.episodes.len()])
    }

    fn observation_at(&self, index: usize) -> Result<EnvObservation> {
        let episode = self.current_episode()?;
        let Some(step) = episode.steps.get(index) else {
            // Past the end of the script: the episode is truncated.
            return Ok(EnvObservation {
                done: true,
                ..EnvObservation::text("Nothing happens.")
            });
        };
        if let Some(message) = &step.error {
            anyhow::bail!("{message}");
        }
        Ok(EnvObservation {
            text: step.observation.clone(),
            reward: step.reward,
            done: step.done || (index > 0 && index + 1 >= episode.steps.len()),
            info: serde_json::json!({ "episode_index": self.episode_index, "step": index }),
            admissible_actions: step.admissible_actions.clone(),
        })
    }
}

impl Environment for ScriptedEnv {
    async fn reset(&mut self) -> Result<EnvObservation> {
        if self.started {
            self.episode_index += 1;
        }
        self.started = true;
        self.step_index = 0;
        self.done = false;

        let mut obs = self.observation_at(0)?;
        obs.reward = 0.0;
        obs.done = false;
        Ok(obs)
    }

    async fn step(&mut self, _action: &str) -> Result<EnvObservation> {
        if !self.started {
            anyhow::bail!("step called before reset");
        }
        if self.done {
            anyhow::bail!("cannot step in a terminated episode");
        }

        self.step_index += 1;
        let obs = self.observation_at(self.step_index)?;
        self.done = obs.done;
        Ok(obs)
    }

    fn task(&self) -> &str {
        self.current_episode()
            .map(|e| e.task.as_str())
            .unwrap_or_default()
    }

    fn kind(&self) -> EnvKind {
        self.kind
    }
}

// ---------------------------------------------------------------------------
// Built-in episodes
// ---------------------------------------------------------------------------

fn episode_from_initial(initial: &str, steps: Vec<ScriptedStep>) -> ScriptedEpisode {
    let task = task_from_observation(initial).unwrap_or_else(|| initial.to_string());
    let mut all = vec![ScriptedStep::obs(initial)];
    all.extend(steps);
    ScriptedEpisode::new(task, all)
}

fn alfworld_episodes() -> Vec<ScriptedEpisode> {
    vec![
        // Heat task (success)
        episode_from_initial(
            "You are in the middle of a room. Looking quickly around you, you see a cabinet 4, a cabinet 3, a cabinet 2, a cabinet 1, a countertop 2, a countertop 1, a fridge 1, a microwave 1, a sinkbasin 1, a stoveburner 2, and a stoveburner 1.\nYour task is to: heat some potato and put it in countertop.",
            vec![
                ScriptedStep::obs("You arrive at fridge 1. The fridge 1 is closed."),
                ScriptedStep::obs("You open the fridge 1. The fridge 1 is open. In it, you see a potato 1 and a tomato 1."),
                ScriptedStep::obs("You pick up the potato 1 from the fridge 1."),
                ScriptedStep::obs("You arrive at microwave 1. The microwave 1 is closed."),
                ScriptedStep::obs("You heat the potato 1 using the microwave 1."),
                ScriptedStep::obs("You arrive at countertop 1. On the countertop 1, you see a bread 1."),
                ScriptedStep::terminal("You put the potato 1 in/on the countertop 1.", 1.0),
            ],
        ),
        // Clean task with a locked drawer detour (success)
        episode_from_initial(
            "You are in the middle of a room. Looking quickly around you, you see a drawer 2, a drawer 1, a countertop 1, a sinkbasin 1, a shelf 1, and a garbagecan 1.\nYour task is to: put a clean apple in shelf.",
            vec![
                ScriptedStep::obs("The drawer 1 is locked."),
                ScriptedStep::obs("You arrive at countertop 1. On the countertop 1, you see an apple 1 and a knife 1."),
                ScriptedStep::obs("You pick up the apple 1 from the countertop 1."),
                ScriptedStep::obs("You arrive at sinkbasin 1. On the sinkbasin 1, you see nothing."),
                ScriptedStep::obs("You clean the apple 1 using the sinkbasin 1."),
                ScriptedStep::obs("You arrive at shelf 1. On the shelf 1, you see a vase 1."),
                ScriptedStep::terminal("You put the apple 1 in/on the shelf 1.", 1.0),
            ],
        ),
        // Pick-two task (failure: the agent loops)
        episode_from_initial(
            "You are in the middle of a room. Looking quickly around you, you see a bed 1, a desk 1, a drawer 2, a drawer 1, and a shelf 1.\nYour task is to: put two pencils in desk.",
            vec![
                ScriptedStep::obs("You open the drawer 1. The drawer 1 is open. In it, you see a pencil 1."),
                ScriptedStep::obs("You pick up the pencil 1 from the drawer 1."),
                ScriptedStep::obs("You arrive at desk 1. On the desk 1, you see a laptop 1."),
                ScriptedStep::obs("You put the pencil 1 in/on the desk 1."),
                ScriptedStep::obs("Nothing happens."),
                ScriptedStep::obs("Nothing happens."),
                ScriptedStep::terminal("Nothing happens.", 0.0),
            ],
        ),
    ]
}

fn sciworld_episodes() -> Vec<ScriptedEpisode> {
    vec![
        // Boil water (success)
        ScriptedEpisode::new(
            "Your task is to boil water. For compounds without a boiling point, combusting the substance is also acceptable.",
            vec![
                ScriptedStep::obs("This room is called the hallway. In it, you see: a picture, a substance called air. You also see: A door to the kitchen (that is open), A door to the art studio (that is open)."),
                ScriptedStep::obs("You move to the kitchen."),
                ScriptedStep::obs("This room is called the kitchen. In it, you see: a stove, which is turned off. a sink, which is turned off. a cupboard. The cupboard door is closed. a metal pot, which is empty."),
                ScriptedStep::obs("You move the metal pot to the sink."),
                ScriptedStep::obs("The sink is now activated. The metal pot is now full of water."),
                ScriptedStep::obs("You move the metal pot to the stove."),
                ScriptedStep::obs("The stove is now activated."),
                ScriptedStep::obs("The water in the metal pot is heating up."),
                ScriptedStep::terminal("The water in the metal pot boils and becomes steam.", 1.0),
            ],
        ),
        // Measure melting point (failure: thermometer not found)
        ScriptedEpisode::new(
            "Your task is to measure the melting point of chocolate, which is located around the kitchen.",
            vec![
                ScriptedStep::obs("This room is called the kitchen. In it, you see: a fridge. The fridge door is closed. a table. On the table is: a bowl."),
                ScriptedStep::obs("The fridge is now open. In the fridge is: a chocolate, a glass of orange juice."),
                ScriptedStep::obs("You move the chocolate to the inventory."),
                ScriptedStep::obs("No known action matches that input."),
                ScriptedStep::obs("No known action matches that input."),
                ScriptedStep::terminal("No known action matches that input.", 0.0),
            ],
        ),
    ]
}

fn webshop_episodes() -> Vec<ScriptedEpisode> {
    vec![
        // Purchase with the requested option (partial reward)
        ScriptedEpisode::new(
            "i need a long clip-in hair extension which is natural looking, and price lower than 40.00 dollars",
            vec![
                ScriptedStep::obs("WebShop\nInstruction: i need a long clip-in hair extension which is natural looking, and price lower than 40.00 dollars\n[Search]")
                    .with_admissible(["search[long clip-in hair extension natural]"]),
                ScriptedStep::obs("[Back to Search]\nPage 1 (Total results: 3)\n[B09QQLDJ93] Clip in Hair Extensions Long Natural Wavy 22 inch $23.99\n[B0979F2KQ2] Synthetic Ponytail Extension $15.49\n[B08L3T4N5C] Human Hair Halo Extension $89.00")
                    .with_admissible(["click[Back to Search]", "click[B09QQLDJ93]", "click[B0979F2KQ2]", "click[B08L3T4N5C]"]),
                ScriptedStep::obs("[Back to Search]\n[< Prev]\nsize [small] [medium] [large]\nClip in Hair Extensions Long Natural Wavy 22 inch\nPrice: $23.99\n[Description] [Features] [Reviews] [Buy Now]")
                    .with_admissible(["click[Back to Search]", "click[< Prev]", "click[small]", "click[medium]", "click[large]", "click[Buy Now]"]),
                ScriptedStep::obs("You have clicked medium.")
                    .with_admissible(["click[Back to Search]", "click[< Prev]", "click[small]", "click[large]", "click[Buy Now]"]),
                ScriptedStep::terminal("Thank you for shopping with us!", 0.85),
            ],
        ),
        // Over-budget purchase (low reward)
        ScriptedEpisode::new(
            "find me a waterproof running jacket in size medium, price lower than 40.00 dollars",
            vec![
                ScriptedStep::obs("WebShop\nInstruction: find me a waterproof running jacket in size medium, price lower than 40.00 dollars\n[Search]")
                    .with_admissible(["search[waterproof running jacket medium]"]),
                ScriptedStep::obs("[Back to Search]\nPage 1 (Total results: 2)\n[B07RUNJ001] RunElite Waterproof Jacket $59.99\n[B07RUNJ002] BudgetRun Light Jacket $34.99")
                    .with_admissible(["click[Back to Search]", "click[B07RUNJ001]", "click[B07RUNJ002]"]),
                ScriptedStep::obs("[Back to Search]\n[< Prev]\nsize [s] [m] [l]\nRunElite Waterproof Jacket\nPrice: $59.99\n[Buy Now]")
                    .with_admissible(["click[Back to Search]", "click[< Prev]", "click[s]", "click[m]", "click[l]", "click[Buy Now]"]),
                ScriptedStep::terminal("Thank you for shopping with us!", 0.2),
            ],
        ),
    ]
}
