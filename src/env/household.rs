//! Offline ALFWorld-style household simulator.
//!
//! A single kitchen with receptacles, some of which must be opened before their
//! contents are reachable. The task is to heat a mug and put it in a cabinet.
//! The simulator publishes the admissible commands after every transition,
//! which makes it a convenient target for end-to-end runs without a server.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use super::traits::{EnvObservation, Environment};
use super::EnvKind;

const TASK: &str = "heat some mug and put it in cabinet.";

const INITIAL_OBSERVATION: &str = "You are in the middle of a room. Looking quickly around you, you see a cabinet 6, a cabinet 5, a cabinet 4, a cabinet 3, a cabinet 2, a cabinet 1, a coffeemachine 1, a countertop 3, a countertop 2, a countertop 1, a drawer 3, a drawer 2, a drawer 1, a fridge 1, a garbagecan 1, a microwave 1, a shelf 3, a shelf 2, a shelf 1, a sinkbasin 1, a stoveburner 4, a stoveburner 3, a stoveburner 2, a stoveburner 1, and a toaster 1.";

const NOTHING: &str = "Nothing happened.";

/// Initial contents of every receptacle.
const LAYOUT: &[(&str, &[&str])] = &[
    ("cabinet 1", &["mug 3"]),
    ("cabinet 2", &[]),
    ("cabinet 3", &["plate 1"]),
    ("cabinet 4", &["bowl 1"]),
    ("cabinet 5", &[]),
    ("cabinet 6", &["soapbottle 1"]),
    ("coffeemachine 1", &["mug 2"]),
    ("countertop 1", &["creditcard 1", "potato 2"]),
    (
        "countertop 2",
        &["butterknife 1", "knife 1", "peppershaker 2", "spoon 1", "tomato 1", "vase 3", "vase 2"],
    ),
    (
        "countertop 3",
        &[
            "butterknife 3",
            "butterknife 2",
            "cellphone 2",
            "creditcard 2",
            "dishsponge 3",
            "glassbottle 3",
            "houseplant 1",
            "knife 3",
            "knife 2",
            "pan 2",
            "saltshaker 2",
            "soapbottle 3",
            "spoon 3",
            "statue 1",
            "tomato 2",
        ],
    ),
    ("drawer 1", &["fork 1"]),
    ("drawer 2", &["spoon 2"]),
    ("drawer 3", &[]),
    ("fridge 1", &["apple 1", "lettuce 1", "mug 1", "tomato 3"]),
    ("garbagecan 1", &[]),
    ("microwave 1", &[]),
    ("shelf 1", &["peppershaker 1"]),
    ("shelf 2", &["vase 1"]),
    ("shelf 3", &["statue 2"]),
    ("sinkbasin 1", &[]),
    ("stoveburner 1", &[]),
    ("stoveburner 2", &[]),
    ("stoveburner 3", &[]),
    ("stoveburner 4", &["pot 1"]),
    ("toaster 1", &[]),
];

/// Receptacles that start closed.
const NEEDS_OPEN: &[&str] = &[
    "fridge 1",
    "microwave 1",
    "cabinet 1",
    "cabinet 2",
    "cabinet 3",
    "cabinet 4",
    "cabinet 5",
    "cabinet 6",
];

// ---------------------------------------------------------------------------
// Command parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    GoTo(String),
    Take(String, String),
    Put(String, String),
    Open(String),
    Close(String),
    Heat(String, String),
    Cool(String, String),
    Clean(String, String),
    Examine(String),
    Look,
    Inventory,
}

static TWO_ARG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(take|heat|cool|clean) (.+?) (?:from|with) (.+)$").expect("valid regex")
});
static PUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^put (.+?) (?:in/on|in|on) (.+)$").expect("valid regex"));

fn parse_command(action: &str) -> Option<Command> {
    let action = action.trim().to_lowercase();
    let action = action.split_whitespace().collect::<Vec<_>>().join(" ");

    match action.as_str() {
        "look" | "look around" => return Some(Command::Look),
        "inventory" => return Some(Command::Inventory),
        _ => {}
    }
    if let Some(caps) = PUT_RE.captures(&action) {
        return Some(Command::Put(caps[1].to_string(), caps[2].to_string()));
    }
    if let Some(caps) = TWO_ARG_RE.captures(&action) {
        let (obj, recep) = (caps[2].to_string(), caps[3].to_string());
        return match &caps[1] {
            "take" => Some(Command::Take(obj, recep)),
            "heat" => Some(Command::Heat(obj, recep)),
            "cool" => Some(Command::Cool(obj, recep)),
            _ => Some(Command::Clean(obj, recep)),
        };
    }
    if let Some(rest) = action.strip_prefix("go to ") {
        return Some(Command::GoTo(rest.to_string()));
    }
    if let Some(rest) = action.strip_prefix("open ") {
        return Some(Command::Open(rest.to_string()));
    }
    if let Some(rest) = action.strip_prefix("close ") {
        return Some(Command::Close(rest.to_string()));
    }
    action
        .strip_prefix("examine ")
        .or_else(|| action.strip_prefix("look at "))
        .map(|rest| Command::Examine(rest.to_string()))
}

fn list_items(items: &[String]) -> String {
    if items.is_empty() {
        "nothing".to_string()
    } else {
        items
            .iter()
            .map(|i| format!("a {i}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// The household simulator.
#[derive(Debug, Clone)]
pub struct HouseholdEnv {
    max_steps: usize,
    steps: usize,
    location: Option<String>,
    inventory: Vec<String>,
    contents: BTreeMap<String, Vec<String>>,
    open: BTreeSet<String>,
    heated: BTreeSet<String>,
    cooled: BTreeSet<String>,
    cleaned: BTreeSet<String>,
    success: bool,
    done: bool,
}

impl Default for HouseholdEnv {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HouseholdEnv {
    /// A fresh kitchen. The episode times out after `max_steps` actions.
    pub fn new(max_steps: usize) -> Self {
        let mut env = Self {
            max_steps,
            steps: 0,
            location: None,
            inventory: Vec::new(),
            contents: BTreeMap::new(),
            open: BTreeSet::new(),
            heated: BTreeSet::new(),
            cooled: BTreeSet::new(),
            cleaned: BTreeSet::new(),
            success: false,
            done: false,
        };
        env.restore_layout();
        env
    }

    fn restore_layout(&mut self) {
        self.steps = 0;
        self.location = None;
        self.inventory.clear();
        self.open.clear();
        self.heated.clear();
        self.cooled.clear();
        self.cleaned.clear();
        self.success = false;
        self.done = false;
        self.contents = LAYOUT
            .iter()
            .map(|(recep, items)| {
                (
                    recep.to_string(),
                    items.iter().map(|i| i.to_string()).collect(),
                )
            })
            .collect();
    }

    fn is_closed(&self, recep: &str) -> bool {
        NEEDS_OPEN.contains(&recep) && !self.open.contains(recep)
    }

    fn holding(&self, obj: &str) -> bool {
        self.inventory.iter().any(|i| i == obj)
    }

    fn execute(&mut self, command: Command) -> String {
        match command {
            Command::GoTo(recep) => {
                let Some(items) = self.contents.get(&recep) else {
                    return NOTHING.into();
                };
                let text = if self.is_closed(&recep) {
                    format!("You arrive at {recep}. The {recep} is closed.")
                } else {
                    format!("You arrive at {recep}. On the {recep}, you see {}.", list_items(items))
                };
                self.location = Some(recep);
                text
            }
            Command::Take(obj, recep) => {
                if !self.inventory.is_empty() || self.is_closed(&recep) {
                    return NOTHING.into();
                }
                let Some(items) = self.contents.get_mut(&recep) else {
                    return NOTHING.into();
                };
                match items.iter().position(|i| *i == obj) {
                    Some(pos) => {
                        items.remove(pos);
                        self.inventory.push(obj.clone());
                        format!("You pick up the {obj} from the {recep}.")
                    }
                    None => NOTHING.into(),
                }
            }
            Command::Put(obj, recep) => {
                if !self.holding(&obj) || self.is_closed(&recep) {
                    return NOTHING.into();
                }
                let Some(items) = self.contents.get_mut(&recep) else {
                    return NOTHING.into();
                };
                items.push(obj.clone());
                self.inventory.retain(|i| *i != obj);
                if obj.starts_with("mug") && self.heated.contains(&obj) && recep.starts_with("cabinet")
                {
                    self.success = true;
                    self.done = true;
                }
                format!("You put the {obj} in/on the {recep}.")
            }
            Command::Open(recep) => {
                if !NEEDS_OPEN.contains(&recep.as_str()) {
                    return NOTHING.into();
                }
                if self.open.contains(&recep) {
                    return format!("The {recep} is already open.");
                }
                let items = list_items(self.contents.get(&recep).map(Vec::as_slice).unwrap_or(&[]));
                self.open.insert(recep.clone());
                self.location = Some(recep.clone());
                format!("You open the {recep}. The {recep} is open. In it, you see {items}.")
            }
            Command::Close(recep) => {
                if !NEEDS_OPEN.contains(&recep.as_str()) {
                    return NOTHING.into();
                }
                if self.open.remove(&recep) {
                    format!("You close the {recep}.")
                } else {
                    format!("The {recep} is already closed.")
                }
            }
            Command::Heat(obj, recep) => {
                if !self.holding(&obj) || !recep.contains("microwave") {
                    return NOTHING.into();
                }
                self.heated.insert(obj.clone());
                format!("You heat the {obj} using the {recep}.")
            }
            Command::Cool(obj, recep) => {
                if !self.holding(&obj) || !recep.contains("fridge") {
                    return NOTHING.into();
                }
                self.cooled.insert(obj.clone());
                format!("You cool the {obj} using the {recep}.")
            }
            Command::Clean(obj, recep) => {
                if !self.holding(&obj) || !recep.contains("sinkbasin") {
                    return NOTHING.into();
                }
                self.cleaned.insert(obj.clone());
                format!("You clean the {obj} using the {recep}.")
            }
            Command::Examine(target) => {
                if !self.holding(&target) {
                    return NOTHING.into();
                }
                let status: Vec<&str> = [
                    (self.heated.contains(&target), "heated"),
                    (self.cooled.contains(&target), "cooled"),
                    (self.cleaned.contains(&target), "cleaned"),
                ]
                .into_iter()
                .filter_map(|(set, label)| set.then_some(label))
                .collect();
                if status.is_empty() {
                    format!("This is a {target}.")
                } else {
                    format!("The {target} is {}.", status.join(", "))
                }
            }
            Command::Look => match &self.location {
                None => INITIAL_OBSERVATION.to_string(),
                Some(recep) if self.is_closed(recep) => {
                    format!("You are facing the {recep}. The {recep} is closed.")
                }
                Some(recep) => {
                    let items = self.contents.get(recep).map(Vec::as_slice).unwrap_or(&[]);
                    format!("You are facing the {recep}. Next to it, you see {}.", list_items(items))
                }
            },
            Command::Inventory => {
                if self.inventory.is_empty() {
                    "You are not carrying anything.".to_string()
                } else {
                    format!("You are carrying: {}.", list_items(&self.inventory))
                }
            }
        }
    }

    /// Commands accepted in the current state.
    pub fn admissible_commands(&self) -> Vec<String> {
        let mut commands = vec!["look".to_string(), "inventory".to_string()];
        commands.extend(self.contents.keys().map(|r| format!("go to {r}")));
        for recep in NEEDS_OPEN {
            if self.open.contains(*recep) {
                commands.push(format!("close {recep}"));
            } else {
                commands.push(format!("open {recep}"));
            }
        }
        match (self.inventory.first(), &self.location) {
            (None, Some(recep)) if !self.is_closed(recep) => {
                if let Some(items) = self.contents.get(recep) {
                    commands.extend(items.iter().map(|obj| format!("take {obj} from {recep}")));
                }
            }
            (Some(obj), _) => {
                commands.extend(self.contents.keys().map(|r| format!("put {obj} in/on {r}")));
                commands.push(format!("heat {obj} with microwave 1"));
                commands.push(format!("cool {obj} with fridge 1"));
                commands.push(format!("clean {obj} with sinkbasin 1"));
                commands.push(format!("examine {obj}"));
            }
            _ => {}
        }
        commands
    }

    fn observation(&self, text: String, reward: f64) -> EnvObservation {
        EnvObservation {
            text,
            reward,
            done: self.done,
            info: serde_json::json!({ "success": self.success, "steps": self.steps }),
            admissible_actions: Some(self.admissible_commands()),
        }
    }
}

impl Environment for HouseholdEnv {
    async fn reset(&mut self) -> Result<EnvObservation> {
        self.restore_layout();
        Ok(self.observation(format!("{INITIAL_OBSERVATION}\nYour task is to: {TASK}"), 0.0))
    }

    async fn step(&mut self, action: &str) -> Result<EnvObservation> {
        if self.done {
            anyhow::bail!("cannot step in a terminated episode");
        }
        self.steps += 1;
        if self.steps >= self.max_steps {
            self.done = true;
            return Ok(self.observation("Episode timed out.".into(), 0.0));
        }

        let text = match parse_command(action) {
            Some(command) => self.execute(command),
            None => NOTHING.into(),
        };
        let reward = if self.success { 1.0 } else { 0.0 };
        Ok(self.observation(text, reward))
    }

    fn task(&self) -> &str {
        TASK
    }

    fn kind(&self) -> EnvKind {
        EnvKind::AlfWorld
    }
}
