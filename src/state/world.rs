//! World state `W_t`: location, inventory, entity status and discovered
//! entities.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::patch::WorldPatch;

/// Default cap on tracked entities, shared by `entity_status` and
/// `discovered`.
pub const DEFAULT_MAX_ENTITIES: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    location: Option<String>,
    inventory: BTreeSet<String>,
    entities: BTreeMap<String, String>,
    /// Entity names in `entities`, least recently updated first.
    entity_order: VecDeque<String>,
    /// Discovery order, oldest first.
    discovered: VecDeque<String>,
    max_entities: usize,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTITIES)
    }
}

impl WorldState {
    /// An empty world tracking at most `max_entities` entity statuses and
    /// `max_entities` discoveries beyond the inventory.
    pub fn new(max_entities: usize) -> Self {
        Self {
            location: None,
            inventory: BTreeSet::new(),
            entities: BTreeMap::new(),
            entity_order: VecDeque::new(),
            discovered: VecDeque::new(),
            max_entities: max_entities.max(1),
        }
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn inventory(&self) -> impl Iterator<Item = &str> {
        self.inventory.iter().map(String::as_str)
    }

    pub fn entities(&self) -> &BTreeMap<String, String> {
        &self.entities
    }

    pub fn discovered(&self) -> impl Iterator<Item = &str> {
        self.discovered.iter().map(String::as_str)
    }

    pub fn holds(&self, item: &str) -> bool {
        self.inventory.contains(item)
    }

    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.inventory.is_empty()
            && self.entities.is_empty()
            && self.discovered.is_empty()
    }

    fn discover(&mut self, entity: &str) {
        if !self.discovered.iter().any(|e| e == entity) {
            self.discovered.push_back(entity.to_string());
        }
    }

    fn set_status(&mut self, entity: &str, status: &str) {
        self.entity_order.retain(|e| e != entity);
        self.entity_order.push_back(entity.to_string());
        self.entities.insert(entity.to_string(), status.to_string());
    }

    /// Evict the oldest statuses and discoveries past the bound. Held items
    /// stay discovered.
    fn enforce_bounds(&mut self) {
        while self.entity_order.len() > self.max_entities {
            if let Some(oldest) = self.entity_order.pop_front() {
                self.entities.remove(&oldest);
            }
        }
        let mut excess = self
            .discovered
            .iter()
            .filter(|e| !self.inventory.contains(*e))
            .count()
            .saturating_sub(self.max_entities);
        if excess == 0 {
            return;
        }
        let inventory = &self.inventory;
        self.discovered.retain(|e| {
            if excess > 0 && !inventory.contains(e) {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    /// Merge `patch` into the world. Omitted fields leave state unchanged.
    /// Returns the new location when the patch moved the agent.
    pub fn apply(&mut self, patch: &WorldPatch) -> Option<String> {
        for item in &patch.inventory_remove {
            self.inventory.remove(item.trim());
        }
        for item in patch.inventory_add.iter().map(|i| i.trim()) {
            if item.is_empty() {
                continue;
            }
            self.inventory.insert(item.to_string());
            self.discover(item);
        }
        for (entity, status) in &patch.entity_status {
            let entity = entity.trim();
            if !entity.is_empty() {
                self.set_status(entity, status.trim());
                self.discover(entity);
            }
        }
        for entity in patch.discovered.iter().map(|e| e.trim()) {
            if !entity.is_empty() {
                self.discover(entity);
            }
        }
        self.enforce_bounds();

        let location = patch
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())?;
        if self.location.as_deref() == Some(location) {
            return None;
        }
        self.location = Some(location.to_string());
        Some(location.to_string())
    }
}
