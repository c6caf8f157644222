//! Agent state and the agent arena.

use std::collections::BTreeMap;

use indexmap::IndexMap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::action::{Action, InteractionKind};
use super::config::AgentSpec;
use super::types::{AgentHandle, EntityId, Position, TeamId};
use crate::Id;

/// Running score of an agent, split by origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Score {
    /// Credit owed to the agent alone (including step penalties).
    pub individual: f64,
    /// Credit shared through the agent's team.
    pub team: f64,
}

impl Score {
    pub fn total(&self) -> f64 {
        self.individual + self.team
    }
}

/// State of a single agent in the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    /// Unique identifier for this agent.
    pub id: Id,
    pub position: Position,
    /// Cell the agent was placed on at reset or join.
    pub spawn: Position,
    pub team: Option<TeamId>,
    /// Private role, hidden from other agents unless revealed.
    pub specialization: Option<String>,
    /// The entity this agent is carrying, if any.
    pub carrying: Option<EntityId>,
    pub score: Score,
    pub health: f64,
    /// Remaining cooldown per interaction kind.
    pub cooldowns: BTreeMap<InteractionKind, u32>,
    /// Steps left frozen after being tagged. Zero when active.
    pub tagged_for: u32,
    /// The agent has left play for the rest of the episode.
    pub done: bool,
    /// Action submitted in the most recent step.
    pub last_action: Option<Action>,
    /// Whether the most recent action was an invalid no-op.
    pub last_action_invalid: bool,
}

impl AgentState {
    /// Creates an agent from a roster entry at `position`.
    pub fn new(spec: &AgentSpec, position: Position, health: f64) -> Self {
        Self {
            id: spec.id.clone(),
            position,
            spawn: position,
            team: spec.team.clone(),
            specialization: spec.specialization.clone(),
            carrying: None,
            score: Score::default(),
            health,
            cooldowns: BTreeMap::new(),
            tagged_for: 0,
            done: false,
            last_action: None,
            last_action_invalid: false,
        }
    }

    pub fn is_tagged(&self) -> bool {
        self.tagged_for > 0
    }

    /// Whether the agent may move or interact this step.
    pub fn can_act(&self) -> bool {
        !self.done && !self.is_tagged()
    }

    /// Remaining cooldown for `kind`.
    pub fn cooldown(&self, kind: InteractionKind) -> u32 {
        self.cooldowns.get(&kind).copied().unwrap_or(0)
    }

    pub fn set_cooldown(&mut self, kind: InteractionKind, steps: u32) {
        if steps > 0 {
            self.cooldowns.insert(kind, steps);
        }
    }

    /// True when both agents belong to the same (non-empty) team.
    pub fn is_teammate_of(&self, other: &AgentState) -> bool {
        self.id != other.id && self.team.is_some() && self.team == other.team
    }

    /// Within interaction reach of `other` (Chebyshev distance one).
    pub fn is_adjacent_to(&self, other: &AgentState) -> bool {
        self.position.is_adjacent(&other.position)
    }

    /// Advances per-step timers. Returns `true` when a tag just expired.
    pub fn tick(&mut self) -> bool {
        self.cooldowns.retain(|_, left| {
            *left = left.saturating_sub(1);
            *left > 0
        });
        if self.tagged_for > 0 {
            self.tagged_for -= 1;
            return self.tagged_for == 0;
        }
        false
    }
}

/// Arena of agents indexed by [`AgentHandle`], with an id lookup table
/// whose insertion order is the registration order.
#[derive(Debug, Clone, Default)]
pub struct AgentStore {
    slots: Vec<Option<AgentState>>,
    index: IndexMap<Id, AgentHandle>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes all agents.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    /// Registers a new agent. Returns `None` if the id is already taken.
    pub fn create(&mut self, state: AgentState) -> Option<AgentHandle> {
        if self.index.contains_key(&state.id) {
            return None;
        }
        let handle = match self.slots.iter().position(|s| s.is_none()) {
            Some(free) => {
                self.slots[free] = Some(state.clone());
                AgentHandle(free)
            }
            None => {
                self.slots.push(Some(state.clone()));
                AgentHandle(self.slots.len() - 1)
            }
        };
        self.index.insert(state.id, handle);
        Some(handle)
    }

    /// Unregisters an agent, keeping the registration order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<AgentState> {
        let handle = self.index.shift_remove(id)?;
        self.slots.get_mut(handle.0).and_then(|s| s.take())
    }

    pub fn handle(&self, id: &str) -> Option<AgentHandle> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&AgentState> {
        self.handle(id).and_then(|h| self.by_handle(h))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AgentState> {
        let h = self.handle(id)?;
        self.by_handle_mut(h)
    }

    pub fn by_handle(&self, handle: AgentHandle) -> Option<&AgentState> {
        self.slots.get(handle.0).and_then(|s| s.as_ref())
    }

    pub fn by_handle_mut(&mut self, handle: AgentHandle) -> Option<&mut AgentState> {
        self.slots.get_mut(handle.0).and_then(|s| s.as_mut())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Agent ids in registration order.
    pub fn ids(&self) -> Vec<Id> {
        self.index.keys().cloned().collect()
    }

    /// Agents in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentState> {
        self.index.values().filter_map(|h| self.by_handle(*h))
    }

    /// Applies `f` to every agent in registration order.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut AgentState)) {
        for handle in self.index.values() {
            if let Some(agent) = self.slots.get_mut(handle.0).and_then(|s| s.as_mut()) {
                f(agent);
            }
        }
    }

    /// The agent standing on `pos`, if any.
    pub fn agent_at(&self, pos: &Position) -> Option<&AgentState> {
        self.iter().find(|a| a.position == *pos)
    }

    /// Whether an agent other than those in `excluding` stands on `pos`.
    pub fn is_occupied(&self, pos: &Position, excluding: &[&str]) -> bool {
        self.iter()
            .any(|a| a.position == *pos && !excluding.contains(&a.id.as_str()))
    }

    /// Ids of every agent on `team`, in registration order.
    pub fn team_members(&self, team: &str) -> Vec<Id> {
        self.iter()
            .filter(|a| a.team.as_deref() == Some(team))
            .map(|a| a.id.clone())
            .collect()
    }

    /// Distinct team ids in order of first appearance.
    pub fn teams(&self) -> Vec<TeamId> {
        let mut teams: Vec<TeamId> = Vec::new();
        for team in self.iter().filter_map(|a| a.team.as_ref()) {
            if !teams.contains(team) {
                teams.push(team.clone());
            }
        }
        teams
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, x: i32, y: i32) -> AgentState {
        AgentState::new(&AgentSpec::new(id), Position::new(x, y), 1.0)
    }

    #[test]
    fn create_rejects_duplicates() {
        let mut store = AgentStore::new();
        assert!(store.create(agent("a", 0, 0)).is_some());
        assert!(store.create(agent("a", 1, 1)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn registration_order_survives_removal() {
        let mut store = AgentStore::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            store.create(agent(id, i as i32, 0));
        }
        store.remove("b");
        store.create(agent("d", 5, 5));
        assert_eq!(store.ids(), vec!["a", "c", "d"]);
        // Freed slot is reused.
        assert_eq!(store.handle("d"), Some(AgentHandle(1)));
    }

    #[test]
    fn occupancy_respects_exclusions() {
        let mut store = AgentStore::new();
        store.create(agent("a", 2, 2));
        assert!(store.is_occupied(&Position::new(2, 2), &[]));
        assert!(!store.is_occupied(&Position::new(2, 2), &["a"]));
        assert!(!store.is_occupied(&Position::new(1, 2), &[]));
    }

    #[test]
    fn team_queries() {
        let mut store = AgentStore::new();
        let spec = AgentSpec::new("a").with_team("red");
        store.create(AgentState::new(&spec, Position::new(0, 0), 1.0));
        let spec = AgentSpec::new("b").with_team("blue");
        store.create(AgentState::new(&spec, Position::new(1, 0), 1.0));
        let spec = AgentSpec::new("c").with_team("red");
        store.create(AgentState::new(&spec, Position::new(2, 0), 1.0));
        assert_eq!(store.team_members("red"), vec!["a", "c"]);
        assert_eq!(store.teams(), vec!["red", "blue"]);
        let a = store.get("a").unwrap();
        assert!(a.is_teammate_of(store.get("c").unwrap()));
        assert!(!a.is_teammate_of(store.get("b").unwrap()));
    }

    #[test]
    fn tick_expires_cooldowns_and_tags() {
        let mut a = agent("a", 0, 0);
        a.set_cooldown(InteractionKind::Attack, 2);
        a.tagged_for = 1;
        assert!(a.tick());
        assert_eq!(a.cooldown(InteractionKind::Attack), 1);
        assert!(!a.is_tagged());
        assert!(!a.tick());
        assert_eq!(a.cooldown(InteractionKind::Attack), 0);
        assert!(a.cooldowns.is_empty());
    }
}
