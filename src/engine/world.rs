//! The single committed simulation state: grid, entities, agents and
//! messages, plus the cross-component checks that tie them together.

use std::collections::BTreeMap;

use super::agent::AgentStore;
use super::entity::EntityRegistry;
use super::error::EnvError;
use super::grid::Grid;
use super::message::MessageLog;
use super::types::{EntityId, Position};
use crate::Id;

/// Full simulation state owned by one environment.
#[derive(Debug, Clone)]
pub struct World {
    pub grid: Grid,
    pub entities: EntityRegistry,
    pub agents: AgentStore,
    pub messages: MessageLog,
    /// Steps resolved so far in the current episode.
    pub step: u32,
}

impl World {
    pub fn new(grid: Grid, message_retention: u32) -> Self {
        Self {
            grid,
            entities: EntityRegistry::new(),
            agents: AgentStore::new(),
            messages: MessageLog::new(message_retention),
            step: 0,
        }
    }

    /// Bounds, obstacle and occupancy checks in one: whether an agent may
    /// stand on `pos` given the agents in `excluding` are out of the way.
    pub fn can_enter(&self, pos: &Position, excluding: &[&str]) -> bool {
        self.grid.is_in_bounds(pos)
            && !self.grid.is_obstacle(pos)
            && !self.agents.is_occupied(pos, excluding)
    }

    /// A cell no agent stands on and that is not blocked.
    pub fn is_free(&self, pos: &Position) -> bool {
        self.can_enter(pos, &[])
    }

    /// Releases whatever `agent` carries (the whole carrier group lets go)
    /// and clears the carried reference of every released carrier.
    pub fn drop_carried(&mut self, agent: &str) -> Option<(EntityId, Vec<Id>)> {
        let id = self.agents.get(agent)?.carrying?;
        let released = self.entities.drop_entity(id, agent)?;
        for carrier in &released {
            if let Some(a) = self.agents.get_mut(carrier) {
                a.carrying = None;
            }
        }
        Some((id, released))
    }

    /// Verifies the occupancy and carrier invariants.
    pub fn check_invariants(&self) -> Result<(), EnvError> {
        let mut occupied: BTreeMap<Position, &str> = BTreeMap::new();
        for agent in self.agents.iter() {
            if !self.grid.is_in_bounds(&agent.position) || self.grid.is_obstacle(&agent.position)
            {
                return Err(EnvError::InvariantViolation(format!(
                    "agent {} stands on blocked cell {}",
                    agent.id, agent.position
                )));
            }
            if let Some(other) = occupied.insert(agent.position, &agent.id) {
                return Err(EnvError::InvariantViolation(format!(
                    "agents {} and {} share cell {}",
                    other, agent.id, agent.position
                )));
            }
            if let Some(id) = agent.carrying {
                let carried = self
                    .entities
                    .get(id)
                    .map(|e| e.is_carried_by(&agent.id))
                    .unwrap_or(false);
                if !carried {
                    return Err(EnvError::InvariantViolation(format!(
                        "agent {} claims to carry {} which it does not hold",
                        agent.id, id
                    )));
                }
            }
        }

        for entity in self.entities.iter() {
            let n = entity.carriers.len();
            if n != 0 && n != entity.required_carriers() {
                return Err(EnvError::InvariantViolation(format!(
                    "entity {} has {} carriers, needs {}",
                    entity.id,
                    n,
                    entity.required_carriers()
                )));
            }
            for carrier in &entity.carriers {
                let Some(agent) = self.agents.get(carrier) else {
                    return Err(EnvError::InvariantViolation(format!(
                        "entity {} carried by unknown agent {}",
                        entity.id, carrier
                    )));
                };
                if agent.carrying != Some(entity.id) {
                    return Err(EnvError::InvariantViolation(format!(
                        "entity {} carried by {} which carries {:?}",
                        entity.id, carrier, agent.carrying
                    )));
                }
                let in_reach = if n == 1 {
                    agent.position == entity.position
                } else {
                    agent.position.chebyshev(&entity.position) <= 1
                };
                if !in_reach {
                    return Err(EnvError::InvariantViolation(format!(
                        "entity {} at {} detached from carrier {} at {}",
                        entity.id, entity.position, carrier, agent.position
                    )));
                }
            }
        }
        Ok(())
    }
}
