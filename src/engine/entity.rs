//! Entity registry: typed mobile objects and their carrier relation.
//!
//! Entities live in an arena indexed by [`EntityId`]. An entity needing N
//! carriers collects joining agents in a pending set; the pickup completes
//! only when that set reaches N, at which point the carrier set holds
//! exactly those N agents.

use std::collections::BTreeSet;

use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::error::EnvError;
use super::types::{EntityId, Position, TeamId};
use crate::Id;

/// Coarse entity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EntityKind {
    Resource,
    Flag,
    PuzzleElement,
    Goal,
}

impl EntityKind {
    /// Code written into the entity observation channel.
    pub fn code(&self) -> f64 {
        match self {
            EntityKind::Resource => 1.0,
            EntityKind::Flag => 2.0,
            EntityKind::PuzzleElement => 3.0,
            EntityKind::Goal => 4.0,
        }
    }
}

/// Type-specific entity data.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EntityPayload {
    /// A collectable resource. `required_carriers > 1` marks a heavy one.
    Resource {
        value: f64,
        required_carriers: usize,
    },
    /// A team flag and the cell it returns to.
    Flag { team: TeamId, home: Position },
    /// A puzzle node. `visible_to` lists the specializations that can see
    /// it; `None` makes it visible to everyone.
    PuzzleElement {
        element_type: u32,
        visible_to: Option<BTreeSet<String>>,
        solved: bool,
    },
    /// A fixed goal marker.
    Goal { value: f64 },
}

impl EntityPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Resource { .. } => EntityKind::Resource,
            EntityPayload::Flag { .. } => EntityKind::Flag,
            EntityPayload::PuzzleElement { .. } => EntityKind::PuzzleElement,
            EntityPayload::Goal { .. } => EntityKind::Goal,
        }
    }

    /// Number of agents needed to lift this entity. Zero means immovable.
    pub fn required_carriers(&self) -> usize {
        match self {
            EntityPayload::Resource {
                required_carriers, ..
            } => (*required_carriers).max(1),
            EntityPayload::Flag { .. } => 1,
            EntityPayload::PuzzleElement { .. } | EntityPayload::Goal { .. } => 0,
        }
    }
}

/// A mobile object on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub position: Position,
    pub payload: EntityPayload,
    /// Current carriers: empty, or exactly `required_carriers` agents.
    pub carriers: Vec<Id>,
    /// Agents that have joined a multi-carrier pickup still short of the
    /// required count.
    pub pending: BTreeSet<Id>,
    /// Step at which the current carriers completed the pickup.
    pub picked_up_at: Option<u32>,
    /// Carriers at the time of the last drop.
    pub last_carriers: Vec<Id>,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    pub fn required_carriers(&self) -> usize {
        self.payload.required_carriers()
    }

    pub fn is_carried(&self) -> bool {
        !self.carriers.is_empty()
    }

    pub fn is_carried_by(&self, agent: &str) -> bool {
        self.carriers.iter().any(|c| c == agent)
    }

    /// Whether the entity is being moved by several agents in lockstep.
    pub fn is_group_carried(&self) -> bool {
        self.carriers.len() > 1
    }
}

/// Result of a pickup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupOutcome {
    /// The entity cannot be picked up by this agent right now.
    Rejected,
    /// The agent joined a multi-carrier pickup that still needs more agents.
    Joined { have: usize, need: usize },
    /// The carrier set is complete and the entity is in transit.
    Completed,
}

/// Arena of entities.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    slots: Vec<Option<Entity>>,
}

impl EntityRegistry {
    /// Bounded number of random placement attempts before an exhaustive scan.
    pub const SPAWN_ATTEMPTS: usize = 100;

    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every entity and restarts id allocation.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Places a new entity at `position`. The caller validates the cell.
    pub fn spawn_at(&mut self, payload: EntityPayload, position: Position) -> EntityId {
        let id = EntityId(self.slots.len() as u32);
        self.slots.push(Some(Entity {
            id,
            position,
            payload,
            carriers: Vec::new(),
            pending: BTreeSet::new(),
            picked_up_at: None,
            last_carriers: Vec::new(),
        }));
        id
    }

    /// Places a new entity on a random cell accepted by `is_free`.
    ///
    /// Tries [`Self::SPAWN_ATTEMPTS`] random cells of a `width`x`height`
    /// grid, then falls back to a row-major scan over `candidates`.
    pub fn spawn<R: Rng>(
        &mut self,
        payload: EntityPayload,
        rng: &mut R,
        width: i32,
        height: i32,
        is_free: impl Fn(&Position) -> bool,
    ) -> Result<EntityId, EnvError> {
        for _ in 0..Self::SPAWN_ATTEMPTS {
            let p = Position::new(rng.gen_range(0..width), rng.gen_range(0..height));
            if is_free(&p) && self.at(&p).is_empty() {
                return Ok(self.spawn_at(payload, p));
            }
        }
        for y in 0..height {
            for x in 0..width {
                let p = Position::new(x, y);
                if is_free(&p) && self.at(&p).is_empty() {
                    return Ok(self.spawn_at(payload, p));
                }
            }
        }
        Err(EnvError::NoFreeCell {
            what: format!("{:?}", payload.kind()),
        })
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    /// Removes an entity from the registry (e.g. a delivered resource).
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.take())
    }

    /// Live entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of entities located at `pos`.
    pub fn at(&self, pos: &Position) -> Vec<EntityId> {
        self.iter()
            .filter(|e| e.position == *pos)
            .map(|e| e.id)
            .collect()
    }

    /// The entity currently carried by `agent`, if any.
    pub fn carried_by(&self, agent: &str) -> Option<EntityId> {
        self.iter().find(|e| e.is_carried_by(agent)).map(|e| e.id)
    }

    /// Adds `agent`, standing at `agent_pos`, to the carriers of `id`.
    ///
    /// Single-carrier entities require the agent to stand on the entity and
    /// the entity to be uncarried. Multi-carrier entities accept agents on
    /// or adjacent to the entity cell until the required count is reached.
    pub fn pick_up(
        &mut self,
        id: EntityId,
        agent: &str,
        agent_pos: Position,
        step: u32,
    ) -> PickupOutcome {
        let Some(entity) = self.get_mut(id) else {
            return PickupOutcome::Rejected;
        };
        let need = entity.required_carriers();
        if need == 0 || entity.is_carried() || entity.pending.contains(agent) {
            return PickupOutcome::Rejected;
        }

        if need == 1 {
            if entity.position != agent_pos {
                return PickupOutcome::Rejected;
            }
            entity.carriers.push(agent.to_string());
            entity.picked_up_at = Some(step);
            return PickupOutcome::Completed;
        }

        if entity.position.chebyshev(&agent_pos) > 1 {
            return PickupOutcome::Rejected;
        }
        entity.pending.insert(agent.to_string());
        if entity.pending.len() < need {
            trace!(entity = %id, agent, have = entity.pending.len(), need, "joined pickup");
            return PickupOutcome::Joined {
                have: entity.pending.len(),
                need,
            };
        }
        entity.carriers = std::mem::take(&mut entity.pending).into_iter().collect();
        entity.picked_up_at = Some(step);
        PickupOutcome::Completed
    }

    /// Releases `id` if `agent` is one of its carriers. The whole carrier
    /// group lets go at once. Returns the released carriers.
    pub fn drop_entity(&mut self, id: EntityId, agent: &str) -> Option<Vec<Id>> {
        let entity = self.get_mut(id)?;
        if !entity.is_carried_by(agent) {
            return None;
        }
        let released = std::mem::take(&mut entity.carriers);
        entity.last_carriers = released.clone();
        entity.picked_up_at = None;
        Some(released)
    }

    /// Hands a single-carrier entity from `from` to `to`, relocating it to
    /// `to_pos`. Adjacency and team rules are checked by the caller.
    pub fn transfer_carry(
        &mut self,
        id: EntityId,
        from: &str,
        to: &str,
        to_pos: Position,
        step: u32,
    ) -> bool {
        let Some(entity) = self.get_mut(id) else {
            return false;
        };
        if entity.required_carriers() != 1 || !entity.is_carried_by(from) {
            return false;
        }
        entity.carriers = vec![to.to_string()];
        entity.position = to_pos;
        entity.picked_up_at = Some(step);
        true
    }

    /// Removes `agent` from every carrier and pending set, leaving entities
    /// uncarried where they are.
    pub fn release_agent(&mut self, agent: &str) -> Vec<EntityId> {
        let mut released = Vec::new();
        for entity in self.iter_mut() {
            entity.pending.remove(agent);
            if entity.is_carried_by(agent) {
                entity.last_carriers = std::mem::take(&mut entity.carriers);
                entity.picked_up_at = None;
                released.push(entity.id);
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn light() -> EntityPayload {
        EntityPayload::Resource {
            value: 1.0,
            required_carriers: 1,
        }
    }

    fn heavy(n: usize) -> EntityPayload {
        EntityPayload::Resource {
            value: 3.0,
            required_carriers: n,
        }
    }

    #[test]
    fn single_carrier_pickup_requires_shared_cell() {
        let mut reg = EntityRegistry::new();
        let id = reg.spawn_at(light(), Position::new(2, 2));
        assert_eq!(
            reg.pick_up(id, "a", Position::new(2, 3), 0),
            PickupOutcome::Rejected
        );
        assert_eq!(
            reg.pick_up(id, "a", Position::new(2, 2), 0),
            PickupOutcome::Completed
        );
        assert_eq!(reg.carried_by("a"), Some(id));
        // Already carried.
        assert_eq!(
            reg.pick_up(id, "b", Position::new(2, 2), 0),
            PickupOutcome::Rejected
        );
    }

    #[test]
    fn heavy_pickup_completes_only_at_required_size() {
        let mut reg = EntityRegistry::new();
        let id = reg.spawn_at(heavy(2), Position::new(2, 2));
        assert_eq!(
            reg.pick_up(id, "a", Position::new(1, 2), 3),
            PickupOutcome::Joined { have: 1, need: 2 }
        );
        assert!(!reg.get(id).unwrap().is_carried());
        assert_eq!(
            reg.pick_up(id, "b", Position::new(3, 2), 3),
            PickupOutcome::Completed
        );
        let e = reg.get(id).unwrap();
        assert_eq!(e.carriers.len(), 2);
        assert!(e.pending.is_empty());
        assert_eq!(e.picked_up_at, Some(3));
    }

    #[test]
    fn heavy_pickup_rejects_distant_agents() {
        let mut reg = EntityRegistry::new();
        let id = reg.spawn_at(heavy(2), Position::new(2, 2));
        assert_eq!(
            reg.pick_up(id, "a", Position::new(4, 2), 0),
            PickupOutcome::Rejected
        );
    }

    #[test]
    fn drop_releases_whole_group() {
        let mut reg = EntityRegistry::new();
        let id = reg.spawn_at(heavy(2), Position::new(2, 2));
        reg.pick_up(id, "a", Position::new(1, 2), 0);
        reg.pick_up(id, "b", Position::new(3, 2), 0);
        assert_eq!(reg.drop_entity(id, "c"), None);
        let released = reg.drop_entity(id, "a").unwrap();
        assert_eq!(released.len(), 2);
        let e = reg.get(id).unwrap();
        assert!(!e.is_carried());
        assert_eq!(e.last_carriers.len(), 2);
    }

    #[test]
    fn transfer_moves_entity_to_receiver() {
        let mut reg = EntityRegistry::new();
        let id = reg.spawn_at(light(), Position::new(0, 0));
        reg.pick_up(id, "a", Position::new(0, 0), 0);
        assert!(reg.transfer_carry(id, "a", "b", Position::new(1, 0), 1));
        let e = reg.get(id).unwrap();
        assert_eq!(e.carriers, vec!["b".to_string()]);
        assert_eq!(e.position, Position::new(1, 0));
        assert!(!reg.transfer_carry(id, "a", "c", Position::new(0, 0), 1));
    }

    #[test]
    fn release_agent_clears_carry_and_pending() {
        let mut reg = EntityRegistry::new();
        let a = reg.spawn_at(light(), Position::new(0, 0));
        let h = reg.spawn_at(heavy(3), Position::new(3, 3));
        reg.pick_up(a, "x", Position::new(0, 0), 0);
        reg.pick_up(h, "x", Position::new(3, 3), 0);
        let released = reg.release_agent("x");
        assert_eq!(released, vec![a]);
        assert!(!reg.get(a).unwrap().is_carried());
        assert!(reg.get(h).unwrap().pending.is_empty());
    }

    #[test]
    fn spawn_falls_back_to_scan() {
        let mut reg = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(0);
        // Only one acceptable cell.
        let only = Position::new(3, 1);
        let id = reg
            .spawn(light(), &mut rng, 4, 4, |p| *p == only)
            .unwrap();
        assert_eq!(reg.get(id).unwrap().position, only);
        // No acceptable cell left (occupied by an entity).
        assert!(reg.spawn(light(), &mut rng, 4, 4, |p| *p == only).is_err());
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let mut reg = EntityRegistry::new();
        let first = reg.spawn_at(light(), Position::new(0, 0));
        reg.remove(first);
        let second = reg.spawn_at(light(), Position::new(0, 0));
        assert_ne!(first, second);
        assert_eq!(reg.len(), 1);
    }
}
