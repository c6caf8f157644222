//! Greedy resource-collection baseline.
//!
//! Walks toward the nearest visible free resource, picks it up, carries it
//! to the nearest depot it knows of and drops it there. Depots are learned
//! from the terrain channel of past observations.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::trace;

use super::trait_::Policy;
use crate::engine::{
    Action, Direction, EntityKind, GridCell, Interaction, Observation, Position, SpecialKind,
};
use crate::Id;

/// Greedy single-carrier collector.
///
/// Heavy resources are ignored: a lone agent cannot lift one and the
/// policy does not coordinate helpers. When nothing useful is in sight the
/// agent wanders at random.
pub struct GreedyCollectorPolicy {
    rng: StdRng,
    /// Depots seen so far by each agent.
    depots: BTreeMap<Id, BTreeSet<Position>>,
}

impl GreedyCollectorPolicy {
    /// Creates a greedy collector.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed for the wandering moves.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            depots: BTreeMap::new(),
        }
    }

    /// Seeds every agent's depot memory with known positions.
    pub fn with_depots(mut self, agents: &[Id], depots: &[Position]) -> Self {
        for agent in agents {
            self.depots
                .entry(agent.clone())
                .or_default()
                .extend(depots.iter().copied());
        }
        self
    }

    /// Forgets every learned depot.
    pub fn clear(&mut self) {
        self.depots.clear();
    }

    /// Records depots visible in the observation's terrain channel.
    fn remember_depots(&mut self, obs: &Observation) {
        let size = obs.view.size;
        let d = (size / 2) as i32;
        let depot = GridCell::Special(SpecialKind::Depot).code();
        let known = self.depots.entry(obs.agent.clone()).or_default();
        for row in 0..size {
            for col in 0..size {
                if obs.view.get(0, row, col) == depot {
                    known.insert(Position::new(
                        obs.me.position.x + col as i32 - d,
                        obs.me.position.y + row as i32 - d,
                    ));
                }
            }
        }
    }

    /// Whether the cell one step in `direction` shows as an obstacle.
    fn blocked(obs: &Observation, direction: Direction) -> bool {
        let d = obs.view.size / 2;
        let (dx, dy) = direction.delta();
        let row = d as i32 + dy;
        let col = d as i32 + dx;
        obs.view.get(0, row as usize, col as usize) == GridCell::Obstacle.code()
    }

    fn toward(&mut self, obs: &Observation, target: &Position) -> Action {
        match obs.me.position.step_toward(target) {
            Some(direction) if !Self::blocked(obs, direction) => Action::moving(direction),
            Some(_) => self.wander(obs),
            None => Action::stay(),
        }
    }

    fn wander(&mut self, obs: &Observation) -> Action {
        let open: Vec<Direction> = Direction::ALL
            .iter()
            .copied()
            .filter(|d| !Self::blocked(obs, *d))
            .collect();
        open.choose(&mut self.rng)
            .map(|d| Action::moving(*d))
            .unwrap_or_default()
    }

    fn decide(&mut self, obs: &Observation) -> Action {
        let here = obs.me.position;

        if obs.me.carrying.is_some() {
            let nearest = self
                .depots
                .get(&obs.agent)
                .and_then(|known| known.iter().min_by_key(|p| (p.manhattan(&here), **p)).copied());
            return match nearest {
                Some(depot) if depot == here => Action::interact(Interaction::Drop),
                Some(depot) => self.toward(obs, &depot),
                None => self.wander(obs),
            };
        }

        let target = obs
            .nearby_entities
            .iter()
            .filter(|e| e.kind == EntityKind::Resource && !e.carried && e.required_carriers <= 1)
            .min_by_key(|e| (e.distance, e.id));
        match target {
            Some(e) if e.position == here => Action::interact(Interaction::PickUp),
            Some(e) => {
                let position = e.position;
                self.toward(obs, &position)
            }
            None => self.wander(obs),
        }
    }
}

impl Policy for GreedyCollectorPolicy {
    fn select_actions(&mut self, observations: &BTreeMap<Id, Observation>) -> BTreeMap<Id, Action> {
        observations
            .iter()
            .map(|(id, obs)| {
                self.remember_depots(obs);
                let action = self.decide(obs);
                trace!(agent = %id, kind = ?action.kind, "greedy choice");
                (id.clone(), action)
            })
            .collect()
    }

    fn name(&self) -> &str {
        "greedy_collector"
    }
}
