//! Collaborative puzzle: agents with different specializations solve
//! nodes together.
//!
//! Each solution node is visible only to one specialization, so agents
//! who can see a node must call the others over. A node is solved when
//! enough distinct agents next to it activate in the same step.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use tracing::debug;

use super::{in_grid, spawn_on_floor};
use crate::engine::{
    AgentState, ConfigError, EntityId, EntityPayload, EnvConfig, EnvError, InteractionKind,
    Position, RewardCause, RewardEvent, Scenario, World,
};
use crate::Id;

/// Configuration of [`CollaborativePuzzle`].
#[derive(Debug, Clone, PartialEq)]
pub struct PuzzleConfig {
    /// Solution nodes placed at reset.
    pub nodes: usize,
    /// Distinct adjacent agents that must activate a node in one step.
    pub required_activators: usize,
    /// Node `i` is visible to `specializations[i % len]`. Empty makes every
    /// node visible to everyone.
    pub specializations: Vec<String>,
    /// Fixed cells for the first nodes. The rest are placed at random.
    pub positions: Vec<Position>,
    /// Reward per activator of a solved node.
    pub solve_reward: f64,
}

impl Default for PuzzleConfig {
    fn default() -> Self {
        Self {
            nodes: 3,
            required_activators: 2,
            specializations: vec!["scout".to_string(), "engineer".to_string()],
            positions: Vec::new(),
            solve_reward: 1.0,
        }
    }
}

/// Cooperative puzzle scenario.
#[derive(Debug, Clone, Default)]
pub struct CollaborativePuzzle {
    pub config: PuzzleConfig,
    /// Activations gathered during the current step.
    activations: BTreeMap<EntityId, BTreeSet<Id>>,
    solved: usize,
}

impl CollaborativePuzzle {
    pub fn new(config: PuzzleConfig) -> Self {
        Self {
            config,
            activations: BTreeMap::new(),
            solved: 0,
        }
    }

    pub fn solved(&self) -> usize {
        self.solved
    }

    fn node_payload(&self, index: usize) -> EntityPayload {
        let visible_to = if self.config.specializations.is_empty() {
            None
        } else {
            let spec = &self.config.specializations[index % self.config.specializations.len()];
            Some(BTreeSet::from([spec.clone()]))
        };
        EntityPayload::PuzzleElement {
            element_type: index as u32,
            visible_to,
            solved: false,
        }
    }
}

impl Scenario for CollaborativePuzzle {
    fn name(&self) -> &str {
        "collaborative_puzzle"
    }

    fn validate(&self, config: &EnvConfig) -> Result<(), ConfigError> {
        if self.config.required_activators == 0 {
            return Err(ConfigError::Scenario(
                "a node needs at least one activator".to_string(),
            ));
        }
        if !config.agents.is_empty() && self.config.required_activators > config.agents.len() {
            return Err(ConfigError::Scenario(format!(
                "nodes need {} activators but only {} agents are configured",
                self.config.required_activators,
                config.agents.len()
            )));
        }
        if let Some(bad) = self.config.positions.iter().find(|p| !in_grid(config, p)) {
            return Err(ConfigError::Scenario(format!("puzzle node {bad} is off the grid")));
        }
        Ok(())
    }

    fn populate(&mut self, world: &mut World, rng: &mut StdRng) -> Result<(), EnvError> {
        self.activations.clear();
        self.solved = 0;
        for i in 0..self.config.nodes {
            let payload = self.node_payload(i);
            match self.config.positions.get(i) {
                Some(at) => {
                    world.entities.spawn_at(payload, *at);
                }
                None => {
                    spawn_on_floor(world, payload, rng)?;
                }
            }
        }
        Ok(())
    }

    fn allows(&self, kind: InteractionKind) -> bool {
        kind == InteractionKind::Activate
    }

    /// Registers an activation of the nearest unsolved node within reach.
    /// Agents cannot activate nodes hidden from their specialization.
    fn activate(
        &mut self,
        world: &mut World,
        agent: &str,
        _events: &mut Vec<RewardEvent>,
    ) -> bool {
        let Some(me) = world.agents.get(agent) else {
            return false;
        };
        let node = world
            .entities
            .iter()
            .filter(|e| {
                matches!(e.payload, EntityPayload::PuzzleElement { solved: false, .. })
                    && e.position.chebyshev(&me.position) <= 1
                    && self.entity_visible(e, me)
            })
            .min_by_key(|e| (e.position.chebyshev(&me.position), e.id))
            .map(|e| e.id);
        match node {
            Some(id) => self
                .activations
                .entry(id)
                .or_default()
                .insert(agent.to_string()),
            None => false,
        }
    }

    fn lifecycle(&mut self, world: &mut World, events: &mut Vec<RewardEvent>) {
        let activations = std::mem::take(&mut self.activations);
        for (id, agents) in activations {
            if agents.len() < self.config.required_activators {
                continue;
            }
            let Some(node) = world.entities.get_mut(id) else {
                continue;
            };
            if let EntityPayload::PuzzleElement { solved, .. } = &mut node.payload {
                if *solved {
                    continue;
                }
                *solved = true;
            }
            self.solved += 1;
            debug!(node = %id, activators = agents.len(), "puzzle node solved");
            for agent in agents {
                events.push(RewardEvent::new(
                    agent,
                    self.config.solve_reward,
                    RewardCause::PuzzleSolved,
                ));
            }
        }
    }

    fn goal_reached(&self, _world: &World) -> bool {
        self.config.nodes > 0 && self.solved >= self.config.nodes
    }

    fn counters(&self, _world: &World, _agent: &AgentState) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("solved".to_string(), self.solved as f64),
            ("nodes".to_string(), self.config.nodes as f64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Action, AgentSpec, GridEnvironment, Interaction, ObstacleLayout};

    fn env(node: Position) -> GridEnvironment<CollaborativePuzzle> {
        env_with(node, PuzzleConfig::default().specializations)
    }

    /// Every node visible to both agents.
    fn open_env(node: Position) -> GridEnvironment<CollaborativePuzzle> {
        env_with(node, Vec::new())
    }

    fn env_with(
        node: Position,
        specializations: Vec<String>,
    ) -> GridEnvironment<CollaborativePuzzle> {
        let config = EnvConfig {
            width: 5,
            height: 5,
            obstacles: ObstacleLayout::None,
            view_distance: 4,
            agents: vec![
                AgentSpec::new("s")
                    .with_specialization("scout")
                    .at(Position::new(1, 2)),
                AgentSpec::new("e")
                    .with_specialization("engineer")
                    .at(Position::new(3, 2)),
            ],
            step_penalty: 0.0,
            ..EnvConfig::default()
        };
        let scenario = CollaborativePuzzle::new(PuzzleConfig {
            nodes: 1,
            positions: vec![node],
            specializations,
            ..PuzzleConfig::default()
        });
        GridEnvironment::new(config, scenario).unwrap()
    }

    fn activate(env: &mut GridEnvironment<CollaborativePuzzle>, ids: &[&str]) {
        let actions = ids
            .iter()
            .map(|id| (id.to_string(), Action::interact(Interaction::Activate)))
            .collect();
        env.step(&actions).unwrap();
    }

    #[test]
    fn node_is_only_visible_to_its_specialization() {
        let mut env = env(Position::new(2, 0));
        env.reset().unwrap();
        let scout = env.observe("s").unwrap();
        let engineer = env.observe("e").unwrap();
        assert_eq!(scout.nearby_entities.len(), 1);
        assert!(engineer.nearby_entities.is_empty());
    }

    #[test]
    fn single_activation_does_not_solve() {
        let mut env = open_env(Position::new(2, 2));
        env.reset().unwrap();
        activate(&mut env, &["s"]);
        assert_eq!(env.scenario().solved(), 0);
        // Activations do not carry over into the next step.
        activate(&mut env, &["e"]);
        assert_eq!(env.scenario().solved(), 0);
    }

    #[test]
    fn joint_activation_solves_and_ends_episode() {
        let mut env = open_env(Position::new(2, 2));
        env.reset().unwrap();
        activate(&mut env, &["s", "e"]);
        assert_eq!(env.scenario().solved(), 1);
        assert!((env.agent("e").unwrap().score.individual - 1.0).abs() < 1e-12);
        assert_eq!(env.phase(), crate::engine::EpisodePhase::Done);
    }

    #[test]
    fn activation_out_of_reach_is_invalid() {
        let mut env = open_env(Position::new(0, 0));
        env.reset().unwrap();
        activate(&mut env, &["e"]);
        assert!(env.agent("e").unwrap().last_action_invalid);
    }

    #[test]
    fn hidden_node_cannot_be_activated() {
        let mut env = env(Position::new(2, 2));
        env.reset().unwrap();
        activate(&mut env, &["s", "e"]);
        assert!(env.agent("e").unwrap().last_action_invalid);
        assert!(!env.agent("s").unwrap().last_action_invalid);
        assert_eq!(env.scenario().solved(), 0);
    }
}
