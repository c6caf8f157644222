//! Resource collection: agents carry resources to depots.
//!
//! Light resources need one carrier; heavy ones need several agents
//! moving in lockstep. A resource is delivered when it rests uncarried on
//! a depot, and the value is split among the agents that dropped it.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{in_grid, spawn_on_floor};
use crate::engine::{
    AgentState, ConfigError, EntityPayload, EnvConfig, EnvError, Grid, GridCell, InteractionKind,
    InteractionOutcome, Position, RewardCause, RewardEvent, Scenario, SpecialKind, World,
};

/// One resource placed at reset.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub value: f64,
    pub required_carriers: usize,
    /// Fixed cell; `None` spawns on a random free cell.
    pub position: Option<Position>,
}

impl ResourceSpec {
    pub fn light(value: f64) -> Self {
        Self {
            value,
            required_carriers: 1,
            position: None,
        }
    }

    pub fn heavy(value: f64, required_carriers: usize) -> Self {
        Self {
            value,
            required_carriers,
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    fn payload(&self) -> EntityPayload {
        EntityPayload::Resource {
            value: self.value,
            required_carriers: self.required_carriers,
        }
    }
}

/// Configuration of [`ResourceCollection`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    /// Resources placed at every reset.
    pub resources: Vec<ResourceSpec>,
    /// Depot cells. Empty places a single depot at the grid centre.
    pub depots: Vec<Position>,
    /// Reward for completing a pickup, per carrier. Zero disables it.
    pub pickup_reward: f64,
    /// Replace every delivered resource with a fresh one of the same kind.
    pub respawn: bool,
    /// Whether agents may steal resources from non-teammates.
    pub allow_steal: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            resources: vec![
                ResourceSpec::light(1.0),
                ResourceSpec::light(1.0),
                ResourceSpec::light(1.0),
                ResourceSpec::light(1.0),
                ResourceSpec::heavy(3.0, 2),
            ],
            depots: Vec::new(),
            pickup_reward: 0.0,
            respawn: false,
            allow_steal: false,
        }
    }
}

/// Collect-and-deliver scenario.
#[derive(Debug, Clone, Default)]
pub struct ResourceCollection {
    pub config: ResourceConfig,
    delivered: usize,
    delivered_value: f64,
    /// Respawn placement stream, reseeded from the episode generator.
    rng: Option<StdRng>,
}

impl ResourceCollection {
    pub fn new(config: ResourceConfig) -> Self {
        Self {
            config,
            delivered: 0,
            delivered_value: 0.0,
            rng: None,
        }
    }

    /// Resources delivered this episode.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn delivered_value(&self) -> f64 {
        self.delivered_value
    }

    fn depot_cells(&self, config: &EnvConfig) -> Vec<Position> {
        if self.config.depots.is_empty() {
            vec![Position::new(config.width / 2, config.height / 2)]
        } else {
            self.config.depots.clone()
        }
    }
}

impl Scenario for ResourceCollection {
    fn name(&self) -> &str {
        "resource_collection"
    }

    fn validate(&self, config: &EnvConfig) -> Result<(), ConfigError> {
        if let Some(bad) = self.config.depots.iter().find(|p| !in_grid(config, p)) {
            return Err(ConfigError::Scenario(format!("depot {bad} is off the grid")));
        }
        for spec in &self.config.resources {
            if spec.required_carriers == 0 {
                return Err(ConfigError::Scenario(
                    "resource needs at least one carrier".to_string(),
                ));
            }
            if let Some(p) = spec.position.filter(|p| !in_grid(config, p)) {
                return Err(ConfigError::Scenario(format!("resource {p} is off the grid")));
            }
        }
        Ok(())
    }

    fn layout(&self, grid: &mut Grid, config: &EnvConfig) -> Result<(), ConfigError> {
        for depot in self.depot_cells(config) {
            grid.set_special(depot, SpecialKind::Depot, None);
        }
        Ok(())
    }

    fn populate(&mut self, world: &mut World, rng: &mut StdRng) -> Result<(), EnvError> {
        self.delivered = 0;
        self.delivered_value = 0.0;
        self.rng = Some(StdRng::seed_from_u64(rng.gen()));
        for spec in &self.config.resources {
            match spec.position {
                Some(p) => {
                    world.entities.spawn_at(spec.payload(), p);
                }
                None => {
                    spawn_on_floor(world, spec.payload(), rng)?;
                }
            }
        }
        Ok(())
    }

    fn allows(&self, kind: InteractionKind) -> bool {
        match kind {
            InteractionKind::PickUp | InteractionKind::Drop | InteractionKind::Pass => true,
            InteractionKind::Steal => self.config.allow_steal,
            InteractionKind::Attack | InteractionKind::Claim | InteractionKind::Activate => false,
        }
    }

    fn on_outcome(
        &mut self,
        world: &World,
        _agent: &str,
        outcome: &InteractionOutcome,
        events: &mut Vec<RewardEvent>,
    ) {
        if self.config.pickup_reward == 0.0 {
            return;
        }
        if let InteractionOutcome::PickedUp {
            entity,
            completed: true,
        } = outcome
        {
            if let Some(e) = world.entities.get(*entity) {
                for carrier in &e.carriers {
                    events.push(RewardEvent::new(
                        carrier.clone(),
                        self.config.pickup_reward,
                        RewardCause::PickedUp,
                    ));
                }
            }
        }
    }

    fn lifecycle(&mut self, world: &mut World, events: &mut Vec<RewardEvent>) {
        let arrived: Vec<_> = world
            .entities
            .iter()
            .filter(|e| !e.is_carried())
            .filter(|e| {
                world.grid.cell(&e.position) == Some(GridCell::Special(SpecialKind::Depot))
            })
            .filter_map(|e| match e.payload {
                EntityPayload::Resource {
                    value,
                    required_carriers,
                } => Some((e.id, value, required_carriers, e.last_carriers.clone())),
                _ => None,
            })
            .collect();

        for (id, value, required_carriers, carriers) in arrived {
            world.entities.remove(id);
            self.delivered += 1;
            self.delivered_value += value;
            debug!(entity = %id, value, carriers = carriers.len(), "resource delivered");
            if !carriers.is_empty() {
                let share = value / carriers.len() as f64;
                for carrier in carriers {
                    events.push(RewardEvent::new(carrier, share, RewardCause::Delivered));
                }
            }
            if !self.config.respawn {
                continue;
            }
            if let Some(rng) = self.rng.as_mut() {
                let payload = EntityPayload::Resource {
                    value,
                    required_carriers,
                };
                if let Err(err) = spawn_on_floor(world, payload, rng) {
                    debug!(error = %err, "no room to respawn resource");
                }
            }
        }
    }

    fn goal_reached(&self, world: &World) -> bool {
        !self.config.respawn
            && self.delivered > 0
            && !world
                .entities
                .iter()
                .any(|e| matches!(e.payload, EntityPayload::Resource { .. }))
    }

    fn counters(&self, world: &World, _agent: &AgentState) -> BTreeMap<String, f64> {
        let remaining = world
            .entities
            .iter()
            .filter(|e| matches!(e.payload, EntityPayload::Resource { .. }))
            .count();
        BTreeMap::from([
            ("delivered".to_string(), self.delivered as f64),
            ("delivered_value".to_string(), self.delivered_value),
            ("remaining".to_string(), remaining as f64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        Action, AgentSpec, Direction, GridEnvironment, Interaction, ObstacleLayout,
    };
    use crate::Id;

    fn env(resources: Vec<ResourceSpec>, agents: Vec<AgentSpec>) -> GridEnvironment<ResourceCollection> {
        let config = EnvConfig {
            width: 5,
            height: 5,
            obstacles: ObstacleLayout::None,
            agents,
            step_penalty: 0.0,
            ..EnvConfig::default()
        };
        let scenario = ResourceCollection::new(ResourceConfig {
            resources,
            depots: vec![Position::new(0, 0)],
            ..ResourceConfig::default()
        });
        GridEnvironment::new(config, scenario).unwrap()
    }

    fn act(env: &mut GridEnvironment<ResourceCollection>, batch: &[(&str, Action)]) {
        let actions: BTreeMap<Id, Action> = batch
            .iter()
            .map(|(id, a)| (id.to_string(), a.clone()))
            .collect();
        env.step(&actions).unwrap();
    }

    #[test]
    fn delivery_removes_resource_and_credits_dropper() {
        let mut env = env(
            vec![ResourceSpec::light(2.0).at(Position::new(0, 1))],
            vec![AgentSpec::new("a").at(Position::new(0, 1))],
        );
        env.reset().unwrap();
        act(&mut env, &[("a", Action::interact(Interaction::PickUp))]);
        act(&mut env, &[("a", Action::moving(Direction::Up))]);
        assert_eq!(env.world().entities.len(), 1);
        act(&mut env, &[("a", Action::interact(Interaction::Drop))]);
        assert!(env.world().entities.is_empty());
        assert_eq!(env.scenario().delivered(), 1);
        assert!((env.agent("a").unwrap().score.individual - 2.0).abs() < 1e-12);
        assert!(env.phase() == crate::engine::EpisodePhase::Done);
    }

    #[test]
    fn heavy_delivery_splits_value() {
        let mut env = env(
            vec![
                ResourceSpec::heavy(4.0, 2).at(Position::new(1, 1)),
                ResourceSpec::light(1.0).at(Position::new(4, 4)),
            ],
            vec![
                AgentSpec::new("a").at(Position::new(1, 2)),
                AgentSpec::new("b").at(Position::new(2, 1)),
            ],
        );
        env.reset().unwrap();
        act(
            &mut env,
            &[
                ("a", Action::interact(Interaction::PickUp)),
                ("b", Action::interact(Interaction::PickUp)),
            ],
        );
        act(
            &mut env,
            &[
                ("a", Action::moving(Direction::Up)),
                ("b", Action::moving(Direction::Up)),
            ],
        );
        act(
            &mut env,
            &[
                ("a", Action::moving(Direction::Left)),
                ("b", Action::moving(Direction::Left)),
            ],
        );
        // Entity now at (0, 0), carried; dropping it delivers.
        act(&mut env, &[("b", Action::interact(Interaction::Drop))]);
        let a = env.agent("a").unwrap().score.individual;
        let b = env.agent("b").unwrap().score.individual;
        assert!((a - 2.0).abs() < 1e-12);
        assert!((b - 2.0).abs() < 1e-12);
        assert_eq!(env.world().entities.len(), 1);
    }

    #[test]
    fn carried_resource_over_depot_is_not_delivered() {
        let mut env = env(
            vec![ResourceSpec::light(1.0).at(Position::new(1, 0))],
            vec![AgentSpec::new("a").at(Position::new(1, 0))],
        );
        env.reset().unwrap();
        act(&mut env, &[("a", Action::interact(Interaction::PickUp))]);
        act(&mut env, &[("a", Action::moving(Direction::Left))]);
        assert_eq!(env.scenario().delivered(), 0);
        assert_eq!(env.world().entities.len(), 1);
    }

    #[test]
    fn attack_is_not_part_of_the_interaction_table() {
        let mut env = env(
            vec![ResourceSpec::light(1.0).at(Position::new(4, 4))],
            vec![
                AgentSpec::new("a").at(Position::new(2, 2)),
                AgentSpec::new("b").at(Position::new(3, 2)),
            ],
        );
        env.reset().unwrap();
        act(
            &mut env,
            &[(
                "a",
                Action::interact(Interaction::Attack {
                    target: Some("b".into()),
                }),
            )],
        );
        assert!(!env.agent("b").unwrap().is_tagged());
        assert!(env.agent("a").unwrap().last_action_invalid);
    }

    #[test]
    fn immovable_resource_is_rejected() {
        let config = EnvConfig {
            agents: vec![AgentSpec::new("a")],
            ..EnvConfig::default()
        };
        let scenario = ResourceCollection::new(ResourceConfig {
            resources: vec![ResourceSpec::heavy(1.0, 0)],
            ..ResourceConfig::default()
        });
        assert!(matches!(
            GridEnvironment::new(config, scenario),
            Err(EnvError::Config(ConfigError::Scenario(_)))
        ));
    }
}
