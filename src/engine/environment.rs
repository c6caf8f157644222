//! Episode controller for the grid environment.
//!
//! Drives the reset → step → done lifecycle:
//! resolve actions → check invariants → apply rewards → evaluate
//! termination → build observations.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::action::Action;
use super::agent::{AgentState, Score};
use super::config::{AgentSpec, EnvConfig, ObstacleLayout};
use super::error::{ConfigError, EnvError};
use super::grid::Grid;
use super::observation::{Observation, ObservationBuilder};
use super::render::{self, Snapshot};
use super::resolver::ActionResolver;
use super::reward::RewardEngine;
use super::scenario::Scenario;
use super::types::{EntityId, Position};
use super::world::World;
use crate::{generate_id, Id};

/// Lifecycle phase of a [`GridEnvironment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    /// Constructed, never reset.
    Uninitialized,
    /// Reset, no step taken yet.
    Ready,
    Stepping,
    /// Terminated; only `reset` is allowed.
    Done,
}

impl EpisodePhase {
    pub fn name(&self) -> &'static str {
        match self {
            EpisodePhase::Uninitialized => "uninitialized",
            EpisodePhase::Ready => "ready",
            EpisodePhase::Stepping => "stepping",
            EpisodePhase::Done => "done",
        }
    }
}

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Termination {
    StepLimit,
    /// The scenario's goal predicate held.
    Goal,
    /// A state invariant was found broken after a step.
    InvariantFailure,
}

/// Bookkeeping for the current episode.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    /// Unique episode identifier (UUID v4).
    pub id: Id,
    /// Zero-based number of resets before this one.
    pub index: u64,
    pub step: u32,
    pub max_steps: u32,
    pub termination: Option<Termination>,
}

impl Episode {
    fn new(index: u64, max_steps: u32) -> Self {
        Self {
            id: generate_id(),
            index,
            step: 0,
            max_steps,
            termination: None,
        }
    }
}

/// Per-agent diagnostics for logging and evaluation consumers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepInfo {
    pub position: Position,
    pub score: Score,
    pub carrying: Option<EntityId>,
    pub health: f64,
    pub tagged: bool,
    /// The agent's action this step was a no-op.
    pub invalid_action: bool,
    /// Scenario-specific counters.
    pub counters: BTreeMap<String, f64>,
}

/// Result of a single environment step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Per-agent observations after the step.
    pub observations: BTreeMap<Id, Observation>,
    /// Per-agent reward for this step, step penalty included.
    pub rewards: BTreeMap<Id, f64>,
    pub dones: BTreeMap<Id, bool>,
    /// Whether the episode is over.
    pub done: bool,
    /// Step counter after this step.
    pub step: u32,
    pub infos: BTreeMap<Id, StepInfo>,
}

/// The multi-agent grid environment.
///
/// Owns the committed [`World`] exclusively for the lifetime of an
/// episode and applies one step at a time, in registration order, so a
/// fixed seed and fixed action batches reproduce an episode exactly.
///
/// # Lifecycle
///
/// 1. Call [`GridEnvironment::new`] with a configuration and a scenario.
/// 2. Call [`GridEnvironment::reset`] to start an episode.
/// 3. Repeatedly call [`GridEnvironment::step`] until `done`.
/// 4. Call `reset` again for the next episode.
#[derive(Debug)]
pub struct GridEnvironment<S: Scenario> {
    config: EnvConfig,
    scenario: S,
    world: World,
    phase: EpisodePhase,
    episode: Episode,
    /// Random number generator for the current episode.
    rng: StdRng,
    episodes_started: u64,
    /// Roster used by the next reset. Tracks joins and leaves.
    roster: Vec<AgentSpec>,
}

impl<S: Scenario> GridEnvironment<S> {
    /// Validates the configuration and lays out the grid.
    ///
    /// # Arguments
    ///
    /// * `config` - Geometry, roster, reward model and episode length
    /// * `scenario` - Mechanics layered on the engine core
    pub fn new(config: EnvConfig, scenario: S) -> Result<Self, EnvError> {
        config.validate()?;
        scenario.validate(&config)?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut grid = Grid::new(config.width, config.height)?;
        scenario.layout(&mut grid, &config)?;
        Self::place_obstacles(&mut grid, &config, &scenario, &mut rng)?;

        info!(
            scenario = scenario.name(),
            width = config.width,
            height = config.height,
            agents = config.agents.len(),
            "grid environment created"
        );
        Ok(Self {
            world: World::new(grid, config.message_retention),
            phase: EpisodePhase::Uninitialized,
            episode: Episode::new(0, config.max_steps),
            rng,
            episodes_started: 0,
            roster: config.agents.clone(),
            config,
            scenario,
        })
    }

    fn place_obstacles(
        grid: &mut Grid,
        config: &EnvConfig,
        scenario: &S,
        rng: &mut StdRng,
    ) -> Result<(), ConfigError> {
        let starts: Vec<Position> = config.agents.iter().filter_map(|a| a.start).collect();
        match &config.obstacles {
            ObstacleLayout::None => {}
            ObstacleLayout::Fixed(cells) => {
                for p in cells {
                    if !grid.set_obstacle(*p) {
                        return Err(ConfigError::InvalidObstacle(*p));
                    }
                }
            }
            ObstacleLayout::Generated { seam, fraction } => {
                let mut landmarks = scenario.landmarks(grid);
                landmarks.extend(starts.iter().copied());
                grid.generate_obstacles(rng, *seam, *fraction, &landmarks, &landmarks);
            }
        }

        for spec in &config.agents {
            if let Some(start) = spec.start {
                if grid.is_obstacle(&start) {
                    return Err(ConfigError::InvalidStart {
                        agent: spec.id.clone(),
                        position: start,
                    });
                }
            }
        }
        let free = grid.passable_cells().len();
        if config.agents.len() > free {
            return Err(ConfigError::TooManyAgents {
                agents: config.agents.len(),
                free,
            });
        }
        Ok(())
    }

    /// Starts a new episode and returns the initial observation of every
    /// agent.
    ///
    /// Reinitializes entities, agents and messages; the grid layout is kept
    /// unless the scenario regenerates it. Allowed from every phase.
    pub fn reset(&mut self) -> Result<BTreeMap<Id, Observation>, EnvError> {
        let index = self.episodes_started;
        self.episodes_started += 1;
        self.rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(1 + index));

        if self.scenario.regenerates_layout() {
            self.world.grid.clear_obstacles();
            Self::place_obstacles(
                &mut self.world.grid,
                &self.config,
                &self.scenario,
                &mut self.rng,
            )?;
        }
        self.world.grid.reset_special_state();
        self.world.entities.clear();
        self.world.agents.clear();
        self.world.messages.clear();
        self.world.step = 0;

        for spec in &self.roster {
            let pos = spawn_position(&self.world, &self.scenario, spec, &mut self.rng)?;
            self.world
                .agents
                .create(AgentState::new(spec, pos, self.config.combat.max_health));
        }
        self.scenario.populate(&mut self.world, &mut self.rng)?;
        self.world.check_invariants()?;

        self.episode = Episode::new(index, self.config.max_steps);
        self.phase = EpisodePhase::Ready;
        info!(
            episode = %self.episode.id,
            index,
            agents = self.world.agents.len(),
            entities = self.world.entities.len(),
            "episode reset"
        );
        Ok(self.observe_all())
    }

    /// Executes one environment step.
    ///
    /// Resolves the action batch, verifies invariants, applies rewards and
    /// evaluates termination. Agents missing from `actions` stay put.
    ///
    /// # Arguments
    ///
    /// * `actions` - At most one action per agent id
    pub fn step(&mut self, actions: &BTreeMap<Id, Action>) -> Result<StepResult, EnvError> {
        match self.phase {
            EpisodePhase::Ready | EpisodePhase::Stepping => {}
            phase => {
                return Err(EnvError::Lifecycle {
                    operation: "step",
                    phase: phase.name(),
                })
            }
        }
        for id in actions.keys() {
            if !self.world.agents.contains(id) {
                warn!(agent = %id, "action for unknown agent ignored");
            }
        }
        self.phase = EpisodePhase::Stepping;

        let outcome =
            ActionResolver::resolve(&mut self.world, &mut self.scenario, &self.config, actions);
        if let Err(err) = self.world.check_invariants() {
            warn!(episode = %self.episode.id, step = self.world.step, error = %err, "invariant failure, stopping episode");
            self.finish(Termination::InvariantFailure);
            return Err(err);
        }

        let rewards = RewardEngine::apply(
            &self.config.reward_structure,
            &outcome.events,
            &mut self.world.agents,
            self.config.step_penalty,
        );
        self.episode.step = self.world.step;

        if self.scenario.goal_reached(&self.world) {
            self.finish(Termination::Goal);
        } else if self.world.step >= self.config.max_steps {
            self.finish(Termination::StepLimit);
        }
        let done = self.phase == EpisodePhase::Done;

        let infos = self
            .world
            .agents
            .iter()
            .map(|a| {
                let info = StepInfo {
                    position: a.position,
                    score: a.score,
                    carrying: a.carrying,
                    health: a.health,
                    tagged: a.is_tagged(),
                    invalid_action: outcome.invalid.contains(&a.id),
                    counters: self.scenario.counters(&self.world, a),
                };
                (a.id.clone(), info)
            })
            .collect();
        let dones = self
            .world
            .agents
            .iter()
            .map(|a| (a.id.clone(), done || a.done))
            .collect();

        Ok(StepResult {
            observations: self.observe_all(),
            rewards,
            dones,
            done,
            step: self.world.step,
            infos,
        })
    }

    fn finish(&mut self, reason: Termination) {
        self.phase = EpisodePhase::Done;
        self.episode.termination = Some(reason);
        self.world.agents.for_each_mut(|a| a.done = true);
        info!(
            episode = %self.episode.id,
            steps = self.world.step,
            ?reason,
            "episode finished"
        );
    }

    /// Adds an agent to the running episode and to the roster of future
    /// episodes. Fails before the first reset, on a duplicate id, or when
    /// no free cell is left.
    pub fn add_agent(&mut self, spec: AgentSpec) -> bool {
        if self.phase == EpisodePhase::Uninitialized || self.world.agents.contains(&spec.id) {
            return false;
        }
        let pos = match spawn_position(&self.world, &self.scenario, &spec, &mut self.rng) {
            Ok(pos) => pos,
            Err(err) => {
                warn!(agent = %spec.id, error = %err, "cannot place joining agent");
                return false;
            }
        };
        let mut state = AgentState::new(&spec, pos, self.config.combat.max_health);
        state.done = self.phase == EpisodePhase::Done;
        if self.world.agents.create(state).is_none() {
            return false;
        }
        debug!(agent = %spec.id, position = %pos, "agent joined");
        self.roster.push(spec);
        true
    }

    /// Removes an agent. Whatever it carried is released uncarried at its
    /// current position (the whole carrier group lets go), and it leaves
    /// every pending pickup.
    pub fn remove_agent(&mut self, id: &str) -> bool {
        if self.phase == EpisodePhase::Uninitialized || !self.world.agents.contains(id) {
            return false;
        }
        let dropped = self.world.drop_carried(id).map(|(e, _)| e);
        self.world.entities.release_agent(id);
        self.world.agents.remove(id);
        self.roster.retain(|s| s.id != id);
        debug!(agent = %id, ?dropped, "agent left");
        true
    }

    /// Observation of one agent from the committed state.
    pub fn observe(&self, id: &str) -> Option<Observation> {
        ObservationBuilder::build(&self.world, &self.scenario, &self.config, id)
    }

    /// Observations of every agent, keyed by id.
    pub fn observe_all(&self) -> BTreeMap<Id, Observation> {
        ObservationBuilder::build_all(&self.world, &self.scenario, &self.config)
    }

    /// Human-readable text grid with an agent legend.
    pub fn render_text(&self) -> String {
        render::render_text(&self.world)
    }

    /// Structured snapshot for external visualization.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.world, &self.episode.id)
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn scenario(&self) -> &S {
        &self.scenario
    }

    /// Full committed state, for centralized consumers.
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    pub fn agent(&self, id: &str) -> Option<&AgentState> {
        self.world.agents.get(id)
    }

    /// Agent ids in registration order.
    pub fn agent_ids(&self) -> Vec<Id> {
        self.world.agents.ids()
    }

    pub fn n_agents(&self) -> usize {
        self.world.agents.len()
    }
}

/// Chooses the reset or join cell of an agent: its fixed start if any,
/// else a random free cell of the scenario's spawn region, else a random
/// free cell anywhere. Cells with a passable neighbour are preferred so a
/// fresh agent is never walled in.
fn spawn_position<S: Scenario + ?Sized>(
    world: &World,
    scenario: &S,
    spec: &AgentSpec,
    rng: &mut StdRng,
) -> Result<Position, EnvError> {
    if let Some(start) = spec.start {
        if world.is_free(&start) {
            return Ok(start);
        }
        return Err(EnvError::NoFreeCell {
            what: format!("start of agent {}", spec.id),
        });
    }

    let grid = &world.grid;
    let region: Vec<Position> = scenario
        .spawn_region(spec, grid)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| world.is_free(p))
        .collect();
    let anywhere = || -> Vec<Position> {
        grid.passable_cells()
            .into_iter()
            .filter(|p| world.is_free(p))
            .collect()
    };
    let candidates = if region.is_empty() { anywhere() } else { region };
    let open: Vec<Position> = candidates
        .iter()
        .copied()
        .filter(|p| grid.passable_neighbours(p) > 0)
        .collect();
    let pool = if open.is_empty() { candidates } else { open };

    pool.choose(rng).copied().ok_or_else(|| EnvError::NoFreeCell {
        what: format!("agent {}", spec.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::Interaction;
    use crate::engine::scenario::FreeRoam;
    use crate::engine::types::Direction;

    fn config(n: usize) -> EnvConfig {
        EnvConfig {
            width: 6,
            height: 6,
            obstacles: ObstacleLayout::None,
            max_steps: 5,
            agents: (0..n).map(|i| AgentSpec::new(format!("agent_{i}"))).collect(),
            ..EnvConfig::default()
        }
    }

    fn make_env(n: usize) -> GridEnvironment<FreeRoam> {
        GridEnvironment::new(config(n), FreeRoam).unwrap()
    }

    fn stay_all(env: &GridEnvironment<FreeRoam>) -> BTreeMap<Id, Action> {
        env.agent_ids()
            .into_iter()
            .map(|id| (id, Action::stay()))
            .collect()
    }

    #[test]
    fn step_before_reset_is_a_lifecycle_error() {
        let mut env = make_env(2);
        let err = env.step(&BTreeMap::new()).unwrap_err();
        assert_eq!(
            err,
            EnvError::Lifecycle {
                operation: "step",
                phase: "uninitialized"
            }
        );
    }

    #[test]
    fn reset_returns_observations() {
        let mut env = make_env(3);
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(env.phase(), EpisodePhase::Ready);
        for o in obs.values() {
            assert_eq!(o.view.size, env.config().window_size());
        }
    }

    #[test]
    fn episode_terminates_at_step_limit() {
        let mut env = make_env(2);
        env.reset().unwrap();
        for t in 0..5 {
            let result = env.step(&stay_all(&env)).unwrap();
            assert_eq!(result.step, t + 1);
            assert_eq!(result.done, t == 4);
        }
        assert_eq!(env.episode().termination, Some(Termination::StepLimit));
        assert!(matches!(
            env.step(&BTreeMap::new()),
            Err(EnvError::Lifecycle { phase: "done", .. })
        ));
        env.reset().unwrap();
        assert!(env.step(&BTreeMap::new()).is_ok());
    }

    #[test]
    fn step_penalty_applies_every_step() {
        let mut env = make_env(1);
        env.reset().unwrap();
        let result = env.step(&BTreeMap::new()).unwrap();
        assert!((result.rewards["agent_0"] + 0.01).abs() < 1e-12);
    }

    #[test]
    fn same_seed_reproduces_placement() {
        let mut a = make_env(4);
        let mut b = make_env(4);
        a.reset().unwrap();
        b.reset().unwrap();
        assert_eq!(a.render_text(), b.render_text());
    }

    #[test]
    fn consecutive_episodes_differ_in_seed() {
        let mut env = make_env(4);
        env.reset().unwrap();
        let first: Vec<Position> = env.world().agents.iter().map(|a| a.position).collect();
        let mut differs = false;
        for _ in 0..5 {
            env.reset().unwrap();
            let next: Vec<Position> = env.world().agents.iter().map(|a| a.position).collect();
            differs |= next != first;
        }
        assert!(differs);
        assert_eq!(env.episode().index, 5);
    }

    #[test]
    fn roster_changes_require_reset() {
        let mut env = make_env(1);
        assert!(!env.add_agent(AgentSpec::new("late")));
        assert!(!env.remove_agent("agent_0"));
        env.reset().unwrap();
        assert!(env.add_agent(AgentSpec::new("late")));
        assert!(!env.add_agent(AgentSpec::new("late")));
        assert_eq!(env.agent_ids(), vec!["agent_0", "late"]);
        assert!(env.remove_agent("agent_0"));
        assert!(!env.remove_agent("agent_0"));
        // The roster carries over into the next episode.
        env.reset().unwrap();
        assert_eq!(env.agent_ids(), vec!["late"]);
    }

    #[test]
    fn removing_a_carrier_releases_the_entity() {
        let cfg = EnvConfig {
            agents: vec![AgentSpec::new("a").at(Position::new(2, 2))],
            ..config(0)
        };
        let mut env = GridEnvironment::new(cfg, FreeRoam).unwrap();
        env.reset().unwrap();
        let id = env.world.entities.spawn_at(
            crate::engine::entity::EntityPayload::Resource {
                value: 1.0,
                required_carriers: 1,
            },
            Position::new(2, 2),
        );
        let actions = BTreeMap::from([("a".to_string(), Action::interact(Interaction::PickUp))]);
        env.step(&actions).unwrap();
        assert_eq!(env.agent("a").unwrap().carrying, Some(id));
        let actions = BTreeMap::from([("a".to_string(), Action::moving(Direction::Right))]);
        env.step(&actions).unwrap();
        assert!(env.remove_agent("a"));
        let entity = env.world().entities.get(id).unwrap();
        assert!(!entity.is_carried());
        assert_eq!(entity.position, Position::new(3, 2));
        assert!(env.world().check_invariants().is_ok());
    }

    #[test]
    fn fixed_obstacle_on_start_is_rejected() {
        let cfg = EnvConfig {
            obstacles: ObstacleLayout::Fixed(vec![Position::new(1, 1)]),
            agents: vec![AgentSpec::new("a").at(Position::new(1, 1))],
            ..config(0)
        };
        assert!(matches!(
            GridEnvironment::new(cfg, FreeRoam),
            Err(EnvError::Config(ConfigError::InvalidStart { .. }))
        ));
    }

    #[test]
    fn invalid_actions_are_reported_in_info() {
        let cfg = EnvConfig {
            agents: vec![AgentSpec::new("a").at(Position::new(0, 0))],
            invalid_action_penalty: -0.5,
            ..config(0)
        };
        let mut env = GridEnvironment::new(cfg, FreeRoam).unwrap();
        env.reset().unwrap();
        let actions = BTreeMap::from([("a".to_string(), Action::moving(Direction::Up))]);
        let result = env.step(&actions).unwrap();
        assert!(result.infos["a"].invalid_action);
        assert!((result.rewards["a"] + 0.51).abs() < 1e-12);
        assert_eq!(env.agent("a").unwrap().position, Position::new(0, 0));

        let actions = BTreeMap::from([("a".to_string(), Action::interact(Interaction::PickUp))]);
        let result = env.step(&actions).unwrap();
        assert!(result.infos["a"].invalid_action);
        assert!((result.rewards["a"] + 0.51).abs() < 1e-12);
    }

    #[test]
    fn render_is_idempotent() {
        let mut env = make_env(3);
        env.reset().unwrap();
        assert_eq!(env.render_text(), env.render_text());
        assert_eq!(env.snapshot(), env.snapshot());
    }
}
