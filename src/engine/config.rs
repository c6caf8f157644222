//! Configuration for the grid environment.

use std::collections::{BTreeMap, HashSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::reward::RewardStructure;
use super::types::{Position, TeamId};
use crate::Id;

/// One roster entry: an agent identifier plus optional team, private
/// specialization and fixed start cell.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AgentSpec {
    pub id: Id,
    pub team: Option<TeamId>,
    /// Private role; only revealed to other agents when
    /// [`EnvConfig::reveal_specializations`] is set.
    pub specialization: Option<String>,
    /// Fixed start cell. `None` places the agent randomly on reset.
    pub start: Option<Position>,
}

impl AgentSpec {
    /// Creates a spec with no team, specialization or fixed start.
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            team: None,
            specialization: None,
            start: None,
        }
    }

    pub fn with_team(mut self, team: impl Into<TeamId>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specialization = Some(specialization.into());
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.start = Some(position);
        self
    }
}

/// How obstacles are laid out when the grid is built.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ObstacleLayout {
    /// No obstacles at all.
    None,
    /// An explicit obstacle list.
    Fixed(Vec<Position>),
    /// Seeded generation: an optional central seam with openings plus a
    /// fraction of random free cells, never cutting a path between the
    /// scenario's landmarks.
    Generated { seam: bool, fraction: f64 },
}

impl Default for ObstacleLayout {
    fn default() -> Self {
        ObstacleLayout::Generated {
            seam: false,
            fraction: 0.05,
        }
    }
}

/// Parameters of the attack/tag, steal and claim interactions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CombatConfig {
    /// Health every agent starts with.
    pub max_health: f64,
    /// Health removed by one successful attack.
    pub attack_damage: f64,
    /// Steps an attacker must wait after a successful attack.
    pub attack_cooldown: u32,
    /// Steps a tagged agent stays frozen before its health is restored.
    pub tag_duration: u32,
    /// Steps a thief must wait after a successful steal.
    pub steal_cooldown: u32,
    /// Claim strength added (own team) or removed (rival) per claim.
    pub claim_amount: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            max_health: 1.0,
            attack_damage: 1.0,
            attack_cooldown: 3,
            tag_duration: 5,
            steal_cooldown: 3,
            claim_amount: 0.5,
        }
    }
}

/// Construction-time configuration of a [`GridEnvironment`](super::GridEnvironment).
///
/// Controls grid geometry, observation radius, roster, reward model and
/// episode length. Scenario-specific counts live on the scenario itself.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnvConfig {
    // --- Geometry ---
    /// Number of columns.
    pub width: i32,
    /// Number of rows.
    pub height: i32,
    /// Obstacle layout policy.
    pub obstacles: ObstacleLayout,

    // --- Observation ---
    /// View distance D; the local window is (2D+1)x(2D+1).
    pub view_distance: u32,
    /// Number of steps a message stays readable.
    pub message_retention: u32,
    /// Whether other agents' specializations appear in observations.
    pub reveal_specializations: bool,

    // --- Episode ---
    /// Step budget per episode.
    pub max_steps: u32,
    /// Seed for layout generation and spawn placement.
    pub seed: u64,
    /// Initial roster, in registration order.
    pub agents: Vec<AgentSpec>,

    // --- Rewards ---
    /// Incentive model applied to reward events.
    pub reward_structure: RewardStructure,
    /// Reward added to every live agent each step (typically negative).
    pub step_penalty: f64,
    /// Reward applied to an agent whose action was a no-op because it was
    /// invalid. Zero disables the event entirely.
    pub invalid_action_penalty: f64,

    // --- Interactions ---
    pub combat: CombatConfig,
}

impl EnvConfig {
    /// Checks the configuration for contradictions that do not depend on
    /// the generated layout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(ConfigError::InvalidGrid {
                width: self.width,
                height: self.height,
            });
        }
        if self.view_distance == 0 {
            return Err(ConfigError::InvalidViewDistance);
        }
        if self.message_retention == 0 {
            return Err(ConfigError::InvalidRetention);
        }
        self.reward_structure.validate()?;

        match &self.obstacles {
            ObstacleLayout::None => {}
            ObstacleLayout::Fixed(cells) => {
                if let Some(bad) = cells.iter().find(|p| !self.in_bounds(p)) {
                    return Err(ConfigError::InvalidObstacle(*bad));
                }
            }
            ObstacleLayout::Generated { fraction, .. } => {
                if !(0.0..=0.5).contains(fraction) {
                    return Err(ConfigError::InvalidObstacleFraction(*fraction));
                }
            }
        }

        let mut ids = HashSet::new();
        let mut starts: BTreeMap<Position, &Id> = BTreeMap::new();
        for spec in &self.agents {
            if !ids.insert(spec.id.as_str()) {
                return Err(ConfigError::DuplicateAgent(spec.id.clone()));
            }
            if let Some(start) = spec.start {
                if !self.in_bounds(&start) {
                    return Err(ConfigError::InvalidStart {
                        agent: spec.id.clone(),
                        position: start,
                    });
                }
                if let Some(first) = starts.insert(start, &spec.id) {
                    return Err(ConfigError::DuplicateStart {
                        first: first.clone(),
                        second: spec.id.clone(),
                        position: start,
                    });
                }
            }
        }

        let cells = (self.width as usize) * (self.height as usize);
        if self.agents.len() > cells {
            return Err(ConfigError::TooManyAgents {
                agents: self.agents.len(),
                free: cells,
            });
        }
        Ok(())
    }

    /// Side length of the local observation window.
    pub fn window_size(&self) -> usize {
        2 * self.view_distance as usize + 1
    }

    fn in_bounds(&self, p: &Position) -> bool {
        p.x >= 0 && p.y >= 0 && p.x < self.width && p.y < self.height
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            obstacles: ObstacleLayout::default(),
            view_distance: 2,
            message_retention: 10,
            reveal_specializations: false,
            max_steps: 200,
            seed: 0,
            agents: Vec::new(),
            reward_structure: RewardStructure::Individual,
            step_penalty: -0.01,
            invalid_action_penalty: 0.0,
            combat: CombatConfig::default(),
        }
    }
}
