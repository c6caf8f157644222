//! Territory control: teams claim cells by standing on them.
//!
//! Every claim moves a territory cell's strength toward the claimant's
//! team; a rival-owned cell changes hands once its strength is exhausted.
//! The episode ends when one team owns the dominance fraction of all
//! territory cells.

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use super::{in_grid, roster_teams};
use crate::engine::{
    AgentState, ConfigError, EnvConfig, EnvError, Grid, InteractionKind, InteractionOutcome,
    Position, RewardCause, RewardEvent, Scenario, SpecialKind, World,
};

/// Configuration of [`TerritoryControl`].
#[derive(Debug, Clone, PartialEq)]
pub struct TerritoryConfig {
    /// Territory cells. Empty lays out a centred square of side `side`.
    pub cells: Vec<Position>,
    pub side: i32,
    /// Share of all territory one team must own to win.
    pub dominance: f64,
    /// Reward for taking ownership of a cell.
    pub flip_reward: f64,
    /// Reward for a claim that only shifts strength.
    pub claim_reward: f64,
}

impl Default for TerritoryConfig {
    fn default() -> Self {
        Self {
            cells: Vec::new(),
            side: 3,
            dominance: 0.75,
            flip_reward: 1.0,
            claim_reward: 0.0,
        }
    }
}

/// Team territory-claiming scenario.
#[derive(Debug, Clone, Default)]
pub struct TerritoryControl {
    pub config: TerritoryConfig,
}

impl TerritoryControl {
    pub fn new(config: TerritoryConfig) -> Self {
        Self { config }
    }

    fn territory(&self, config: &EnvConfig) -> Vec<Position> {
        if !self.config.cells.is_empty() {
            return self.config.cells.clone();
        }
        let side = self.config.side.clamp(1, config.width.min(config.height));
        let left = (config.width - side) / 2;
        let top = (config.height - side) / 2;
        (top..top + side)
            .flat_map(|y| (left..left + side).map(move |x| Position::new(x, y)))
            .collect()
    }

    /// Territory cells owned by each team.
    pub fn ownership(world: &World) -> BTreeMap<String, usize> {
        let mut owned = BTreeMap::new();
        for p in world.grid.specials_of(SpecialKind::Territory) {
            if let Some(owner) = world.grid.special_state(&p).and_then(|s| s.owner.clone()) {
                *owned.entry(owner).or_insert(0) += 1;
            }
        }
        owned
    }
}

impl Scenario for TerritoryControl {
    fn name(&self) -> &str {
        "territory_control"
    }

    fn validate(&self, config: &EnvConfig) -> Result<(), ConfigError> {
        let (_, all) = roster_teams(config);
        if !all {
            return Err(ConfigError::Scenario(
                "territory control needs every agent on a team".to_string(),
            ));
        }
        if !(self.config.dominance > 0.0 && self.config.dominance <= 1.0) {
            return Err(ConfigError::Scenario(format!(
                "dominance {} outside (0, 1]",
                self.config.dominance
            )));
        }
        if let Some(bad) = self.config.cells.iter().find(|p| !in_grid(config, p)) {
            return Err(ConfigError::Scenario(format!("territory {bad} is off the grid")));
        }
        Ok(())
    }

    fn layout(&self, grid: &mut Grid, config: &EnvConfig) -> Result<(), ConfigError> {
        for cell in self.territory(config) {
            grid.set_special(cell, SpecialKind::Territory, None);
        }
        Ok(())
    }

    fn populate(&mut self, _world: &mut World, _rng: &mut StdRng) -> Result<(), EnvError> {
        Ok(())
    }

    fn allows(&self, kind: InteractionKind) -> bool {
        matches!(kind, InteractionKind::Claim | InteractionKind::Attack)
    }

    fn on_outcome(
        &mut self,
        _world: &World,
        agent: &str,
        outcome: &InteractionOutcome,
        events: &mut Vec<RewardEvent>,
    ) {
        if let InteractionOutcome::Claimed { flipped, .. } = outcome {
            let amount = if *flipped {
                self.config.flip_reward
            } else {
                self.config.claim_reward
            };
            if amount != 0.0 {
                events.push(RewardEvent::new(agent, amount, RewardCause::TerritoryClaimed));
            }
        }
    }

    fn goal_reached(&self, world: &World) -> bool {
        let total = world.grid.specials_of(SpecialKind::Territory).len();
        total > 0
            && Self::ownership(world)
                .values()
                .any(|n| *n as f64 >= self.config.dominance * total as f64)
    }

    /// Channels: entity kind code, then claim strength signed by owner
    /// (positive for the viewer's team).
    fn encode_cell(&self, world: &World, viewer: &AgentState, pos: &Position, out: &mut [f64]) {
        if let Some(entity) = world.entities.iter().find(|e| e.position == *pos) {
            out[0] = entity.kind().code();
        }
        if let Some(state) = world.grid.special_state(pos) {
            if let Some(owner) = &state.owner {
                let sign = if viewer.team.as_ref() == Some(owner) {
                    1.0
                } else {
                    -1.0
                };
                out[1] = sign * state.strength.max(f64::EPSILON);
            }
        }
    }

    fn counters(&self, world: &World, agent: &AgentState) -> BTreeMap<String, f64> {
        let owned = Self::ownership(world);
        let own = agent
            .team
            .as_ref()
            .and_then(|t| owned.get(t))
            .copied()
            .unwrap_or(0);
        BTreeMap::from([
            ("owned".to_string(), own as f64),
            (
                "territory".to_string(),
                world.grid.specials_of(SpecialKind::Territory).len() as f64,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Action, AgentSpec, GridEnvironment, Interaction, ObstacleLayout};
    use crate::Id;

    fn env(cells: Vec<Position>, agents: Vec<AgentSpec>) -> GridEnvironment<TerritoryControl> {
        let config = EnvConfig {
            width: 5,
            height: 5,
            obstacles: ObstacleLayout::None,
            agents,
            step_penalty: 0.0,
            ..EnvConfig::default()
        };
        let scenario = TerritoryControl::new(TerritoryConfig {
            cells,
            dominance: 1.0,
            ..TerritoryConfig::default()
        });
        GridEnvironment::new(config, scenario).unwrap()
    }

    fn claim(env: &mut GridEnvironment<TerritoryControl>, ids: &[&str]) {
        let actions: BTreeMap<Id, Action> = ids
            .iter()
            .map(|id| (id.to_string(), Action::interact(Interaction::Claim)))
            .collect();
        env.step(&actions).unwrap();
    }

    #[test]
    fn default_layout_is_centred_square() {
        let scenario = TerritoryControl::default();
        let cells = scenario.territory(&EnvConfig::default());
        assert_eq!(cells.len(), 9);
        assert_eq!(cells[0], Position::new(3, 3));
    }

    #[test]
    fn unowned_cell_is_taken_at_once() {
        let mut env = env(
            vec![Position::new(1, 1), Position::new(3, 3)],
            vec![AgentSpec::new("a").with_team("red").at(Position::new(1, 1))],
        );
        env.reset().unwrap();
        claim(&mut env, &["a"]);
        let state = env.world().grid.special_state(&Position::new(1, 1)).unwrap();
        assert_eq!(state.owner.as_deref(), Some("red"));
        assert!((state.strength - 0.5).abs() < 1e-12);
        assert!((env.agent("a").unwrap().score.individual - 1.0).abs() < 1e-12);
    }

    #[test]
    fn owning_all_territory_ends_episode() {
        let mut env = env(
            vec![Position::new(1, 1)],
            vec![
                AgentSpec::new("a").with_team("red").at(Position::new(1, 1)),
                AgentSpec::new("b").with_team("blue").at(Position::new(4, 4)),
            ],
        );
        env.reset().unwrap();
        // Red owns the only cell: dominance reached.
        claim(&mut env, &["a"]);
        assert!(env.phase() == crate::engine::EpisodePhase::Done);
        assert_eq!(
            TerritoryControl::ownership(env.world()).get("red"),
            Some(&1)
        );
    }

    #[test]
    fn full_strength_claim_is_invalid() {
        let mut env = env(
            vec![Position::new(1, 1), Position::new(3, 3)],
            vec![AgentSpec::new("a").with_team("red").at(Position::new(1, 1))],
        );
        env.reset().unwrap();
        claim(&mut env, &["a"]);
        claim(&mut env, &["a"]);
        assert!(!env.agent("a").unwrap().last_action_invalid);
        claim(&mut env, &["a"]);
        assert!(env.agent("a").unwrap().last_action_invalid);
        let counters = env.scenario().counters(env.world(), env.agent("a").unwrap());
        assert_eq!(counters["owned"], 1.0);
        assert_eq!(counters["territory"], 2.0);
    }

    #[test]
    fn agents_without_team_are_rejected() {
        let config = EnvConfig {
            agents: vec![AgentSpec::new("a")],
            ..EnvConfig::default()
        };
        assert!(GridEnvironment::new(config, TerritoryControl::default()).is_err());
    }
}
