//! Capture the flag for two teams.
//!
//! Each team has a base on its own side of a central seam and a flag that
//! starts at the base. Carrying the enemy flag onto an own base cell scores
//! a capture and sends the flag home. A dropped flag touched (on or next
//! to it) by its own team returns home. Attacks tag opponents, who drop
//! whatever they carry.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use tracing::debug;

use super::roster_teams;
use crate::engine::{
    AgentSpec, AgentState, ConfigError, Entity, EntityId, EntityPayload, EnvConfig, EnvError, Grid,
    GridCell, InteractionKind, InteractionOutcome, Position, RewardCause, RewardEvent, Scenario,
    SpecialKind, TeamId, World,
};

/// Configuration of [`CaptureTheFlag`].
#[derive(Debug, Clone, PartialEq)]
pub struct CtfConfig {
    /// Captures needed by one team to end the episode.
    pub captures_to_win: u32,
    pub capture_reward: f64,
    pub return_reward: f64,
    /// Reward for tagging an opponent.
    pub tag_reward: f64,
    /// Reward for stealing a flag from an opponent.
    pub steal_reward: f64,
    /// Block the centre column, leaving an opening every third row.
    pub seam: bool,
    /// Base cells per team, stacked vertically around the middle row.
    pub base_size: i32,
}

impl Default for CtfConfig {
    fn default() -> Self {
        Self {
            captures_to_win: 3,
            capture_reward: 1.0,
            return_reward: 0.2,
            tag_reward: 0.1,
            steal_reward: 0.1,
            seam: true,
            base_size: 3,
        }
    }
}

/// Two-team capture-the-flag scenario.
#[derive(Debug, Clone, Default)]
pub struct CaptureTheFlag {
    pub config: CtfConfig,
    captures: BTreeMap<TeamId, u32>,
}

impl CaptureTheFlag {
    pub fn new(config: CtfConfig) -> Self {
        Self {
            config,
            captures: BTreeMap::new(),
        }
    }

    /// Captures scored by `team` this episode.
    pub fn captures(&self, team: &str) -> u32 {
        self.captures.get(team).copied().unwrap_or(0)
    }

    /// Cells of the base on column `x`, centred on the middle row.
    fn base_cells(&self, x: i32, height: i32) -> Vec<Position> {
        let size = self.config.base_size.clamp(1, height);
        let top = (height - size) / 2;
        (top..top + size).map(|y| Position::new(x, y)).collect()
    }

    /// The cell a team's flag starts on and returns to.
    fn home(grid: &Grid, team: &str) -> Option<Position> {
        let base = grid.specials_owned_initially(SpecialKind::Base, team);
        base.get(base.len() / 2).copied()
    }

    fn on_own_base(world: &World, agent: &AgentState) -> bool {
        let Some(team) = agent.team.as_deref() else {
            return false;
        };
        world.grid.cell(&agent.position) == Some(GridCell::Special(SpecialKind::Base))
            && world
                .grid
                .specials_owned_initially(SpecialKind::Base, team)
                .contains(&agent.position)
    }

    fn send_home(world: &mut World, flag: EntityId) {
        let carrier = world
            .entities
            .get(flag)
            .and_then(|e| e.carriers.first().cloned());
        if let Some(carrier) = carrier {
            world.drop_carried(&carrier);
        }
        if let Some(e) = world.entities.get_mut(flag) {
            if let EntityPayload::Flag { home, .. } = e.payload {
                e.position = home;
            }
        }
    }
}

impl Scenario for CaptureTheFlag {
    fn name(&self) -> &str {
        "capture_the_flag"
    }

    fn validate(&self, config: &EnvConfig) -> Result<(), ConfigError> {
        let (teams, all) = roster_teams(config);
        if teams.len() != 2 || !all {
            return Err(ConfigError::Scenario(format!(
                "capture the flag needs every agent on one of exactly two teams, found {}",
                teams.len()
            )));
        }
        if config.width < 3 {
            return Err(ConfigError::Scenario(
                "capture the flag needs at least three columns".to_string(),
            ));
        }
        Ok(())
    }

    fn layout(&self, grid: &mut Grid, config: &EnvConfig) -> Result<(), ConfigError> {
        let (teams, _) = roster_teams(config);
        let columns = [0, config.width - 1];
        for (team, x) in teams.iter().zip(columns) {
            for cell in self.base_cells(x, config.height) {
                grid.set_special(cell, SpecialKind::Base, Some(team.clone()));
            }
        }
        if self.config.seam {
            grid.add_seam(&[]);
        }
        Ok(())
    }

    fn spawn_region(&self, spec: &AgentSpec, grid: &Grid) -> Option<Vec<Position>> {
        let team = spec.team.as_deref()?;
        let home = Self::home(grid, team)?;
        let mid = grid.width() / 2;
        let own_side = |p: &Position| {
            if home.x < mid {
                p.x < mid
            } else {
                p.x > mid
            }
        };
        Some(
            grid.passable_cells()
                .into_iter()
                .filter(|p| own_side(p) && grid.cell(p) == Some(GridCell::Empty))
                .collect(),
        )
    }

    fn populate(&mut self, world: &mut World, _rng: &mut StdRng) -> Result<(), EnvError> {
        self.captures.clear();
        for team in world.agents.teams() {
            let home = Self::home(&world.grid, &team).ok_or_else(|| EnvError::NoFreeCell {
                what: format!("base of team {team}"),
            })?;
            self.captures.insert(team.clone(), 0);
            world
                .entities
                .spawn_at(EntityPayload::Flag { team, home }, home);
        }
        Ok(())
    }

    fn allows(&self, kind: InteractionKind) -> bool {
        !matches!(kind, InteractionKind::Claim | InteractionKind::Activate)
    }

    fn can_pick_up(&self, _world: &World, agent: &AgentState, entity: &Entity) -> bool {
        match &entity.payload {
            EntityPayload::Flag { team, .. } => agent.team.as_ref() != Some(team),
            _ => true,
        }
    }

    fn on_outcome(
        &mut self,
        _world: &World,
        agent: &str,
        outcome: &InteractionOutcome,
        events: &mut Vec<RewardEvent>,
    ) {
        let (amount, cause) = match outcome {
            InteractionOutcome::Hit { tagged: true, .. } => {
                (self.config.tag_reward, RewardCause::Tagged)
            }
            InteractionOutcome::Stole { .. } => (self.config.steal_reward, RewardCause::Stole),
            _ => return,
        };
        if amount != 0.0 {
            events.push(RewardEvent::new(agent, amount, cause));
        }
    }

    fn lifecycle(&mut self, world: &mut World, events: &mut Vec<RewardEvent>) {
        let mut captured: Vec<(EntityId, String, TeamId)> = Vec::new();
        let mut returned: Vec<(EntityId, String)> = Vec::new();

        for flag in world.entities.iter() {
            let EntityPayload::Flag { team, home } = &flag.payload else {
                continue;
            };
            if let Some(carrier) = flag.carriers.first() {
                if flag.picked_up_at == Some(world.step) {
                    continue;
                }
                let Some(agent) = world.agents.get(carrier) else {
                    continue;
                };
                if let Some(own) = agent.team.as_ref().filter(|t| *t != team) {
                    if Self::on_own_base(world, agent) {
                        captured.push((flag.id, carrier.clone(), own.clone()));
                    }
                }
            } else if flag.position != *home {
                let rescuer = world.agents.iter().find(|a| {
                    a.position.chebyshev(&flag.position) <= 1
                        && a.team.as_ref() == Some(team)
                        && a.can_act()
                });
                if let Some(rescuer) = rescuer {
                    returned.push((flag.id, rescuer.id.clone()));
                }
            }
        }

        for (flag, carrier, team) in captured {
            Self::send_home(world, flag);
            *self.captures.entry(team.clone()).or_insert(0) += 1;
            debug!(%flag, agent = %carrier, %team, captures = self.captures(&team), "flag captured");
            events.push(RewardEvent::new(
                carrier,
                self.config.capture_reward,
                RewardCause::FlagCaptured,
            ));
        }
        for (flag, rescuer) in returned {
            Self::send_home(world, flag);
            debug!(%flag, agent = %rescuer, "flag returned");
            if self.config.return_reward != 0.0 {
                events.push(RewardEvent::new(
                    rescuer,
                    self.config.return_reward,
                    RewardCause::FlagReturned,
                ));
            }
        }
    }

    fn goal_reached(&self, _world: &World) -> bool {
        self.captures
            .values()
            .any(|c| *c >= self.config.captures_to_win)
    }

    fn extra_channels(&self) -> usize {
        3
    }

    /// Channels: entity kind code, base relation (+1 own, -1 enemy), flag
    /// relation (+1 own flag, -1 enemy flag).
    fn encode_cell(&self, world: &World, viewer: &AgentState, pos: &Position, out: &mut [f64]) {
        let relation = |team: &TeamId| {
            if viewer.team.as_ref() == Some(team) {
                1.0
            } else {
                -1.0
            }
        };
        if let Some(entity) = world.entities.iter().find(|e| e.position == *pos) {
            out[0] = entity.kind().code();
            if let EntityPayload::Flag { team, .. } = &entity.payload {
                out[2] = relation(team);
            }
        }
        if let Some(owner) = world.grid.special_state(pos).and_then(|s| s.owner.as_ref()) {
            out[1] = relation(owner);
        }
    }

    fn counters(&self, _world: &World, agent: &AgentState) -> BTreeMap<String, f64> {
        let own = agent.team.as_deref().map_or(0, |t| self.captures(t));
        let theirs: u32 = self
            .captures
            .iter()
            .filter(|(t, _)| agent.team.as_ref() != Some(*t))
            .map(|(_, c)| *c)
            .sum();
        BTreeMap::from([
            ("captures".to_string(), own as f64),
            ("opponent_captures".to_string(), theirs as f64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Action, Direction, GridEnvironment, Interaction, ObstacleLayout};
    use crate::Id;

    fn env(agents: Vec<AgentSpec>) -> GridEnvironment<CaptureTheFlag> {
        let config = EnvConfig {
            width: 7,
            height: 5,
            obstacles: ObstacleLayout::None,
            agents,
            step_penalty: 0.0,
            ..EnvConfig::default()
        };
        let scenario = CaptureTheFlag::new(CtfConfig {
            seam: false,
            captures_to_win: 1,
            ..CtfConfig::default()
        });
        GridEnvironment::new(config, scenario).unwrap()
    }

    fn act(env: &mut GridEnvironment<CaptureTheFlag>, batch: &[(&str, Action)]) {
        let actions: BTreeMap<Id, Action> = batch
            .iter()
            .map(|(id, a)| (id.to_string(), a.clone()))
            .collect();
        env.step(&actions).unwrap();
    }

    fn flag_of(env: &GridEnvironment<CaptureTheFlag>, team: &str) -> crate::engine::Entity {
        env.world()
            .entities
            .iter()
            .find(|e| matches!(&e.payload, EntityPayload::Flag { team: t, .. } if t == team))
            .cloned()
            .unwrap()
    }

    #[test]
    fn requires_two_teams() {
        let config = EnvConfig {
            agents: vec![AgentSpec::new("a").with_team("red")],
            ..EnvConfig::default()
        };
        assert!(matches!(
            GridEnvironment::new(config, CaptureTheFlag::default()),
            Err(EnvError::Config(ConfigError::Scenario(_)))
        ));
    }

    #[test]
    fn bases_and_flags_on_opposite_sides() {
        let mut env = env(vec![
            AgentSpec::new("r").with_team("red"),
            AgentSpec::new("b").with_team("blue"),
        ]);
        env.reset().unwrap();
        assert_eq!(flag_of(&env, "red").position, Position::new(0, 2));
        assert_eq!(flag_of(&env, "blue").position, Position::new(6, 2));
        assert!(env.agent("r").unwrap().position.x < 3);
        assert!(env.agent("b").unwrap().position.x > 3);
    }

    #[test]
    fn own_flag_cannot_be_picked_up() {
        let mut env = env(vec![
            AgentSpec::new("r").with_team("red").at(Position::new(0, 2)),
            AgentSpec::new("b").with_team("blue").at(Position::new(6, 0)),
        ]);
        env.reset().unwrap();
        act(&mut env, &[("r", Action::interact(Interaction::PickUp))]);
        assert_eq!(env.agent("r").unwrap().carrying, None);
    }

    #[test]
    fn carrying_enemy_flag_home_scores() {
        let mut env = env(vec![
            AgentSpec::new("r").with_team("red").at(Position::new(5, 2)),
            AgentSpec::new("b").with_team("blue").at(Position::new(3, 0)),
        ]);
        env.reset().unwrap();
        act(&mut env, &[("r", Action::moving(Direction::Right))]);
        act(&mut env, &[("r", Action::interact(Interaction::PickUp))]);
        assert!(env.agent("r").unwrap().carrying.is_some());
        for _ in 0..5 {
            act(&mut env, &[("r", Action::moving(Direction::Left))]);
        }
        assert!(env.agent("r").unwrap().position.x <= 1);
        act(&mut env, &[("r", Action::moving(Direction::Left))]);
        assert_eq!(env.scenario().captures("red"), 1);
        assert_eq!(flag_of(&env, "blue").position, Position::new(6, 2));
        assert_eq!(env.agent("r").unwrap().carrying, None);
        assert!((env.agent("r").unwrap().score.individual - 1.0).abs() < 1e-12);
        assert_eq!(env.phase(), crate::engine::EpisodePhase::Done);
    }

    #[test]
    fn tagged_carrier_drops_flag_and_defender_returns_it() {
        let mut env = env(vec![
            AgentSpec::new("r").with_team("red").at(Position::new(6, 2)),
            AgentSpec::new("b").with_team("blue").at(Position::new(5, 2)),
        ]);
        env.reset().unwrap();
        act(&mut env, &[("r", Action::interact(Interaction::PickUp))]);
        act(&mut env, &[("r", Action::moving(Direction::Up))]);
        act(
            &mut env,
            &[(
                "b",
                Action::interact(Interaction::Attack {
                    target: Some("r".into()),
                }),
            )],
        );
        // The attacker stands next to the dropped flag, so it goes home at once.
        let flag = flag_of(&env, "blue");
        assert!(!flag.is_carried());
        assert_eq!(flag.position, Position::new(6, 2));
        assert!(env.agent("r").unwrap().is_tagged());
        assert_eq!(env.agent("r").unwrap().carrying, None);
        let b = env.agent("b").unwrap().score.individual;
        assert!((b - 0.3).abs() < 1e-12);
    }
}
