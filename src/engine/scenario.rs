//! Scenario hooks.
//!
//! The engine core is fixed; a [`Scenario`] parameterizes it with a layout,
//! the entities it spawns, which interactions are legal, the reward events
//! it produces and its goal predicate. Every hook except [`Scenario::name`]
//! has a neutral default.

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;

use super::action::InteractionKind;
use super::agent::AgentState;
use super::config::{AgentSpec, EnvConfig};
use super::entity::{Entity, EntityPayload};
use super::error::{ConfigError, EnvError};
use super::grid::{Grid, GridCell};
use super::resolver::InteractionOutcome;
use super::reward::RewardEvent;
use super::types::Position;
use super::world::World;

/// Number of observation channels the engine itself fills (terrain, agents).
pub const CORE_CHANNELS: usize = 2;

/// Behaviour layered on the engine core by a concrete scenario.
pub trait Scenario: fmt::Debug {
    /// Human-readable scenario name.
    fn name(&self) -> &str;

    /// Rejects configurations the scenario cannot run with.
    fn validate(&self, _config: &EnvConfig) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Marks special cells. Called before obstacles are generated.
    fn layout(&self, _grid: &mut Grid, _config: &EnvConfig) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Cells that obstacle generation must keep mutually reachable and
    /// never block. Defaults to every special cell.
    fn landmarks(&self, grid: &Grid) -> Vec<Position> {
        grid.passable_cells()
            .into_iter()
            .filter(|p| matches!(grid.cell(p), Some(GridCell::Special(_))))
            .collect()
    }

    /// Whether obstacles are regenerated on every reset instead of only at
    /// construction.
    fn regenerates_layout(&self) -> bool {
        false
    }

    /// Preferred spawn cells for an agent without a fixed start. `None`
    /// spawns anywhere.
    fn spawn_region(&self, _spec: &AgentSpec, _grid: &Grid) -> Option<Vec<Position>> {
        None
    }

    /// Places the scenario's entities at reset, after agents are placed.
    fn populate(&mut self, _world: &mut World, _rng: &mut StdRng) -> Result<(), EnvError> {
        Ok(())
    }

    /// Interaction table: interactions returning `false` are no-ops.
    fn allows(&self, _kind: InteractionKind) -> bool {
        true
    }

    /// Extra gate on pickups, checked after the engine's own preconditions.
    fn can_pick_up(&self, _world: &World, _agent: &AgentState, _entity: &Entity) -> bool {
        true
    }

    /// Handles [`Interaction::Activate`](super::action::Interaction::Activate).
    /// Returns `false` when the activation had no effect.
    fn activate(
        &mut self,
        _world: &mut World,
        _agent: &str,
        _events: &mut Vec<RewardEvent>,
    ) -> bool {
        false
    }

    /// Reward producer for successful interactions.
    fn on_outcome(
        &mut self,
        _world: &World,
        _agent: &str,
        _outcome: &InteractionOutcome,
        _events: &mut Vec<RewardEvent>,
    ) {
    }

    /// Consumption checks run after all interactions of a step.
    fn lifecycle(&mut self, _world: &mut World, _events: &mut Vec<RewardEvent>) {}

    /// Scenario-defined goal. The step budget is checked by the engine.
    fn goal_reached(&self, _world: &World) -> bool {
        false
    }

    /// Number of observation channels after terrain and agents.
    fn extra_channels(&self) -> usize {
        2
    }

    /// Fills the scenario channels for one in-bounds cell of `viewer`'s
    /// window. `out` has [`Scenario::extra_channels`] slots, all zero.
    ///
    /// The default writes the kind code of the first visible entity on the
    /// cell, then the ownership relation of a special cell (+1 own team,
    /// -1 another team).
    fn encode_cell(&self, world: &World, viewer: &AgentState, pos: &Position, out: &mut [f64]) {
        if let Some(slot) = out.get_mut(0) {
            if let Some(entity) = world
                .entities
                .iter()
                .find(|e| e.position == *pos && self.entity_visible(e, viewer))
            {
                *slot = entity.kind().code();
            }
        }
        if let Some(slot) = out.get_mut(1) {
            if let Some(owner) = world.grid.special_state(pos).and_then(|s| s.owner.as_ref()) {
                *slot = if viewer.team.as_ref() == Some(owner) {
                    1.0
                } else {
                    -1.0
                };
            }
        }
    }

    /// Whether `viewer` can perceive `entity`. Puzzle elements with a
    /// visibility set are only seen by matching specializations.
    fn entity_visible(&self, entity: &Entity, viewer: &AgentState) -> bool {
        match &entity.payload {
            EntityPayload::PuzzleElement {
                visible_to: Some(set),
                ..
            } => viewer
                .specialization
                .as_ref()
                .map(|s| set.contains(s))
                .unwrap_or(false),
            _ => true,
        }
    }

    /// Scenario counters reported in each agent's step info.
    fn counters(&self, _world: &World, _agent: &AgentState) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

/// Engine core with no scenario mechanics: an empty grid where agents can
/// move, talk and fight.
#[derive(Debug, Clone, Default)]
pub struct FreeRoam;

impl Scenario for FreeRoam {
    fn name(&self) -> &str {
        "free_roam"
    }
}
