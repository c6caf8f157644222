//! Concrete scenarios layered on the engine core.
//!
//! Each scenario only implements [`Scenario`](crate::engine::Scenario)
//! hooks; any of them runs under any
//! [`RewardStructure`](crate::engine::RewardStructure).

pub mod capture_the_flag;
pub mod collaborative_puzzle;
pub mod resource_collection;
pub mod territory_control;

pub use capture_the_flag::{CaptureTheFlag, CtfConfig};
pub use collaborative_puzzle::{CollaborativePuzzle, PuzzleConfig};
pub use resource_collection::{ResourceCollection, ResourceConfig, ResourceSpec};
pub use territory_control::{TerritoryConfig, TerritoryControl};

use rand::rngs::StdRng;

use crate::engine::{EntityId, EntityPayload, EnvError, GridCell, Position, TeamId, World};

/// Spawns an entity on a random empty (non-special) cell with no agent or
/// entity on it.
pub(crate) fn spawn_on_floor(
    world: &mut World,
    payload: EntityPayload,
    rng: &mut StdRng,
) -> Result<EntityId, EnvError> {
    let grid = &world.grid;
    let agents = &world.agents;
    world
        .entities
        .spawn(payload, rng, grid.width(), grid.height(), |p| {
            grid.cell(p) == Some(GridCell::Empty) && !agents.is_occupied(p, &[])
        })
}

/// Distinct teams of a roster in order of first appearance, and whether
/// every agent has one.
pub(crate) fn roster_teams(config: &crate::engine::EnvConfig) -> (Vec<TeamId>, bool) {
    let mut teams: Vec<TeamId> = Vec::new();
    let mut all = true;
    for spec in &config.agents {
        match &spec.team {
            Some(team) if !teams.contains(team) => teams.push(team.clone()),
            Some(_) => {}
            None => all = false,
        }
    }
    (teams, all)
}

/// Whether `pos` is a cell where a fixed placement may go.
pub(crate) fn in_grid(config: &crate::engine::EnvConfig, pos: &Position) -> bool {
    pos.x >= 0 && pos.y >= 0 && pos.x < config.width && pos.y < config.height
}
