//! Read-only projections of the committed state: a text grid and a
//! structured snapshot. Neither mutates the world.

use std::fmt::Write as _;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::agent::Score;
use super::entity::EntityKind;
use super::grid::SpecialKind;
use super::types::{EntityId, Position, TeamId};
use super::world::World;
use crate::Id;

/// Glyph for the agent at registration index `i`.
fn agent_glyph(i: usize) -> char {
    match i {
        0..=9 => char::from(b'0' + i as u8),
        10..=35 => char::from(b'a' + (i - 10) as u8),
        _ => '@',
    }
}

fn entity_glyph(kind: EntityKind, heavy: bool) -> char {
    match (kind, heavy) {
        (EntityKind::Resource, false) => 'r',
        (EntityKind::Resource, true) => 'R',
        (EntityKind::Flag, _) => 'f',
        (EntityKind::PuzzleElement, _) => 'p',
        (EntityKind::Goal, _) => 'g',
    }
}

/// Grid rows as text. Agents win over entities, entities over terrain.
fn grid_rows(world: &World) -> Vec<String> {
    let grid = &world.grid;
    let mut rows: Vec<Vec<char>> = (0..grid.height())
        .map(|y| {
            (0..grid.width())
                .map(|x| grid.cell(&Position::new(x, y)).map_or(' ', |c| c.glyph()))
                .collect()
        })
        .collect();
    let mut put = |p: &Position, glyph: char| {
        if let Some(cell) = rows
            .get_mut(p.y as usize)
            .and_then(|row| row.get_mut(p.x as usize))
        {
            *cell = glyph;
        }
    };
    for entity in world.entities.iter() {
        put(
            &entity.position,
            entity_glyph(entity.kind(), entity.required_carriers() > 1),
        );
    }
    for (i, agent) in world.agents.iter().enumerate() {
        put(&agent.position, agent_glyph(i));
    }
    rows.into_iter().map(|r| r.into_iter().collect()).collect()
}

/// Renders the grid followed by one legend line per agent.
///
/// Terrain: `.` empty, `#` obstacle, `D` depot, `B` base, `T` territory,
/// `G` goal. Entities: `r`/`R` light/heavy resource, `f` flag, `p` puzzle
/// element, `g` goal. Agents by registration index `0`-`9`, `a`-`z`.
pub fn render_text(world: &World) -> String {
    let mut out = format!("step {}\n", world.step);
    for row in grid_rows(world) {
        out.push_str(&row);
        out.push('\n');
    }
    for (i, agent) in world.agents.iter().enumerate() {
        let _ = write!(
            out,
            "{} {} team={} at {} score={:.2}",
            agent_glyph(i),
            agent.id,
            agent.team.as_deref().unwrap_or("-"),
            agent.position,
            agent.score.total()
        );
        if let Some(e) = agent.carrying {
            let _ = write!(out, " carrying {}", e);
        }
        if agent.is_tagged() {
            let _ = write!(out, " tagged({})", agent.tagged_for);
        }
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AgentSnapshot {
    pub id: Id,
    pub team: Option<TeamId>,
    pub position: Position,
    pub carrying: Option<EntityId>,
    pub score: Score,
    pub health: f64,
    pub tagged: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Position,
    pub carriers: Vec<Id>,
}

/// Owner and strength of a special cell.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpecialSnapshot {
    pub position: Position,
    pub kind: SpecialKind,
    pub owner: Option<TeamId>,
    pub strength: f64,
}

/// Structured view of the committed state for external visualization.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Snapshot {
    pub episode_id: Id,
    pub step: u32,
    pub width: i32,
    pub height: i32,
    /// Same rows as [`render_text`], top row first.
    pub rows: Vec<String>,
    pub agents: Vec<AgentSnapshot>,
    pub entities: Vec<EntitySnapshot>,
    pub specials: Vec<SpecialSnapshot>,
}

impl Snapshot {
    pub fn capture(world: &World, episode_id: &str) -> Self {
        let agents = world
            .agents
            .iter()
            .map(|a| AgentSnapshot {
                id: a.id.clone(),
                team: a.team.clone(),
                position: a.position,
                carrying: a.carrying,
                score: a.score,
                health: a.health,
                tagged: a.is_tagged(),
            })
            .collect();
        let entities = world
            .entities
            .iter()
            .map(|e| EntitySnapshot {
                id: e.id,
                kind: e.kind(),
                position: e.position,
                carriers: e.carriers.clone(),
            })
            .collect();
        let specials = [
            SpecialKind::Depot,
            SpecialKind::Base,
            SpecialKind::Territory,
            SpecialKind::Goal,
        ]
        .into_iter()
        .flat_map(|kind| {
            world
                .grid
                .specials_of(kind)
                .into_iter()
                .map(move |p| (kind, p))
        })
        .filter_map(|(kind, position)| {
            let state = world.grid.special_state(&position)?;
            Some(SpecialSnapshot {
                position,
                kind,
                owner: state.owner.clone(),
                strength: state.strength,
            })
        })
        .collect();

        Self {
            episode_id: episode_id.to_string(),
            step: world.step,
            width: world.grid.width(),
            height: world.grid.height(),
            rows: grid_rows(world),
            agents,
            entities,
            specials,
        }
    }
}
