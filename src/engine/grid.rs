//! Static occupancy grid with designated special cells.
//!
//! The layout (obstacles and special cells) is fixed once built. Only the
//! auxiliary state of special cells (owner, claim strength) changes during
//! an episode, and [`Grid::reset_special_state`] restores it.

use std::collections::BTreeMap;
use std::fmt;

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::UnGraphMap;
use rand::seq::SliceRandom;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::types::{Direction, Position, TeamId};

/// Kind of a designated special cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SpecialKind {
    /// Drop-off point for resources.
    Depot,
    /// A team's home base.
    Base,
    /// Claimable territory.
    Territory,
    /// Target cell for goal-driven scenarios.
    Goal,
}

impl SpecialKind {
    /// Terrain code used in observation channel 0 (after empty=0, obstacle=1).
    pub fn code(&self) -> f64 {
        match self {
            SpecialKind::Depot => 2.0,
            SpecialKind::Base => 3.0,
            SpecialKind::Territory => 4.0,
            SpecialKind::Goal => 5.0,
        }
    }

    fn glyph(&self) -> char {
        match self {
            SpecialKind::Depot => 'D',
            SpecialKind::Base => 'B',
            SpecialKind::Territory => 'T',
            SpecialKind::Goal => 'G',
        }
    }
}

/// One cell of the grid layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum GridCell {
    #[default]
    Empty,
    Obstacle,
    Special(SpecialKind),
}

impl GridCell {
    /// Terrain code for observation channel 0.
    pub fn code(&self) -> f64 {
        match self {
            GridCell::Empty => 0.0,
            GridCell::Obstacle => 1.0,
            GridCell::Special(kind) => kind.code(),
        }
    }

    /// Character used by the text renderer.
    pub fn glyph(&self) -> char {
        match self {
            GridCell::Empty => '.',
            GridCell::Obstacle => '#',
            GridCell::Special(kind) => kind.glyph(),
        }
    }
}

/// Mutable auxiliary state carried by a special cell.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellState {
    /// Owning team, if any.
    pub owner: Option<TeamId>,
    /// Claim strength in `[0, 1]`.
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct SpecialCell {
    initial: CellState,
    state: CellState,
}

/// Fixed-size 2D grid stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<GridCell>,
    specials: BTreeMap<Position, SpecialCell>,
}

impl Grid {
    /// Creates an empty grid.
    pub fn new(width: i32, height: i32) -> Result<Self, ConfigError> {
        if width <= 0 || height <= 0 {
            return Err(ConfigError::InvalidGrid { width, height });
        }
        Ok(Self {
            width,
            height,
            cells: vec![GridCell::Empty; (width as usize) * (height as usize)],
            specials: BTreeMap::new(),
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn is_in_bounds(&self, pos: &Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    /// True for obstacle cells. Out-of-bounds positions are not obstacles;
    /// check [`Grid::is_in_bounds`] first.
    pub fn is_obstacle(&self, pos: &Position) -> bool {
        matches!(self.cell(pos), Some(GridCell::Obstacle))
    }

    /// In bounds and not an obstacle.
    pub fn is_passable(&self, pos: &Position) -> bool {
        self.is_in_bounds(pos) && !self.is_obstacle(pos)
    }

    /// Returns the layout cell at `pos`, or `None` outside the grid.
    pub fn cell(&self, pos: &Position) -> Option<GridCell> {
        self.index(pos).map(|i| self.cells[i])
    }

    /// Marks `pos` as an obstacle. Special cells are never overwritten.
    ///
    /// Returns `false` if the cell is out of bounds or special.
    pub fn set_obstacle(&mut self, pos: Position) -> bool {
        match self.index(&pos) {
            Some(i) if !matches!(self.cells[i], GridCell::Special(_)) => {
                self.cells[i] = GridCell::Obstacle;
                true
            }
            _ => false,
        }
    }

    /// Designates `pos` as a special cell with an initial owner.
    ///
    /// Returns `false` if the cell is out of bounds.
    pub fn set_special(&mut self, pos: Position, kind: SpecialKind, owner: Option<TeamId>) -> bool {
        let Some(i) = self.index(&pos) else {
            return false;
        };
        self.cells[i] = GridCell::Special(kind);
        let strength = if owner.is_some() { 1.0 } else { 0.0 };
        let initial = CellState { owner, strength };
        self.specials.insert(
            pos,
            SpecialCell {
                state: initial.clone(),
                initial,
            },
        );
        true
    }

    /// Auxiliary state of a special cell.
    pub fn special_state(&self, pos: &Position) -> Option<&CellState> {
        self.specials.get(pos).map(|s| &s.state)
    }

    pub fn special_state_mut(&mut self, pos: &Position) -> Option<&mut CellState> {
        self.specials.get_mut(pos).map(|s| &mut s.state)
    }

    /// Positions of every special cell of `kind`, in row-major order.
    pub fn specials_of(&self, kind: SpecialKind) -> Vec<Position> {
        let mut out: Vec<Position> = self
            .specials
            .keys()
            .copied()
            .filter(|p| self.cell(p) == Some(GridCell::Special(kind)))
            .collect();
        out.sort_by_key(|p| (p.y, p.x));
        out
    }

    /// Special cells of `kind` whose initial owner is `team`.
    pub fn specials_owned_initially(&self, kind: SpecialKind, team: &str) -> Vec<Position> {
        self.specials_of(kind)
            .into_iter()
            .filter(|p| {
                self.specials
                    .get(p)
                    .and_then(|s| s.initial.owner.as_deref())
                    == Some(team)
            })
            .collect()
    }

    /// Restores the owner and strength of every special cell.
    pub fn reset_special_state(&mut self) {
        for special in self.specials.values_mut() {
            special.state = special.initial.clone();
        }
    }

    /// Removes every obstacle, keeping special cells.
    pub fn clear_obstacles(&mut self) {
        for cell in &mut self.cells {
            if *cell == GridCell::Obstacle {
                *cell = GridCell::Empty;
            }
        }
    }

    /// Every passable cell, in row-major order.
    pub fn passable_cells(&self) -> Vec<Position> {
        let mut out = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let p = Position::new(x, y);
                if !self.is_obstacle(&p) {
                    out.push(p);
                }
            }
        }
        out
    }

    /// Number of passable orthogonal neighbours of `pos`.
    pub fn passable_neighbours(&self, pos: &Position) -> usize {
        pos.neighbours()
            .iter()
            .filter(|n| self.is_passable(n))
            .count()
    }

    /// Whether every landmark can reach every other through passable cells.
    pub fn connects(&self, landmarks: &[Position]) -> bool {
        let Some((first, rest)) = landmarks.split_first() else {
            return true;
        };
        let graph = self.passable_graph();
        if !graph.contains_node(*first) {
            return false;
        }
        rest.iter()
            .all(|p| graph.contains_node(*p) && has_path_connecting(&graph, *first, *p, None))
    }

    /// Lays out obstacles: an optional central seam with openings every third
    /// row, then `fraction` of the remaining free cells chosen at random.
    ///
    /// Cells in `reserved` and special cells are never blocked, and a random
    /// placement is rejected when it would disconnect the `landmarks`.
    pub fn generate_obstacles<R: Rng>(
        &mut self,
        rng: &mut R,
        seam: bool,
        fraction: f64,
        reserved: &[Position],
        landmarks: &[Position],
    ) {
        if seam {
            self.add_seam(reserved);
        }

        let mut candidates: Vec<Position> = self
            .passable_cells()
            .into_iter()
            .filter(|p| self.cell(p) == Some(GridCell::Empty) && !reserved.contains(p))
            .collect();
        let target = (fraction * candidates.len() as f64).round() as usize;
        candidates.shuffle(rng);

        let mut placed = 0;
        for p in candidates {
            if placed >= target {
                break;
            }
            self.set_obstacle(p);
            if self.connects(landmarks) {
                placed += 1;
            } else if let Some(i) = self.index(&p) {
                self.cells[i] = GridCell::Empty;
            }
        }
    }

    /// Blocks the centre column except for an opening every third row.
    /// Grids narrower than three columns get no seam.
    pub fn add_seam(&mut self, reserved: &[Position]) {
        if self.width < 3 {
            return;
        }
        let x = self.width / 2;
        for y in 0..self.height {
            let p = Position::new(x, y);
            if y % 3 != 1 && !reserved.contains(&p) {
                self.set_obstacle(p);
            }
        }
    }

    fn passable_graph(&self) -> UnGraphMap<Position, ()> {
        let mut graph = UnGraphMap::new();
        for p in self.passable_cells() {
            graph.add_node(p);
            for n in [p.offset(Direction::Right), p.offset(Direction::Down)] {
                if self.is_passable(&n) {
                    graph.add_edge(p, n, ());
                }
            }
        }
        graph
    }

    fn index(&self, pos: &Position) -> Option<usize> {
        if self.is_in_bounds(pos) {
            Some((pos.y * self.width + pos.x) as usize)
        } else {
            None
        }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.height {
            for x in 0..self.width {
                let glyph = self
                    .cell(&Position::new(x, y))
                    .map(|c| c.glyph())
                    .unwrap_or(' ');
                write!(f, "{}", glyph)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
