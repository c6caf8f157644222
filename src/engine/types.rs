//! Core types for the grid engine.
//!
//! Defines integer grid positions, movement directions and the small
//! integer handles used to index the agent and entity arenas.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Team identifier. Teams are named by the roster configuration.
pub type TeamId = String;

/// A cell coordinate on the grid: `x` is the column, `y` is the row.
///
/// Positions are plain values; callers validate them against the grid
/// bounds before assigning them to agents or entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    /// Creates a new position.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the neighbouring position one step in `direction`.
    pub fn offset(&self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Chebyshev (king-move) distance to another position.
    pub fn chebyshev(&self, other: &Position) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }

    /// Manhattan distance to another position.
    pub fn manhattan(&self, other: &Position) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// True when `other` is one of the eight surrounding cells.
    pub fn is_adjacent(&self, other: &Position) -> bool {
        self.chebyshev(other) == 1
    }

    /// The four orthogonal neighbours, in [`Direction::ALL`] order.
    pub fn neighbours(&self) -> [Position; 4] {
        Direction::ALL.map(|d| self.offset(d))
    }

    /// Returns the direction of the first step on a straight-line path
    /// toward `target`, preferring the axis with the larger gap.
    ///
    /// Returns `None` when the positions coincide.
    pub fn step_toward(&self, target: &Position) -> Option<Direction> {
        let dx = target.x - self.x;
        let dy = target.y - self.y;
        if dx == 0 && dy == 0 {
            return None;
        }
        if dx.abs() >= dy.abs() {
            Some(if dx > 0 {
                Direction::Right
            } else {
                Direction::Left
            })
        } else {
            Some(if dy > 0 { Direction::Down } else { Direction::Up })
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Orthogonal movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// All directions in a fixed order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// `(dx, dy)` displacement of one step. `Up` decreases the row.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Returns the index of this direction (0=Up, 1=Down, 2=Left, 3=Right).
    pub fn index(&self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

/// Arena slot of an agent inside the agent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentHandle(pub usize);

/// Identifier of an entity. Doubles as its arena slot and is never reused
/// within an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_follows_direction() {
        let p = Position::new(2, 2);
        assert_eq!(p.offset(Direction::Up), Position::new(2, 1));
        assert_eq!(p.offset(Direction::Down), Position::new(2, 3));
        assert_eq!(p.offset(Direction::Left), Position::new(1, 2));
        assert_eq!(p.offset(Direction::Right), Position::new(3, 2));
    }

    #[test]
    fn distances() {
        let a = Position::new(0, 0);
        let b = Position::new(3, 4);
        assert_eq!(a.chebyshev(&b), 4);
        assert_eq!(a.manhattan(&b), 7);
    }

    #[test]
    fn adjacency_includes_diagonals_but_not_self() {
        let p = Position::new(1, 1);
        assert!(p.is_adjacent(&Position::new(2, 2)));
        assert!(p.is_adjacent(&Position::new(1, 0)));
        assert!(!p.is_adjacent(&p));
        assert!(!p.is_adjacent(&Position::new(3, 1)));
    }

    #[test]
    fn step_toward_prefers_larger_gap() {
        let p = Position::new(0, 0);
        assert_eq!(p.step_toward(&Position::new(3, 1)), Some(Direction::Right));
        assert_eq!(p.step_toward(&Position::new(0, -2)), Some(Direction::Up));
        assert_eq!(p.step_toward(&p), None);
    }
}
