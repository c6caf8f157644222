use thiserror::Error;

use super::types::Position;
use crate::Id;

/// Errors raised while validating an environment configuration.
///
/// These are fatal: an environment is never constructed from a
/// configuration that fails validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid grid size {width}x{height}: both dimensions must be positive")]
    InvalidGrid { width: i32, height: i32 },

    #[error("View distance must be at least 1")]
    InvalidViewDistance,

    #[error("Agent ID already exists: {0}")]
    DuplicateAgent(Id),

    #[error("Start position {position} of agent {agent} is out of bounds or blocked")]
    InvalidStart { agent: Id, position: Position },

    #[error("Agents {first} and {second} share start position {position}")]
    DuplicateStart {
        first: Id,
        second: Id,
        position: Position,
    },

    #[error("Reward weights must be non-negative and not both zero")]
    InvalidRewardWeights,

    #[error("Message retention window must be at least 1 step")]
    InvalidRetention,

    #[error("Obstacle at {0} is out of bounds")]
    InvalidObstacle(Position),

    #[error("Obstacle fraction {0} must lie in [0, 0.5]")]
    InvalidObstacleFraction(f64),

    #[error("{agents} agents do not fit on {free} free cells")]
    TooManyAgents { agents: usize, free: usize },

    #[error("Scenario configuration error: {0}")]
    Scenario(String),
}

/// Errors surfaced by the environment at run time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot {operation} while the episode is {phase}")]
    Lifecycle {
        operation: &'static str,
        phase: &'static str,
    },

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("No free cell available to place {what}")]
    NoFreeCell { what: String },
}
