//! gridcoop - turn-based multi-agent grid simulations
//!
//! A deterministic engine for populations of agents cooperating and
//! competing on a grid, with pluggable scenarios, four reward models and
//! baseline policies for evaluation.

pub mod engine;
pub mod metrics;
pub mod policy;
pub mod scenarios;

pub use engine::{Action, AgentSpec, EnvConfig, EnvError, GridEnvironment, Observation, Scenario};

/// Identifier type used for agents, teams and episodes.
pub type Id = String;

/// Generates a new unique identifier (UUID v4).
pub fn generate_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}
