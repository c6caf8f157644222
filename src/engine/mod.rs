//! Multi-agent grid simulation engine.
//!
//! The engine core owns spatial state, agent state, observation building,
//! ordered action resolution, entity lifecycle, messaging and reward
//! allocation. Concrete scenarios plug in through the [`Scenario`] hooks.

pub mod action;
pub mod agent;
pub mod config;
pub mod entity;
pub mod environment;
pub mod error;
pub mod grid;
pub mod message;
pub mod observation;
pub mod render;
pub mod resolver;
pub mod reward;
pub mod scenario;
pub mod types;
pub mod world;

pub use action::{Action, ActionKind, Interaction, InteractionKind, OutgoingMessage};
pub use agent::{AgentState, AgentStore, Score};
pub use config::{AgentSpec, CombatConfig, EnvConfig, ObstacleLayout};
pub use entity::{Entity, EntityKind, EntityPayload, EntityRegistry, PickupOutcome};
pub use environment::{
    Episode, EpisodePhase, GridEnvironment, StepInfo, StepResult, Termination,
};
pub use error::{ConfigError, EnvError};
pub use grid::{CellState, Grid, GridCell, SpecialKind};
pub use message::{Message, MessageLog, MessagePayload, Recipient};
pub use observation::{
    AgentSighting, EntitySighting, Observation, ObservationBuilder, SelfView, ViewTensor,
};
pub use render::{render_text, Snapshot};
pub use resolver::{ActionResolver, InteractionOutcome, StepOutcome};
pub use reward::{RewardCause, RewardEngine, RewardEvent, RewardStructure};
pub use scenario::{FreeRoam, Scenario};
pub use types::{AgentHandle, Direction, EntityId, Position, TeamId};
pub use world::World;
