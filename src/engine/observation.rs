//! Observation encoding for the grid environment.
//!
//! Builds each agent's windowed multi-channel view plus nearby-agent and
//! nearby-entity lists and its message inbox. Observations are pure
//! functions of the committed [`World`]; building one never mutates state.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::action::InteractionKind;
use super::agent::{AgentState, Score};
use super::config::EnvConfig;
use super::entity::EntityKind;
use super::message::Message;
use super::scenario::{Scenario, CORE_CHANNELS};
use super::types::{EntityId, Position, TeamId};
use super::world::World;
use crate::Id;

/// Channel 1 code for the observing agent itself.
pub const AGENT_SELF: f64 = 1.0;
/// Channel 1 code for a teammate.
pub const AGENT_TEAMMATE: f64 = 2.0;
/// Channel 1 code for any other agent.
pub const AGENT_OTHER: f64 = 3.0;

/// Agent-centred `(2D+1)x(2D+1)` window, stored channel-major:
/// `data[c * size * size + row * size + col]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewTensor {
    pub size: usize,
    pub channels: usize,
    pub data: Vec<f64>,
}

impl ViewTensor {
    fn zeros(size: usize, channels: usize) -> Self {
        Self {
            size,
            channels,
            data: vec![0.0; size * size * channels],
        }
    }

    /// Value at `channel`, window `row` and `col`.
    pub fn get(&self, channel: usize, row: usize, col: usize) -> f64 {
        self.data[self.offset(channel, row, col)]
    }

    /// One channel as a row-major slice.
    pub fn channel(&self, channel: usize) -> &[f64] {
        let n = self.size * self.size;
        &self.data[channel * n..(channel + 1) * n]
    }

    fn offset(&self, channel: usize, row: usize, col: usize) -> usize {
        channel * self.size * self.size + row * self.size + col
    }
}

/// Public view of another agent.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AgentSighting {
    pub id: Id,
    pub position: Position,
    /// Chebyshev distance from the observer.
    pub distance: u32,
    pub team: Option<TeamId>,
    pub carrying: bool,
    pub tagged: bool,
    /// Only present when specializations are configured as observable.
    pub specialization: Option<String>,
}

/// View of a nearby entity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntitySighting {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Position,
    pub distance: u32,
    pub carried: bool,
    pub required_carriers: usize,
}

/// The observer's own private state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelfView {
    pub position: Position,
    pub team: Option<TeamId>,
    pub specialization: Option<String>,
    pub carrying: Option<EntityId>,
    pub health: f64,
    pub tagged_for: u32,
    pub score: Score,
    pub cooldowns: BTreeMap<InteractionKind, u32>,
}

/// Everything one agent perceives after a step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Observation {
    pub agent: Id,
    pub step: u32,
    pub view: ViewTensor,
    pub me: SelfView,
    /// Agents within the view distance, in registration order.
    pub nearby_agents: Vec<AgentSighting>,
    /// Visible entities within the view distance, in id order.
    pub nearby_entities: Vec<EntitySighting>,
    /// Messages addressed to this agent inside the retention window,
    /// oldest first.
    pub inbox: Vec<Message>,
}

/// Builds observations for agents.
pub struct ObservationBuilder;

impl ObservationBuilder {
    /// Total channel count for a scenario.
    pub fn channel_count<S: Scenario + ?Sized>(scenario: &S) -> usize {
        CORE_CHANNELS + scenario.extra_channels()
    }

    /// Builds the observation of `agent_id`, or `None` if it is unknown.
    ///
    /// Channel 0 holds the terrain code, channel 1 the agent relation
    /// ([`AGENT_SELF`], [`AGENT_TEAMMATE`], [`AGENT_OTHER`]) and the rest
    /// are filled by the scenario. Out-of-bounds cells stay zero.
    pub fn build<S: Scenario + ?Sized>(
        world: &World,
        scenario: &S,
        config: &EnvConfig,
        agent_id: &str,
    ) -> Option<Observation> {
        let me = world.agents.get(agent_id)?;
        let d = config.view_distance as i32;
        let size = config.window_size();
        let extra = scenario.extra_channels();
        let mut view = ViewTensor::zeros(size, CORE_CHANNELS + extra);
        let mut cell_channels = vec![0.0; extra];

        for row in 0..size {
            for col in 0..size {
                let pos = Position::new(
                    me.position.x + col as i32 - d,
                    me.position.y + row as i32 - d,
                );
                let Some(cell) = world.grid.cell(&pos) else {
                    continue;
                };
                let terrain = view.offset(0, row, col);
                view.data[terrain] = cell.code();

                if let Some(other) = world.agents.agent_at(&pos) {
                    let slot = view.offset(1, row, col);
                    view.data[slot] = Self::relation(me, other);
                }

                cell_channels.fill(0.0);
                scenario.encode_cell(world, me, &pos, &mut cell_channels);
                for (c, value) in cell_channels.iter().enumerate() {
                    let slot = view.offset(CORE_CHANNELS + c, row, col);
                    view.data[slot] = *value;
                }
            }
        }

        let radius = config.view_distance;
        let nearby_agents = world
            .agents
            .iter()
            .filter(|a| a.id != me.id)
            .filter_map(|a| {
                let distance = me.position.chebyshev(&a.position);
                (distance <= radius).then(|| AgentSighting {
                    id: a.id.clone(),
                    position: a.position,
                    distance,
                    team: a.team.clone(),
                    carrying: a.carrying.is_some(),
                    tagged: a.is_tagged(),
                    specialization: if config.reveal_specializations {
                        a.specialization.clone()
                    } else {
                        None
                    },
                })
            })
            .collect();

        let nearby_entities = world
            .entities
            .iter()
            .filter(|e| scenario.entity_visible(e, me))
            .filter_map(|e| {
                let distance = me.position.chebyshev(&e.position);
                (distance <= radius).then(|| EntitySighting {
                    id: e.id,
                    kind: e.kind(),
                    position: e.position,
                    distance,
                    carried: e.is_carried(),
                    required_carriers: e.required_carriers(),
                })
            })
            .collect();

        let inbox = world
            .messages
            .inbox(&me.id, me.team.as_deref(), world.step);

        Some(Observation {
            agent: me.id.clone(),
            step: world.step,
            view,
            me: SelfView {
                position: me.position,
                team: me.team.clone(),
                specialization: me.specialization.clone(),
                carrying: me.carrying,
                health: me.health,
                tagged_for: me.tagged_for,
                score: me.score,
                cooldowns: me.cooldowns.clone(),
            },
            nearby_agents,
            nearby_entities,
            inbox,
        })
    }

    /// Builds observations for every agent, keyed by id.
    pub fn build_all<S: Scenario + ?Sized>(
        world: &World,
        scenario: &S,
        config: &EnvConfig,
    ) -> BTreeMap<Id, Observation> {
        world
            .agents
            .ids()
            .into_iter()
            .filter_map(|id| Self::build(world, scenario, config, &id).map(|o| (id, o)))
            .collect()
    }

    fn relation(me: &AgentState, other: &AgentState) -> f64 {
        if other.id == me.id {
            AGENT_SELF
        } else if me.is_teammate_of(other) {
            AGENT_TEAMMATE
        } else {
            AGENT_OTHER
        }
    }
}
