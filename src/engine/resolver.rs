//! Action resolver: applies one step of per-agent actions.
//!
//! A step runs through fixed sub-phases:
//! collect actions → resolve movement → resolve interactions →
//! resolve entity lifecycle → advance clock.
//!
//! Agents are visited in registration order in every phase, so a fixed
//! action batch on a fixed state always yields the same result.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::action::{Action, ActionKind, Interaction, InteractionKind};
use super::config::EnvConfig;
use super::entity::{Entity, PickupOutcome};
use super::grid::{GridCell, SpecialKind};
use super::message::Message;
use super::reward::{RewardCause, RewardEvent};
use super::scenario::Scenario;
use super::types::{Direction, EntityId, Position, TeamId};
use super::world::World;
use crate::Id;

/// Effect of a successful interaction, handed to the scenario's reward
/// producer.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutcome {
    /// The agent lifted an entity, or joined a pickup still short of
    /// carriers (`completed == false`).
    PickedUp { entity: EntityId, completed: bool },
    /// The carrier group released an entity at `position`.
    Dropped {
        entity: EntityId,
        position: Position,
        carriers: Vec<Id>,
    },
    Passed { entity: EntityId, to: Id },
    Stole { entity: EntityId, from: Id },
    /// An attack landed. `tagged` when the target's health hit zero.
    Hit {
        target: Id,
        tagged: bool,
        dropped: Option<EntityId>,
    },
    /// A territory claim changed the cell state. `flipped` when the cell
    /// changed owner.
    Claimed {
        position: Position,
        owner: TeamId,
        strength: f64,
        flipped: bool,
    },
    /// The scenario accepted an activation.
    Activated,
}

/// Everything a step produced besides the state change itself.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Raw reward events, in production order.
    pub events: Vec<RewardEvent>,
    /// Agents whose action was an invalid no-op.
    pub invalid: BTreeSet<Id>,
    /// Successful interactions in resolution order.
    pub outcomes: Vec<(Id, InteractionOutcome)>,
}

/// Resolves a batch of actions against the world.
pub struct ActionResolver;

impl ActionResolver {
    /// Runs every sub-phase of one step, including the clock advance.
    ///
    /// Agents missing from `actions` stay put. Action entries for unknown
    /// agents are ignored.
    pub fn resolve<S: Scenario + ?Sized>(
        world: &mut World,
        scenario: &mut S,
        config: &EnvConfig,
        actions: &BTreeMap<Id, Action>,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let order = world.agents.ids();
        let batch = Self::collect(world, &order, actions);

        Self::resolve_movement(world, &order, &batch, &mut outcome);
        Self::resolve_interactions(world, scenario, config, &order, &batch, &mut outcome);
        scenario.lifecycle(world, &mut outcome.events);
        Self::advance_clock(world, config);

        for id in &outcome.invalid {
            if let Some(agent) = world.agents.get_mut(id) {
                agent.last_action_invalid = true;
            }
            if config.invalid_action_penalty != 0.0 {
                outcome.events.push(RewardEvent::new(
                    id.clone(),
                    config.invalid_action_penalty,
                    RewardCause::InvalidAction,
                ));
            }
        }
        outcome
    }

    /// One action per live agent, defaulting to [`Action::stay`].
    fn collect(world: &mut World, order: &[Id], actions: &BTreeMap<Id, Action>) -> Vec<Action> {
        order
            .iter()
            .map(|id| {
                let action = actions.get(id).cloned().unwrap_or_default();
                if let Some(agent) = world.agents.get_mut(id) {
                    agent.last_action = Some(action.clone());
                    agent.last_action_invalid = false;
                }
                action
            })
            .collect()
    }

    fn resolve_movement(
        world: &mut World,
        order: &[Id],
        batch: &[Action],
        outcome: &mut StepOutcome,
    ) {
        let intents: BTreeMap<&str, Direction> = order
            .iter()
            .zip(batch)
            .filter_map(|(id, a)| a.direction().map(|d| (id.as_str(), d)))
            .collect();
        let mut groups_done: BTreeSet<EntityId> = BTreeSet::new();

        for (id, action) in order.iter().zip(batch) {
            let Some(direction) = action.direction() else {
                continue;
            };
            let Some(agent) = world.agents.get(id) else {
                continue;
            };
            if !agent.can_act() {
                trace!(agent = %id, "frozen agent cannot move");
                outcome.invalid.insert(id.clone());
                continue;
            }
            let (from, carrying) = (agent.position, agent.carrying);

            let group = carrying
                .and_then(|e| world.entities.get(e))
                .filter(|e| e.is_group_carried())
                .map(|e| e.id);
            if let Some(entity) = group {
                if groups_done.insert(entity) && !Self::move_group(world, entity, &intents) {
                    let carriers = world
                        .entities
                        .get(entity)
                        .map(|e| e.carriers.clone())
                        .unwrap_or_default();
                    for carrier in carriers {
                        if intents.contains_key(carrier.as_str()) {
                            outcome.invalid.insert(carrier);
                        }
                    }
                }
                continue;
            }

            let target = from.offset(direction);
            if !world.can_enter(&target, &[id.as_str()]) {
                trace!(agent = %id, %target, "move blocked");
                outcome.invalid.insert(id.clone());
                continue;
            }
            if let Some(agent) = world.agents.get_mut(id) {
                agent.position = target;
            }
            if let Some(entity) = carrying.and_then(|e| world.entities.get_mut(e)) {
                entity.position = target;
            }
            trace!(agent = %id, %from, %target, "moved");
        }

        Self::prune_pending(world);
    }

    /// Moves a multi-carrier entity and its carriers in lockstep. The group
    /// moves only if every carrier intends the same direction and every
    /// carrier target is free of obstacles and of agents outside the group.
    fn move_group(world: &mut World, entity: EntityId, intents: &BTreeMap<&str, Direction>) -> bool {
        let Some(e) = world.entities.get(entity) else {
            return false;
        };
        let carriers = e.carriers.clone();
        let mut direction = None;
        for carrier in &carriers {
            match (intents.get(carrier.as_str()), direction) {
                (None, _) => return false,
                (Some(d), None) => direction = Some(*d),
                (Some(d), Some(agreed)) if *d != agreed => return false,
                _ => {}
            }
        }
        let Some(direction) = direction else {
            return false;
        };

        let entity_target = e.position.offset(direction);
        if !world.grid.is_passable(&entity_target) {
            return false;
        }
        let group: Vec<&str> = carriers.iter().map(|c| c.as_str()).collect();
        let mut targets = Vec::with_capacity(carriers.len());
        for carrier in &carriers {
            let Some(agent) = world.agents.get(carrier) else {
                return false;
            };
            if !agent.can_act() {
                return false;
            }
            let target = agent.position.offset(direction);
            if !world.can_enter(&target, &group) {
                return false;
            }
            targets.push(target);
        }

        for (carrier, target) in carriers.iter().zip(targets) {
            if let Some(agent) = world.agents.get_mut(carrier) {
                agent.position = target;
            }
        }
        if let Some(e) = world.entities.get_mut(entity) {
            e.position = entity_target;
        }
        debug!(%entity, %direction, carriers = carriers.len(), "group moved");
        true
    }

    /// Drops pending pickup members who moved out of reach.
    fn prune_pending(world: &mut World) {
        let positions: BTreeMap<Id, Position> = world
            .agents
            .iter()
            .map(|a| (a.id.clone(), a.position))
            .collect();
        for entity in world.entities.iter_mut() {
            let at = entity.position;
            entity.pending.retain(|id| {
                positions
                    .get(id)
                    .map(|p| p.chebyshev(&at) <= 1)
                    .unwrap_or(false)
            });
        }
    }

    fn resolve_interactions<S: Scenario + ?Sized>(
        world: &mut World,
        scenario: &mut S,
        config: &EnvConfig,
        order: &[Id],
        batch: &[Action],
        outcome: &mut StepOutcome,
    ) {
        for (id, action) in order.iter().zip(batch) {
            if let ActionKind::Interact(interaction) = &action.kind {
                let result = Self::interact(world, scenario, config, id, interaction, outcome);
                match result {
                    Some(result) => {
                        scenario.on_outcome(world, id, &result, &mut outcome.events);
                        outcome.outcomes.push((id.clone(), result));
                    }
                    None => {
                        trace!(agent = %id, ?interaction, "interaction had no effect");
                        outcome.invalid.insert(id.clone());
                    }
                }
            }

            if let Some(message) = &action.message {
                if world.agents.get(id).map(|a| !a.done).unwrap_or(false) {
                    world.messages.post(Message {
                        from: id.clone(),
                        to: message.to.clone(),
                        payload: message.payload.clone(),
                        step: world.step,
                    });
                }
            }
        }
    }

    /// Applies one interaction after re-validating its preconditions
    /// against the post-movement state. `None` means a no-op.
    fn interact<S: Scenario + ?Sized>(
        world: &mut World,
        scenario: &mut S,
        config: &EnvConfig,
        id: &str,
        interaction: &Interaction,
        outcome: &mut StepOutcome,
    ) -> Option<InteractionOutcome> {
        let agent = world.agents.get(id)?;
        if !agent.can_act() || !scenario.allows(interaction.kind()) {
            return None;
        }
        match interaction {
            Interaction::PickUp => Self::pick_up(world, scenario, id),
            Interaction::Drop => {
                let (entity, carriers) = world.drop_carried(id)?;
                let position = world.entities.get(entity)?.position;
                debug!(agent = %id, %entity, %position, "dropped");
                Some(InteractionOutcome::Dropped {
                    entity,
                    position,
                    carriers,
                })
            }
            Interaction::Pass { to } => Self::pass(world, id, to),
            Interaction::Steal { from } => Self::steal(world, config, id, from),
            Interaction::Attack { target } => Self::attack(world, config, id, target.as_deref()),
            Interaction::Claim => Self::claim(world, config, id),
            Interaction::Activate => scenario
                .activate(world, id, &mut outcome.events)
                .then_some(InteractionOutcome::Activated),
        }
    }

    fn pick_up<S: Scenario + ?Sized>(
        world: &mut World,
        scenario: &S,
        id: &str,
    ) -> Option<InteractionOutcome> {
        let view: &World = world;
        let agent = view.agents.get(id)?;
        if agent.carrying.is_some() {
            return None;
        }
        let pos = agent.position;
        let eligible = |e: &Entity| {
            !e.is_carried() && !e.pending.contains(id) && scenario.can_pick_up(view, agent, e)
        };
        // Prefer a single-carrier entity underfoot, then a heavy one in reach.
        let target = view
            .entities
            .iter()
            .find(|e| e.required_carriers() == 1 && e.position == pos && eligible(e))
            .or_else(|| {
                view.entities.iter().find(|e| {
                    e.required_carriers() > 1 && e.position.chebyshev(&pos) <= 1 && eligible(e)
                })
            })
            .map(|e| e.id)?;

        // Only free, active agents may still count toward a group lift.
        let free: BTreeSet<Id> = world
            .agents
            .iter()
            .filter(|a| a.carrying.is_none() && a.can_act())
            .map(|a| a.id.clone())
            .collect();
        for entity in world.entities.iter_mut() {
            if entity.id == target {
                entity.pending.retain(|p| free.contains(p));
            } else {
                entity.pending.remove(id);
            }
        }
        match world.entities.pick_up(target, id, pos, world.step) {
            PickupOutcome::Rejected => None,
            PickupOutcome::Joined { .. } => Some(InteractionOutcome::PickedUp {
                entity: target,
                completed: false,
            }),
            PickupOutcome::Completed => {
                let carriers = world.entities.get(target)?.carriers.clone();
                for carrier in &carriers {
                    if let Some(a) = world.agents.get_mut(carrier) {
                        a.carrying = Some(target);
                    }
                    for entity in world.entities.iter_mut() {
                        entity.pending.remove(carrier);
                    }
                }
                debug!(agent = %id, entity = %target, carriers = carriers.len(), "picked up");
                Some(InteractionOutcome::PickedUp {
                    entity: target,
                    completed: true,
                })
            }
        }
    }

    fn pass(world: &mut World, id: &str, to: &str) -> Option<InteractionOutcome> {
        let giver = world.agents.get(id)?;
        let receiver = world.agents.get(to)?;
        let entity = giver.carrying?;
        let valid = giver.is_adjacent_to(receiver)
            && giver.is_teammate_of(receiver)
            && receiver.can_act()
            && receiver.carrying.is_none();
        if !valid {
            return None;
        }
        let to_pos = receiver.position;
        if !world
            .entities
            .transfer_carry(entity, id, to, to_pos, world.step)
        {
            return None;
        }
        Self::hand_over(world, entity, id, to);
        debug!(from = %id, %to, %entity, "passed");
        Some(InteractionOutcome::Passed {
            entity,
            to: to.to_string(),
        })
    }

    fn steal(
        world: &mut World,
        config: &EnvConfig,
        id: &str,
        from: &str,
    ) -> Option<InteractionOutcome> {
        let thief = world.agents.get(id)?;
        let victim = world.agents.get(from)?;
        let entity = victim.carrying?;
        let valid = thief.cooldown(InteractionKind::Steal) == 0
            && thief.carrying.is_none()
            && thief.is_adjacent_to(victim)
            && !thief.is_teammate_of(victim);
        if !valid {
            return None;
        }
        let to_pos = thief.position;
        if !world
            .entities
            .transfer_carry(entity, from, id, to_pos, world.step)
        {
            return None;
        }
        Self::hand_over(world, entity, from, id);
        if let Some(thief) = world.agents.get_mut(id) {
            thief.set_cooldown(InteractionKind::Steal, config.combat.steal_cooldown);
        }
        debug!(thief = %id, victim = %from, %entity, "stole");
        Some(InteractionOutcome::Stole {
            entity,
            from: from.to_string(),
        })
    }

    fn hand_over(world: &mut World, entity: EntityId, from: &str, to: &str) {
        if let Some(a) = world.agents.get_mut(from) {
            a.carrying = None;
        }
        if let Some(a) = world.agents.get_mut(to) {
            a.carrying = Some(entity);
        }
        for e in world.entities.iter_mut() {
            e.pending.remove(to);
        }
    }

    fn attack(
        world: &mut World,
        config: &EnvConfig,
        id: &str,
        target: Option<&str>,
    ) -> Option<InteractionOutcome> {
        let attacker = world.agents.get(id)?;
        if attacker.cooldown(InteractionKind::Attack) > 0 {
            return None;
        }
        let target_id = match target {
            Some(t) => t.to_string(),
            None => world
                .agents
                .iter()
                .find(|a| {
                    a.is_adjacent_to(attacker) && !a.is_teammate_of(attacker) && a.can_act()
                })?
                .id
                .clone(),
        };
        let victim = world.agents.get(&target_id)?;
        if !attacker.is_adjacent_to(victim) || attacker.is_teammate_of(victim) || !victim.can_act()
        {
            return None;
        }

        let combat = &config.combat;
        let mut tagged = false;
        if let Some(victim) = world.agents.get_mut(&target_id) {
            victim.health -= combat.attack_damage;
            if victim.health <= 0.0 {
                tagged = true;
                if combat.tag_duration > 0 {
                    victim.health = 0.0;
                    victim.tagged_for = combat.tag_duration;
                } else {
                    victim.health = combat.max_health;
                }
            }
        }
        let dropped = if tagged {
            world.drop_carried(&target_id).map(|(e, _)| e)
        } else {
            None
        };
        if let Some(attacker) = world.agents.get_mut(id) {
            attacker.set_cooldown(InteractionKind::Attack, combat.attack_cooldown);
        }
        debug!(attacker = %id, target = %target_id, tagged, "attack landed");
        Some(InteractionOutcome::Hit {
            target: target_id,
            tagged,
            dropped,
        })
    }

    fn claim(world: &mut World, config: &EnvConfig, id: &str) -> Option<InteractionOutcome> {
        let agent = world.agents.get(id)?;
        let team = agent.team.clone()?;
        let position = agent.position;
        if world.grid.cell(&position) != Some(GridCell::Special(SpecialKind::Territory)) {
            return None;
        }
        let amount = config.combat.claim_amount;
        let state = world.grid.special_state_mut(&position)?;
        let own = state.owner.as_ref() == Some(&team);
        let flipped = if own {
            if state.strength >= 1.0 {
                return None;
            }
            state.strength = (state.strength + amount).min(1.0);
            false
        } else if state.owner.is_some() {
            let left = state.strength - amount;
            if left > 0.0 {
                state.strength = left;
                false
            } else {
                state.owner = Some(team.clone());
                state.strength = (-left).min(1.0);
                true
            }
        } else {
            state.owner = Some(team.clone());
            state.strength = amount.min(1.0);
            true
        };
        let strength = state.strength;
        debug!(agent = %id, %position, %team, strength, flipped, "claimed");
        Some(InteractionOutcome::Claimed {
            position,
            owner: team,
            strength,
            flipped,
        })
    }

    /// Increments the step counter, ticks cooldowns and tag timers, and
    /// prunes expired messages.
    pub fn advance_clock(world: &mut World, config: &EnvConfig) {
        world.step += 1;
        let max_health = config.combat.max_health;
        world.agents.for_each_mut(|agent| {
            if agent.tick() {
                agent.health = max_health;
                trace!(agent = %agent.id, "tag expired");
            }
        });
        world.messages.prune(world.step);
    }
}
