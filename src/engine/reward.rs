//! Reward engine: turns per-step reward events into per-agent credit
//! under one of four incentive models.
//!
//! Rewards are accumulated from events as they happen; scores are never
//! recomputed by diffing running totals.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::agent::AgentStore;
use super::error::ConfigError;
use crate::Id;

/// Incentive model selected at environment construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RewardStructure {
    /// Credit goes only to the originating agent.
    Individual,
    /// Credit goes to every member of the originator's team.
    Team,
    /// Credit is split into an individual and a team component.
    Mixed {
        individual_weight: f64,
        team_weight: f64,
    },
    /// The originator gains what the others lose. With `by_team`, only
    /// agents outside the originator's team are debited.
    ZeroSum { by_team: bool },
}

impl RewardStructure {
    /// Mixed model with the default 0.5/0.5 split.
    pub fn mixed() -> Self {
        RewardStructure::Mixed {
            individual_weight: 0.5,
            team_weight: 0.5,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let RewardStructure::Mixed {
            individual_weight,
            team_weight,
        } = self
        {
            let ok = individual_weight.is_finite()
                && team_weight.is_finite()
                && *individual_weight >= 0.0
                && *team_weight >= 0.0
                && individual_weight + team_weight > 0.0;
            if !ok {
                return Err(ConfigError::InvalidRewardWeights);
            }
        }
        Ok(())
    }
}

/// Why a reward event was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RewardCause {
    PickedUp,
    Delivered,
    FlagCaptured,
    FlagReturned,
    Tagged,
    Stole,
    TerritoryClaimed,
    PuzzleSolved,
    InvalidAction,
    Custom(String),
}

/// A raw reward amount attributed to one agent. Transient: produced during
/// resolution and consumed by [`RewardEngine::apply`] in the same step.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardEvent {
    pub agent: Id,
    pub amount: f64,
    pub cause: RewardCause,
}

impl RewardEvent {
    pub fn new(agent: impl Into<Id>, amount: f64, cause: RewardCause) -> Self {
        Self {
            agent: agent.into(),
            amount,
            cause,
        }
    }
}

/// Which score component a credit lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreComponent {
    Individual,
    Team,
}

/// One share of an event's amount.
#[derive(Debug, Clone, PartialEq)]
pub struct Credit {
    pub agent: Id,
    pub amount: f64,
    pub component: ScoreComponent,
}

/// Applies the selected incentive model.
pub struct RewardEngine;

impl RewardEngine {
    /// Splits one event into credits. Done agents are not eligible.
    ///
    /// The credits of a zero-sum event always sum to zero; if the
    /// originator has no eligible opponents the event yields nothing.
    pub fn allocate(
        structure: &RewardStructure,
        event: &RewardEvent,
        agents: &AgentStore,
    ) -> Vec<Credit> {
        let Some(origin) = agents.get(&event.agent) else {
            return Vec::new();
        };
        let individual = |amount: f64| Credit {
            agent: origin.id.clone(),
            amount,
            component: ScoreComponent::Individual,
        };
        let team_members: Option<Vec<Id>> = origin.team.as_ref().map(|team| {
            agents
                .iter()
                .filter(|a| !a.done && a.team.as_ref() == Some(team))
                .map(|a| a.id.clone())
                .collect()
        });

        match structure {
            RewardStructure::Individual => vec![individual(event.amount)],
            RewardStructure::Team => match team_members {
                Some(members) => members
                    .into_iter()
                    .map(|agent| Credit {
                        agent,
                        amount: event.amount,
                        component: ScoreComponent::Team,
                    })
                    .collect(),
                None => vec![individual(event.amount)],
            },
            RewardStructure::Mixed {
                individual_weight,
                team_weight,
            } => {
                let mut credits = vec![individual(event.amount * individual_weight)];
                let team_share = event.amount * team_weight;
                match team_members {
                    Some(members) => credits.extend(members.into_iter().map(|agent| Credit {
                        agent,
                        amount: team_share,
                        component: ScoreComponent::Team,
                    })),
                    None => credits.push(individual(team_share)),
                }
                credits
            }
            RewardStructure::ZeroSum { by_team } => {
                let opponents: Vec<Id> = agents
                    .iter()
                    .filter(|a| !a.done && a.id != origin.id)
                    .filter(|a| !(*by_team && origin.is_teammate_of(a)))
                    .map(|a| a.id.clone())
                    .collect();
                if opponents.is_empty() {
                    return Vec::new();
                }
                let debit = event.amount / opponents.len() as f64;
                let mut credits = vec![individual(event.amount)];
                credits.extend(opponents.into_iter().map(|agent| Credit {
                    agent,
                    amount: -debit,
                    component: ScoreComponent::Individual,
                }));
                credits
            }
        }
    }

    /// Applies the step penalty to every live agent and every event's
    /// credits, updating scores. Returns the step reward per live agent.
    pub fn apply(
        structure: &RewardStructure,
        events: &[RewardEvent],
        agents: &mut AgentStore,
        step_penalty: f64,
    ) -> BTreeMap<Id, f64> {
        let mut rewards: BTreeMap<Id, f64> = BTreeMap::new();
        agents.for_each_mut(|a| {
            if !a.done {
                a.score.individual += step_penalty;
                rewards.insert(a.id.clone(), step_penalty);
            }
        });

        for event in events {
            for credit in Self::allocate(structure, event, agents) {
                let Some(agent) = agents.get_mut(&credit.agent) else {
                    continue;
                };
                match credit.component {
                    ScoreComponent::Individual => agent.score.individual += credit.amount,
                    ScoreComponent::Team => agent.score.team += credit.amount,
                }
                *rewards.entry(credit.agent).or_insert(0.0) += credit.amount;
            }
        }
        rewards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::agent::AgentState;
    use crate::engine::config::AgentSpec;
    use crate::engine::types::Position;

    fn store(specs: &[(&str, Option<&str>)]) -> AgentStore {
        let mut store = AgentStore::new();
        for (i, (id, team)) in specs.iter().enumerate() {
            let mut spec = AgentSpec::new(*id);
            spec.team = team.map(|t| t.to_string());
            store.create(AgentState::new(&spec, Position::new(i as i32, 0), 1.0));
        }
        store
    }

    fn total(credits: &[Credit]) -> f64 {
        credits.iter().map(|c| c.amount).sum()
    }

    #[test]
    fn individual_credits_only_originator() {
        let agents = store(&[("a", Some("x")), ("b", Some("x"))]);
        let e = RewardEvent::new("a", 2.0, RewardCause::Delivered);
        let credits = RewardEngine::allocate(&RewardStructure::Individual, &e, &agents);
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].agent, "a");
        assert_eq!(credits[0].amount, 2.0);
    }

    #[test]
    fn team_credits_every_member_identically() {
        let agents = store(&[("a", Some("x")), ("b", Some("y")), ("c", Some("x"))]);
        let e = RewardEvent::new("a", 1.5, RewardCause::Delivered);
        let credits = RewardEngine::allocate(&RewardStructure::Team, &e, &agents);
        let ids: Vec<&str> = credits.iter().map(|c| c.agent.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(credits.iter().all(|c| c.amount == 1.5));
        assert!(credits.iter().all(|c| c.component == ScoreComponent::Team));
    }

    #[test]
    fn team_without_team_falls_back_to_individual() {
        let agents = store(&[("a", None), ("b", Some("x"))]);
        let e = RewardEvent::new("a", 1.0, RewardCause::Delivered);
        let credits = RewardEngine::allocate(&RewardStructure::Team, &e, &agents);
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].component, ScoreComponent::Individual);
    }

    #[test]
    fn mixed_splits_by_weight() {
        let agents = store(&[("a", Some("x")), ("b", Some("x"))]);
        let e = RewardEvent::new("a", 4.0, RewardCause::Delivered);
        let credits = RewardEngine::allocate(
            &RewardStructure::Mixed {
                individual_weight: 0.25,
                team_weight: 0.75,
            },
            &e,
            &agents,
        );
        let a_total: f64 = credits
            .iter()
            .filter(|c| c.agent == "a")
            .map(|c| c.amount)
            .sum();
        let b_total: f64 = credits
            .iter()
            .filter(|c| c.agent == "b")
            .map(|c| c.amount)
            .sum();
        assert!((a_total - 4.0).abs() < 1e-12);
        assert!((b_total - 3.0).abs() < 1e-12);
    }

    #[test]
    fn zero_sum_conserves() {
        let agents = store(&[("a", None), ("b", None), ("c", None), ("d", None)]);
        let e = RewardEvent::new("b", 3.0, RewardCause::Tagged);
        let credits =
            RewardEngine::allocate(&RewardStructure::ZeroSum { by_team: false }, &e, &agents);
        assert_eq!(credits.len(), 4);
        assert!(total(&credits).abs() < 1e-12);
        assert!(credits.iter().filter(|c| c.agent != "b").all(|c| c.amount == -1.0));
    }

    #[test]
    fn zero_sum_by_team_spares_teammates() {
        let agents = store(&[("a", Some("x")), ("b", Some("x")), ("c", Some("y"))]);
        let e = RewardEvent::new("a", 2.0, RewardCause::FlagCaptured);
        let credits =
            RewardEngine::allocate(&RewardStructure::ZeroSum { by_team: true }, &e, &agents);
        assert!(credits.iter().all(|c| c.agent != "b"));
        assert!(total(&credits).abs() < 1e-12);
    }

    #[test]
    fn zero_sum_alone_yields_nothing() {
        let agents = store(&[("a", None)]);
        let e = RewardEvent::new("a", 2.0, RewardCause::Delivered);
        let credits =
            RewardEngine::allocate(&RewardStructure::ZeroSum { by_team: false }, &e, &agents);
        assert!(credits.is_empty());
    }

    #[test]
    fn apply_adds_step_penalty_to_everyone() {
        let mut agents = store(&[("a", None), ("b", None)]);
        let events = vec![RewardEvent::new("a", 1.0, RewardCause::Delivered)];
        let rewards =
            RewardEngine::apply(&RewardStructure::Individual, &events, &mut agents, -0.01);
        assert!((rewards["a"] - 0.99).abs() < 1e-12);
        assert!((rewards["b"] + 0.01).abs() < 1e-12);
        assert!((agents.get("a").unwrap().score.total() - 0.99).abs() < 1e-12);
    }

    #[test]
    fn events_for_removed_agents_are_ignored() {
        let mut agents = store(&[("a", None)]);
        let events = vec![RewardEvent::new("ghost", 5.0, RewardCause::Delivered)];
        let rewards = RewardEngine::apply(&RewardStructure::Individual, &events, &mut agents, 0.0);
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards["a"], 0.0);
    }

    #[test]
    fn invalid_mixed_weights_rejected() {
        let s = RewardStructure::Mixed {
            individual_weight: 0.0,
            team_weight: 0.0,
        };
        assert_eq!(s.validate(), Err(ConfigError::InvalidRewardWeights));
        assert!(RewardStructure::mixed().validate().is_ok());
    }
}
