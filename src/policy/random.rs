//! Random policy for testing and baselines.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::trait_::Policy;
use crate::engine::{Action, Direction, Interaction, Observation};
use crate::Id;

/// Uniformly random action selection.
///
/// Each agent independently picks staying, one of the four moves, or one
/// of the configured interactions. Seeded, so runs are reproducible.
pub struct RandomPolicy {
    rng: StdRng,
    choices: Vec<Action>,
}

impl RandomPolicy {
    /// Creates a random policy that also tries pickups and drops.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed of the policy's own random number generator.
    pub fn new(seed: u64) -> Self {
        Self::with_interactions(seed, vec![Interaction::PickUp, Interaction::Drop])
    }

    /// Creates a random policy choosing among moves and `interactions`.
    pub fn with_interactions(seed: u64, interactions: Vec<Interaction>) -> Self {
        let mut choices = vec![Action::stay()];
        choices.extend(Direction::ALL.iter().map(|d| Action::moving(*d)));
        choices.extend(interactions.into_iter().map(Action::interact));
        Self {
            rng: StdRng::seed_from_u64(seed),
            choices,
        }
    }
}

impl Policy for RandomPolicy {
    fn select_actions(&mut self, observations: &BTreeMap<Id, Observation>) -> BTreeMap<Id, Action> {
        observations
            .keys()
            .map(|id| {
                let action = self.choices.choose(&mut self.rng).cloned().unwrap_or_default();
                (id.clone(), action)
            })
            .collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AgentSpec, EnvConfig, GridEnvironment};
    use crate::scenarios::ResourceCollection;

    fn observations() -> BTreeMap<Id, Observation> {
        let config = EnvConfig {
            agents: vec![AgentSpec::new("a"), AgentSpec::new("b"), AgentSpec::new("c")],
            ..EnvConfig::default()
        };
        let mut env = GridEnvironment::new(config, ResourceCollection::default()).unwrap();
        env.reset().unwrap()
    }

    #[test]
    fn random_policy_acts_for_every_agent() {
        let obs = observations();
        let mut policy = RandomPolicy::new(1);
        let actions = policy.select_actions(&obs);
        assert_eq!(actions.len(), 3);
        assert!(actions.keys().eq(obs.keys()));
    }

    #[test]
    fn same_seed_same_actions() {
        let obs = observations();
        let mut a = RandomPolicy::new(9);
        let mut b = RandomPolicy::new(9);
        for _ in 0..10 {
            assert_eq!(a.select_actions(&obs), b.select_actions(&obs));
        }
    }

    #[test]
    fn only_configured_interactions_are_chosen() {
        let obs = observations();
        let mut policy = RandomPolicy::with_interactions(3, vec![Interaction::Claim]);
        for _ in 0..50 {
            for action in policy.select_actions(&obs).values() {
                if let crate::engine::ActionKind::Interact(i) = &action.kind {
                    assert_eq!(*i, Interaction::Claim);
                }
            }
        }
    }
}
