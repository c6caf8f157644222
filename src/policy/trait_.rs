//! Policy trait for the grid environment.

use std::collections::BTreeMap;

use crate::engine::{Action, Observation};
use crate::Id;

/// A policy that selects actions for agents based on observations.
///
/// Agents missing from the returned map stay in place for the step.
pub trait Policy: Send + Sync {
    /// Selects one action per observed agent.
    ///
    /// # Arguments
    ///
    /// * `observations` - Per-agent observations keyed by agent id
    ///
    /// # Returns
    ///
    /// The action of each agent, keyed by agent id.
    fn select_actions(&mut self, observations: &BTreeMap<Id, Observation>) -> BTreeMap<Id, Action>;

    /// Returns a human-readable name for this policy.
    fn name(&self) -> &str;
}
