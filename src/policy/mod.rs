//! Baseline policies that drive agents from their observations.

pub mod greedy;
pub mod random;
pub mod trait_;

pub use greedy::GreedyCollectorPolicy;
pub use random::RandomPolicy;
pub use trait_::Policy;
