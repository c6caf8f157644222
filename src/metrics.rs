//! Evaluation metrics for policies running in a grid environment.
//!
//! Runs whole episodes and aggregates episode-level performance over them.

use std::fmt;

use tracing::info;

use crate::engine::{EnvError, GridEnvironment, Scenario, Termination};
use crate::policy::Policy;

/// Aggregated evaluation metrics over multiple episodes.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMetrics {
    /// Mean number of steps per episode.
    pub mean_episode_length: f64,
    /// Mean over episodes of the summed reward per agent.
    pub mean_agent_return: f64,
    /// Mean share of agent-steps whose action was a no-op.
    pub mean_invalid_rate: f64,
    /// Share of episodes that ended because the goal was reached.
    pub goal_rate: f64,
    /// Number of episodes evaluated.
    pub n_episodes: usize,
}

/// Tracks per-episode statistics during evaluation.
#[derive(Debug, Default)]
struct EpisodeStats {
    steps: u32,
    total_reward: f64,
    agent_steps: u32,
    invalid_actions: u32,
    agents: usize,
    goal: bool,
}

impl EvaluationMetrics {
    /// Evaluates a policy over multiple episodes and returns aggregated metrics.
    ///
    /// Each episode starts with a reset and runs until the environment
    /// reports it done.
    ///
    /// # Arguments
    ///
    /// * `env` - The environment to evaluate in
    /// * `policy` - The policy to evaluate
    /// * `n_episodes` - Number of episodes to run
    pub fn evaluate<S: Scenario>(
        env: &mut GridEnvironment<S>,
        policy: &mut dyn Policy,
        n_episodes: usize,
    ) -> Result<Self, EnvError> {
        let mut all_stats = Vec::with_capacity(n_episodes);

        for _ in 0..n_episodes {
            let mut obs = env.reset()?;
            let mut stats = EpisodeStats {
                agents: env.n_agents(),
                ..EpisodeStats::default()
            };

            loop {
                let actions = policy.select_actions(&obs);
                let result = env.step(&actions)?;

                stats.steps = result.step;
                stats.total_reward += result.rewards.values().sum::<f64>();
                stats.agent_steps += result.infos.len() as u32;
                stats.invalid_actions +=
                    result.infos.values().filter(|i| i.invalid_action).count() as u32;

                obs = result.observations;

                if result.done {
                    stats.goal = env.episode().termination == Some(Termination::Goal);
                    break;
                }
            }

            all_stats.push(stats);
        }

        let metrics = Self::aggregate(&all_stats);
        info!(
            policy = policy.name(),
            episodes = metrics.n_episodes,
            goal_rate = metrics.goal_rate,
            "evaluation finished"
        );
        Ok(metrics)
    }

    fn aggregate(all_stats: &[EpisodeStats]) -> Self {
        let n_episodes = all_stats.len();
        if n_episodes == 0 {
            return Self {
                mean_episode_length: 0.0,
                mean_agent_return: 0.0,
                mean_invalid_rate: 0.0,
                goal_rate: 0.0,
                n_episodes,
            };
        }
        let n = n_episodes as f64;
        let mean_episode_length = all_stats.iter().map(|s| s.steps as f64).sum::<f64>() / n;
        let mean_agent_return = all_stats
            .iter()
            .map(|s| {
                if s.agents > 0 {
                    s.total_reward / s.agents as f64
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            / n;
        let mean_invalid_rate = all_stats
            .iter()
            .map(|s| {
                if s.agent_steps > 0 {
                    s.invalid_actions as f64 / s.agent_steps as f64
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            / n;
        let goal_rate = all_stats.iter().filter(|s| s.goal).count() as f64 / n;

        Self {
            mean_episode_length,
            mean_agent_return,
            mean_invalid_rate,
            goal_rate,
            n_episodes,
        }
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== Evaluation Metrics ({} episodes) ===",
            self.n_episodes
        )?;
        writeln!(
            f,
            "  Mean episode length:     {:.1}",
            self.mean_episode_length
        )?;
        writeln!(f, "  Mean agent return:       {:.3}", self.mean_agent_return)?;
        writeln!(
            f,
            "  Mean invalid actions:    {:.1}%",
            self.mean_invalid_rate * 100.0
        )?;
        writeln!(f, "  Goal completion:         {:.1}%", self.goal_rate * 100.0)
    }
}
