// Demonstration: play a resource-collection episode and evaluate a baseline policy.
//
// Run from the repo root:
//   cargo run --example grid_env_demo -- --policy greedy --episodes 20 --seed 7

use std::env;

use gridcoop::engine::{ObstacleLayout, RewardStructure};
use gridcoop::metrics::EvaluationMetrics;
use gridcoop::policy::{GreedyCollectorPolicy, Policy, RandomPolicy};
use gridcoop::scenarios::ResourceCollection;
use gridcoop::{AgentSpec, EnvConfig, EnvError, GridEnvironment};
use tracing::Level;

fn main() -> Result<(), EnvError> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let policy_name = arg_value(&args, "--policy").unwrap_or("greedy");
    let episodes: usize = arg_value(&args, "--episodes")
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    let seed: u64 = arg_value(&args, "--seed")
        .and_then(|s| s.parse().ok())
        .unwrap_or(42);

    let config = EnvConfig {
        width: 12,
        height: 12,
        obstacles: ObstacleLayout::Generated {
            seam: false,
            fraction: 0.08,
        },
        view_distance: 4,
        max_steps: 150,
        seed,
        agents: vec![
            AgentSpec::new("ada").with_team("north"),
            AgentSpec::new("bo").with_team("north"),
            AgentSpec::new("cy").with_team("south"),
        ],
        reward_structure: RewardStructure::mixed(),
        ..EnvConfig::default()
    };
    let mut env = GridEnvironment::new(config, ResourceCollection::default())?;

    let mut policy: Box<dyn Policy> = match policy_name {
        "random" => Box::new(RandomPolicy::new(seed)),
        "greedy" => Box::new(GreedyCollectorPolicy::new(seed)),
        other => {
            eprintln!("Unknown --policy '{}'; expected 'greedy' or 'random'.", other);
            std::process::exit(2);
        }
    };

    // One narrated episode first.
    let mut obs = env.reset()?;
    println!("{}", env.render_text());
    loop {
        let result = env.step(&policy.select_actions(&obs))?;
        obs = result.observations;
        if result.done {
            break;
        }
    }
    println!("{}", env.render_text());
    println!(
        "delivered {} resources worth {:.1}",
        env.scenario().delivered(),
        env.scenario().delivered_value()
    );
    println!();

    let metrics = EvaluationMetrics::evaluate(&mut env, policy.as_mut(), episodes)?;
    println!("Policy: {}", policy.name());
    println!("{}", metrics);
    Ok(())
}

fn arg_value<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}
