//! Walks a generated maze, learning to head for the border through unvisited
//! cells.
//!
//! Run with `RUST_LOG=info cargo run --example maze`.

use pallas::agent::{AgentBuilder, RetryPolicy};
use pallas::algorithms::AlgorithmKind;
use pallas::environment::{EnvironmentState, EpisodeObserver};
use pallas::environments::MazeEnvironment;
use pallas::error::Result;
use pallas::estimator::ApproximatorKind;
use pallas::policy::PolicyKind;

const SIZE: usize = 31;
const WINDOWS: usize = 300;
const STEPS_PER_WINDOW: usize = 100;

/// Prints the moves of every 50th window as arrows.
struct Trail;

impl EpisodeObserver for Trail {
    fn on_episode_end(&mut self, episode_id: usize, steps: &[(EnvironmentState, usize)]) {
        if episode_id % 50 != 0 {
            return;
        }
        let trail: String = steps
            .iter()
            .map(|(_, action)| match action {
                0 => '←',
                1 => '→',
                2 => '↑',
                _ => '↓',
            })
            .collect();
        println!("window {}: {}", episode_id, trail);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut agent = AgentBuilder::new()
        .algorithm(AlgorithmKind::Dqn)
        .policy(PolicyKind::NoisyNextBest)
        .approximator(ApproximatorKind::default())
        .params("gamma = 0.85, capacity = 5000, batchSize = 32, targetFunctionUpdateCycle = 100, learningRate = 0.001")
        .retry(RetryPolicy::ForceValid { max_attempts: 3 })
        .seed(11)
        .build(MazeEnvironment::new(SIZE, 11))?;
    agent.add_observer(Box::new(Trail));
    agent.start()?;

    for _ in 0..WINDOWS {
        let summary = agent.run_episode(STEPS_PER_WINDOW)?;
        if summary.episode_id % 10 == 0 {
            println!(
                "window {}: reward {:.3}, mazes carved {}, average reward {:.3}",
                summary.episode_id,
                summary.reward,
                agent.environment().generations(),
                agent.metrics().avg_episode_reward(10).unwrap_or_default()
            );
        }
    }
    agent.stop()
}
