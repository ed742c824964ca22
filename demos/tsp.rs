//! Learns short tours over randomly placed cities.
//!
//! Run with `RUST_LOG=info cargo run --example tsp`.

use std::collections::BTreeSet;

use log::info;
use pallas::agent::AgentBuilder;
use pallas::algorithms::AlgorithmKind;
use pallas::environment::{EnvironmentState, EpisodeObserver};
use pallas::environments::TspEnvironment;
use pallas::error::Result;
use pallas::estimator::ApproximatorKind;
use pallas::policy::PolicyKind;

const CITIES: usize = 8;
const TOURS: usize = 2000;

/// Reports how many legs of each tour changed from the previous one.
#[derive(Default)]
struct RouteChanges {
    previous: Option<BTreeSet<(usize, usize)>>,
}

impl EpisodeObserver for RouteChanges {
    fn on_episode_end(&mut self, episode_id: usize, steps: &[(EnvironmentState, usize)]) {
        let mut legs = BTreeSet::new();
        let mut from = 0;
        for &(_, action) in steps {
            let to = action + 1;
            legs.insert((from.min(to), from.max(to)));
            from = to;
        }
        legs.insert((0, from));
        if let Some(previous) = &self.previous {
            let changed = legs.difference(previous).count();
            if episode_id % 100 == 0 {
                info!("tour {}: {} legs changed", episode_id, changed);
            }
        }
        self.previous = Some(legs);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut agent = AgentBuilder::new()
        .algorithm(AlgorithmKind::Sarsa)
        .policy(PolicyKind::EpsilonGreedy)
        .approximator(ApproximatorKind::Tabular)
        .params("gamma = 1.0, learningRate = 0.2, epsilonInitial = 1.0, epsilonDecayRate = 0.999, epsilonMin = 0.0")
        .seed(7)
        .build(TspEnvironment::new(CITIES, 7))?;
    agent.add_observer(Box::new(RouteChanges::default()));
    agent.start()?;

    for tour in 1..=TOURS {
        agent.run_episode(CITIES)?;
        if tour % 100 == 0 {
            let env = agent.environment();
            println!(
                "Tour #{} Total: {:.3} Min: {:.3} Max: {:.3}",
                tour,
                env.total_distance(),
                env.min_distance().unwrap_or_default(),
                env.max_distance().unwrap_or_default()
            );
        }
    }
    agent.stop()?;

    if let Some(tour) = agent.environment().shortest_tour() {
        println!("Shortest tour: {:?}", tour);
    }
    Ok(())
}
