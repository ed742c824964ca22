use std::collections::BTreeSet;

use log::trace;
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::Rng;

use super::{check_candidates, greedy_action, normalized_entropy, ranked, ExplorationPolicy, PolicyKind};
use crate::error::{PallasError, Result};

/// Explore uniformly with probability equal to the normalised entropy of the
/// values, so flat value vectors explore and peaked ones exploit.
#[derive(Debug, Clone, Copy)]
pub struct EntropyGreedyPolicy {
    as_softmax: bool,
    last_entropy: f32,
}

impl EntropyGreedyPolicy {
    pub fn new(as_softmax: bool) -> Self {
        EntropyGreedyPolicy {
            as_softmax,
            last_entropy: 0.0,
        }
    }
}

impl ExplorationPolicy for EntropyGreedyPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::EntropyGreedy
    }

    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, rng: &mut StdRng) -> Result<usize> {
        check_candidates(values, available)?;
        self.last_entropy = normalized_entropy(values, available, self.as_softmax);
        if rng.gen::<f32>() < self.last_entropy {
            trace!("entropy {:.3}: exploring", self.last_entropy);
            available
                .iter()
                .copied()
                .choose(rng)
                .ok_or_else(|| PallasError::protocol("policy", "no available actions to choose from"))
        } else {
            greedy_action(values, available)
        }
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.last_entropy)
    }
}

/// With probability equal to the normalised entropy, skip the best action
/// and take the runner-up.
#[derive(Debug, Clone, Copy)]
pub struct EntropyNoisyNextBestPolicy {
    as_softmax: bool,
    last_entropy: f32,
}

impl EntropyNoisyNextBestPolicy {
    pub fn new(as_softmax: bool) -> Self {
        EntropyNoisyNextBestPolicy {
            as_softmax,
            last_entropy: 0.0,
        }
    }
}

impl ExplorationPolicy for EntropyNoisyNextBestPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::EntropyNoisyNextBest
    }

    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, rng: &mut StdRng) -> Result<usize> {
        check_candidates(values, available)?;
        self.last_entropy = normalized_entropy(values, available, self.as_softmax);
        let order = ranked(values, available);
        if order.len() > 1 && rng.gen::<f32>() < self.last_entropy {
            return Ok(order[1]);
        }
        greedy_action(values, available)
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.last_entropy)
    }
}
