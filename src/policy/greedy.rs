use std::collections::BTreeSet;

use ndarray::ArrayView1;
use rand::rngs::StdRng;

use super::{greedy_action, ExplorationPolicy, PolicyKind};
use crate::error::Result;

/// Always exploit: argmax over the available actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyPolicy;

impl ExplorationPolicy for GreedyPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Greedy
    }

    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, _rng: &mut StdRng) -> Result<usize> {
        greedy_action(values, available)
    }
}
