use std::collections::BTreeSet;

use ndarray::ArrayView1;
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::Rng;
use rand_distr::Distribution;

use super::decay::{Decay, DecayingValue};
use super::{check_candidates, greedy_action, ExplorationPolicy, PolicyKind};
use crate::error::{PallasError, Result};
use crate::params::{ParamDef, ParamSet, ParamType};

pub const PARAMS: &[ParamDef] = &[
    ParamDef::new("thresholdInitial", ParamType::Float),
    ParamDef::new("thresholdMin", ParamType::Float),
    ParamDef::new("thresholdDecay", ParamType::Float),
    ParamDef::new("temperature", ParamType::Float),
];

/// Draw one of `actions` with probability proportional to `weights`; falls
/// back to a uniform draw when the weights carry no mass.
fn draw(actions: &[usize], weights: &[f32], rng: &mut StdRng) -> Result<usize> {
    match WeightedIndex::new(weights) {
        Ok(dist) => Ok(actions[dist.sample(rng)]),
        Err(_) => actions
            .iter()
            .copied()
            .choose(rng)
            .ok_or_else(|| PallasError::protocol("policy", "no available actions to choose from")),
    }
}

/// Below a decaying threshold, sample from a softmax of the values;
/// otherwise act greedily.
#[derive(Debug, Clone)]
pub struct SampledPolicy {
    threshold: DecayingValue,
    temperature: f32,
}

impl SampledPolicy {
    pub fn new(initial: f32, min: f32, decay_rate: f32, temperature: f32) -> Result<Self> {
        if !(temperature > 0.0) {
            return Err(PallasError::invalid_parameter(
                "temperature".to_string(),
                format!("must be positive, got {}", temperature),
            ));
        }
        Ok(SampledPolicy {
            threshold: DecayingValue::new("threshold", initial, min, Decay::Exponential { rate: decay_rate })?,
            temperature,
        })
    }

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        Self::new(
            params.float_or("thresholdInitial", 1.0),
            params.float_or("thresholdMin", 0.2),
            params.float_or("thresholdDecay", 0.999),
            params.float_or("temperature", 1.0),
        )
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.value()
    }
}

impl ExplorationPolicy for SampledPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Sampled
    }

    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, rng: &mut StdRng) -> Result<usize> {
        check_candidates(values, available)?;
        let action = if rng.gen::<f32>() < self.threshold.value() {
            let actions: Vec<usize> = available.iter().copied().collect();
            let max = actions.iter().map(|&a| values[a]).fold(f32::NEG_INFINITY, f32::max);
            let weights: Vec<f32> = actions
                .iter()
                .map(|&a| ((values[a] - max) / self.temperature).exp())
                .collect();
            draw(&actions, &weights, rng)?
        } else {
            greedy_action(values, available)?
        };
        self.threshold.step();
        Ok(action)
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.threshold.value())
    }
}

/// Sample from the values read as unnormalised probabilities.
///
/// Negative values count as zero; when nothing is left the draw is uniform.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultinomialPolicy;

impl ExplorationPolicy for MultinomialPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Multinomial
    }

    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, rng: &mut StdRng) -> Result<usize> {
        check_candidates(values, available)?;
        let actions: Vec<usize> = available.iter().copied().collect();
        let weights: Vec<f32> = actions
            .iter()
            .map(|&a| {
                let v = values[a];
                if v.is_finite() {
                    v.max(0.0)
                } else {
                    0.0
                }
            })
            .collect();
        draw(&actions, &weights, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn multinomial_never_picks_zero_mass() {
        let mut policy = MultinomialPolicy;
        let mut rng = StdRng::seed_from_u64(8);
        let available = BTreeSet::from([0, 1, 2]);
        for _ in 0..100 {
            let action = policy
                .select(array![0.0, 0.7, -1.0].view(), &available, &mut rng)
                .unwrap();
            assert_eq!(action, 1);
        }
    }

    #[test]
    fn multinomial_all_zero_is_uniform_over_available() {
        let mut policy = MultinomialPolicy;
        let mut rng = StdRng::seed_from_u64(8);
        let available = BTreeSet::from([1, 2]);
        let mut seen = BTreeSet::new();
        for _ in 0..100 {
            seen.insert(policy.select(array![0.0, 0.0, 0.0].view(), &available, &mut rng).unwrap());
        }
        assert_eq!(seen, available);
    }

    #[test]
    fn sampled_threshold_decays() {
        let mut policy = SampledPolicy::new(1.0, 0.5, 0.5, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let available = BTreeSet::from([0, 1]);
        policy.select(array![0.0, 1.0].view(), &available, &mut rng).unwrap();
        policy.select(array![0.0, 1.0].view(), &available, &mut rng).unwrap();
        assert_eq!(policy.threshold(), 0.5);
    }
}
