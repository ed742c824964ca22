use std::collections::BTreeSet;

use log::trace;
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::Rng;

use super::decay::{Decay, DecayingValue};
use super::{check_candidates, greedy_action, ExplorationPolicy, PolicyKind};
use crate::error::{PallasError, Result};
use crate::params::{ParamDef, ParamSet, ParamType};

pub const PARAMS: &[ParamDef] = &[
    ParamDef::new("epsilonInitial", ParamType::Float),
    ParamDef::new("epsilonMin", ParamType::Float),
    ParamDef::new("epsilonDecayRate", ParamType::Float),
    ParamDef::new("epsilonDecayByEpisode", ParamType::Bool),
    ParamDef::new("linearDecay", ParamType::Bool),
    ParamDef::new("epsilonDecayStep", ParamType::Float),
];

/// Uniform exploration with probability epsilon, greedy otherwise.
///
/// Epsilon decays after every selection, or after every episode when
/// `epsilonDecayByEpisode` is set.
#[derive(Debug, Clone)]
pub struct EpsilonGreedyPolicy {
    epsilon: DecayingValue,
    decay_by_episode: bool,
}

impl EpsilonGreedyPolicy {
    pub fn new(initial: f32, min: f32, decay: Decay) -> Result<Self> {
        if !(0.0..=1.0).contains(&initial) || !(0.0..=1.0).contains(&min) {
            return Err(PallasError::invalid_parameter(
                "epsilon".to_string(),
                format!("epsilon bounds must lie in [0, 1], got {} and {}", initial, min),
            ));
        }
        Ok(EpsilonGreedyPolicy {
            epsilon: DecayingValue::new("epsilon", initial, min, decay)?,
            decay_by_episode: false,
        })
    }

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let decay = if params.bool_or("linearDecay", false) {
            Decay::Linear {
                step: params.float_or("epsilonDecayStep", 0.001),
            }
        } else {
            Decay::Exponential {
                rate: params.float_or("epsilonDecayRate", 0.999),
            }
        };
        let mut policy = Self::new(
            params.float_or("epsilonInitial", 1.0),
            params.float_or("epsilonMin", 0.2),
            decay,
        )?;
        policy.decay_by_episode = params.bool_or("epsilonDecayByEpisode", false);
        Ok(policy)
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon.value()
    }
}

impl ExplorationPolicy for EpsilonGreedyPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::EpsilonGreedy
    }

    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, rng: &mut StdRng) -> Result<usize> {
        check_candidates(values, available)?;
        let explore = rng.gen::<f32>() < self.epsilon.value();
        let action = if explore {
            available
                .iter()
                .copied()
                .choose(rng)
                .ok_or_else(|| PallasError::protocol("policy", "no available actions to choose from"))?
        } else {
            greedy_action(values, available)?
        };
        trace!("epsilon {:.4}, explore {}, action {}", self.epsilon.value(), explore, action);
        if !self.decay_by_episode {
            self.epsilon.step();
        }
        Ok(action)
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.epsilon.value())
    }

    fn end_episode(&mut self, _returns: &[f32]) {
        if self.decay_by_episode {
            self.epsilon.step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn epsilon_after_thousand_calls() {
        let mut policy = EpsilonGreedyPolicy::new(0.2, 0.01, Decay::Exponential { rate: 0.999 }).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let values = array![0.0, 1.0];
        let available = BTreeSet::from([0, 1]);
        for _ in 0..1000 {
            policy.select(values.view(), &available, &mut rng).unwrap();
        }
        assert!((policy.epsilon() - 0.0736).abs() < 1e-3);
    }

    #[test]
    fn zero_epsilon_is_greedy() {
        let mut policy = EpsilonGreedyPolicy::new(0.0, 0.0, Decay::Exponential { rate: 1.0 }).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let action = policy
                .select(array![0.0, 5.0, 1.0].view(), &BTreeSet::from([0, 1, 2]), &mut rng)
                .unwrap();
            assert_eq!(action, 1);
        }
    }

    #[test]
    fn full_exploration_stays_available() {
        let mut policy = EpsilonGreedyPolicy::new(1.0, 1.0, Decay::Exponential { rate: 1.0 }).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let available = BTreeSet::from([1, 3]);
        for _ in 0..50 {
            let action = policy
                .select(array![9.0, 0.0, 9.0, 0.0].view(), &available, &mut rng)
                .unwrap();
            assert!(available.contains(&action));
        }
    }
}
