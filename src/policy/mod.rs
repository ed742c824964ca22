//! # Exploration Policies
//!
//! An [`ExplorationPolicy`] turns the action values an algorithm produces
//! into one chosen action. Every policy only ever considers the actions in
//! the available set it is handed; asking it to choose from an empty set, or
//! from actions the value vector does not cover, is a protocol error.
//!
//! Policies are selected at construction time through [`PolicyKind`] and
//! configured with a key=value string:
//!
//! ```rust
//! use pallas::policy::{build_policy, PolicyKind};
//! use ndarray::array;
//! use rand::{rngs::StdRng, SeedableRng};
//! use std::collections::BTreeSet;
//!
//! let mut policy = build_policy(
//!     PolicyKind::EpsilonGreedy,
//!     "epsilonInitial = 0.2, epsilonDecayRate = 0.999, epsilonMin = 0.01",
//! ).unwrap();
//! let mut rng = StdRng::seed_from_u64(0);
//! let action = policy
//!     .select(array![0.1, 0.9, 0.3].view(), &BTreeSet::from([0, 2]), &mut rng)
//!     .unwrap();
//! assert!(action == 0 || action == 2);
//! ```

pub mod decay;
pub mod entropy;
pub mod epsilon_greedy;
pub mod greedy;
pub mod mcts;
pub mod noisy;
pub mod sampled;

use std::collections::BTreeSet;

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{PallasError, Result};
use crate::params::{ParamDef, ParamSet, ParamType};

pub use decay::{Decay, DecayingValue};
pub use entropy::{EntropyGreedyPolicy, EntropyNoisyNextBestPolicy};
pub use epsilon_greedy::EpsilonGreedyPolicy;
pub use greedy::GreedyPolicy;
pub use mcts::MctsPolicy;
pub use noisy::{NoisyNextBestPolicy, OuNoisePolicy};
pub use sampled::{MultinomialPolicy, SampledPolicy};

/// Rule that picks an action from action values.
pub trait ExplorationPolicy: Send {
    fn kind(&self) -> PolicyKind;

    /// Choose an action among `available`, exploring per the policy.
    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, rng: &mut StdRng) -> Result<usize>;

    /// Choose without exploring.
    fn greedy(&self, values: ArrayView1<f32>, available: &BTreeSet<usize>) -> Result<usize> {
        greedy_action(values, available)
    }

    /// Current exploration magnitude (epsilon, noise, threshold) if the
    /// policy has one.
    fn exploration_rate(&self) -> Option<f32> {
        None
    }

    /// Search statistics of the last selection, for policies that search.
    fn visit_distribution(&self, _action_count: usize) -> Option<Array1<f32>> {
        None
    }

    /// Called when an episode closes with the return observed from each step.
    fn end_episode(&mut self, _returns: &[f32]) {}
}

/// Available exploration policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PolicyKind {
    Greedy,
    #[default]
    EpsilonGreedy,
    NoisyNextBest,
    Sampled,
    EntropyGreedy,
    EntropyNoisyNextBest,
    Multinomial,
    OuNoise,
    Mcts,
}

const NO_PARAMS: &[ParamDef] = &[];

const ENTROPY_PARAMS: &[ParamDef] = &[ParamDef::new("asSoftMax", ParamType::Bool)];

impl PolicyKind {
    /// Keys this policy recognises.
    pub fn param_defs(&self) -> &'static [ParamDef] {
        match self {
            PolicyKind::Greedy | PolicyKind::Multinomial => NO_PARAMS,
            PolicyKind::EpsilonGreedy => epsilon_greedy::PARAMS,
            PolicyKind::NoisyNextBest => noisy::NOISY_PARAMS,
            PolicyKind::Sampled => sampled::PARAMS,
            PolicyKind::EntropyGreedy | PolicyKind::EntropyNoisyNextBest => ENTROPY_PARAMS,
            PolicyKind::OuNoise => noisy::OU_PARAMS,
            PolicyKind::Mcts => mcts::PARAMS,
        }
    }

    pub fn build(&self, params: &ParamSet) -> Result<Box<dyn ExplorationPolicy>> {
        Ok(match self {
            PolicyKind::Greedy => Box::new(GreedyPolicy),
            PolicyKind::EpsilonGreedy => Box::new(EpsilonGreedyPolicy::from_params(params)?),
            PolicyKind::NoisyNextBest => Box::new(NoisyNextBestPolicy::from_params(params)?),
            PolicyKind::Sampled => Box::new(SampledPolicy::from_params(params)?),
            PolicyKind::EntropyGreedy => Box::new(EntropyGreedyPolicy::new(params.bool_or("asSoftMax", true))),
            PolicyKind::EntropyNoisyNextBest => {
                Box::new(EntropyNoisyNextBestPolicy::new(params.bool_or("asSoftMax", true)))
            }
            PolicyKind::Multinomial => Box::new(MultinomialPolicy),
            PolicyKind::OuNoise => Box::new(OuNoisePolicy::from_params(params)?),
            PolicyKind::Mcts => Box::new(MctsPolicy::from_params(params)?),
        })
    }
}

/// Parse `params` against the policy's keys and build it.
pub fn build_policy(kind: PolicyKind, params: &str) -> Result<Box<dyn ExplorationPolicy>> {
    let set = ParamSet::parse("policy", params, kind.param_defs())?;
    kind.build(&set)
}

/// Reject an empty candidate set or actions the value vector does not cover.
pub fn check_candidates(values: ArrayView1<f32>, available: &BTreeSet<usize>) -> Result<()> {
    if available.is_empty() {
        return Err(PallasError::protocol("policy", "no available actions to choose from"));
    }
    if let Some(&last) = available.iter().next_back() {
        if last >= values.len() {
            return Err(PallasError::protocol(
                "policy".to_string(),
                format!("action {} is outside the {} action values", last, values.len()),
            ));
        }
    }
    Ok(())
}

/// Highest-valued available action; ties go to the lowest index.
pub fn greedy_action(values: ArrayView1<f32>, available: &BTreeSet<usize>) -> Result<usize> {
    check_candidates(values, available)?;
    let mut best: Option<(usize, f32)> = None;
    for &action in available {
        let value = values[action];
        if best.map_or(true, |(_, best_value)| value > best_value) {
            best = Some((action, value));
        }
    }
    best.map(|(action, _)| action)
        .ok_or_else(|| PallasError::protocol("policy", "no available actions to choose from"))
}

/// Available actions ordered by value, highest first; ties keep ascending
/// action order.
pub(crate) fn ranked(values: ArrayView1<f32>, available: &BTreeSet<usize>) -> Vec<usize> {
    let mut actions: Vec<usize> = available.iter().copied().collect();
    actions.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    actions
}

/// Normalised entropy `H(p) / ln n` of the distribution implied by the
/// available values, in `[0, 1]`.
pub(crate) fn normalized_entropy(values: ArrayView1<f32>, available: &BTreeSet<usize>, as_softmax: bool) -> f32 {
    let n = available.len();
    if n < 2 {
        return 0.0;
    }
    let raw: Vec<f32> = available.iter().map(|&a| values[a]).collect();
    let weights: Vec<f32> = if as_softmax {
        let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        raw.iter().map(|v| (v - max).exp()).collect()
    } else {
        raw.iter().map(|v| v.max(0.0)).collect()
    };
    let total: f32 = weights.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return 1.0;
    }
    let entropy: f32 = weights
        .iter()
        .map(|w| w / total)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum();
    (entropy / (n as f32).ln()).clamp(0.0, 1.0)
}
