use std::collections::BTreeSet;

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use super::decay::{Decay, DecayingValue};
use super::{check_candidates, greedy_action, ExplorationPolicy, PolicyKind};
use crate::error::{PallasError, Result};
use crate::params::{ParamDef, ParamSet, ParamType};

pub const NOISY_PARAMS: &[ParamDef] = &[
    ParamDef::new("initialExplorationNoise", ParamType::Float),
    ParamDef::new("minExplorationNoise", ParamType::Float),
    ParamDef::new("explorationNoiseDecay", ParamType::Float),
];

pub const OU_PARAMS: &[ParamDef] = &[
    ParamDef::new("mu", ParamType::Float),
    ParamDef::new("theta", ParamType::Float),
    ParamDef::new("sigma", ParamType::Float),
    ParamDef::new("minSigma", ParamType::Float),
    ParamDef::new("sigmaDecay", ParamType::Float),
];

fn perturbed_argmax(values: ArrayView1<f32>, noise: ArrayView1<f32>, available: &BTreeSet<usize>) -> Result<usize> {
    let noisy = &values + &noise;
    greedy_action(noisy.view(), available)
}

/// Argmax of the values after adding Gaussian noise of a decaying scale.
#[derive(Debug, Clone)]
pub struct NoisyNextBestPolicy {
    noise: DecayingValue,
}

impl NoisyNextBestPolicy {
    pub fn new(initial: f32, min: f32, decay_rate: f32) -> Result<Self> {
        Ok(NoisyNextBestPolicy {
            noise: DecayingValue::new("explorationNoise", initial, min, Decay::Exponential { rate: decay_rate })?,
        })
    }

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        Self::new(
            params.float_or("initialExplorationNoise", 1.0),
            params.float_or("minExplorationNoise", 0.2),
            params.float_or("explorationNoiseDecay", 0.999),
        )
    }

    pub fn noise_scale(&self) -> f32 {
        self.noise.value()
    }
}

impl ExplorationPolicy for NoisyNextBestPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::NoisyNextBest
    }

    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, rng: &mut StdRng) -> Result<usize> {
        check_candidates(values, available)?;
        let scale = self.noise.value();
        let noise = Array1::from_shape_fn(values.len(), |_| {
            let z: f32 = StandardNormal.sample(rng);
            scale * z
        });
        let action = perturbed_argmax(values, noise.view(), available)?;
        self.noise.step();
        Ok(action)
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.noise.value())
    }
}

/// Argmax of the values plus temporally correlated Ornstein-Uhlenbeck noise.
///
/// The noise process restarts at `mu` each episode and its scale decays per
/// episode.
#[derive(Debug, Clone)]
pub struct OuNoisePolicy {
    mu: f32,
    theta: f32,
    sigma: DecayingValue,
    state: Array1<f32>,
}

impl OuNoisePolicy {
    pub fn new(mu: f32, theta: f32, sigma: f32, min_sigma: f32, sigma_decay: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&theta) {
            return Err(PallasError::invalid_parameter(
                "theta".to_string(),
                format!("must be within [0, 1], got {}", theta),
            ));
        }
        Ok(OuNoisePolicy {
            mu,
            theta,
            sigma: DecayingValue::new("sigma", sigma, min_sigma, Decay::Exponential { rate: sigma_decay })?,
            state: Array1::zeros(0),
        })
    }

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        Self::new(
            params.float_or("mu", 0.0),
            params.float_or("theta", 0.1),
            params.float_or("sigma", 0.5),
            params.float_or("minSigma", 0.01),
            params.float_or("sigmaDecay", 0.9999),
        )
    }

    /// Advance the process: `x ← x + θ(μ − x) + σ·N(0, 1)`.
    fn sample(&mut self, width: usize, rng: &mut StdRng) -> Array1<f32> {
        if self.state.len() != width {
            self.state = Array1::from_elem(width, self.mu);
        }
        let (mu, theta, sigma) = (self.mu, self.theta, self.sigma.value());
        self.state.mapv_inplace(|x| {
            let z: f32 = StandardNormal.sample(rng);
            x + theta * (mu - x) + sigma * z
        });
        self.state.clone()
    }
}

impl ExplorationPolicy for OuNoisePolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::OuNoise
    }

    fn select(&mut self, values: ArrayView1<f32>, available: &BTreeSet<usize>, rng: &mut StdRng) -> Result<usize> {
        check_candidates(values, available)?;
        let noise = self.sample(values.len(), rng);
        perturbed_argmax(values, noise.view(), available)
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.sigma.value())
    }

    fn end_episode(&mut self, _returns: &[f32]) {
        self.state.fill(self.mu);
        self.sigma.step();
    }
}
