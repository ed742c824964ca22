use ndarray::Array1;

use super::{policy_gradient, AlgorithmKind, LearningAlgorithm};
use crate::activations::softmax;
use crate::environment::EnvironmentState;
use crate::error::Result;
use crate::estimator::{stack_rows, FunctionEstimator};
use crate::transition::{Trajectory, Transition};

/// Episode rollout with the behaviour probability of each taken action
#[derive(Debug, Clone, Default)]
pub struct PpoRollout {
    pub trajectory: Trajectory,
    pub old_probabilities: Vec<f32>,
}

impl PpoRollout {
    pub fn push(&mut self, transition: Transition, probability: f32) {
        self.trajectory.push(transition);
        self.old_probabilities.push(probability);
    }

    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    pub fn close_episode(&mut self) {
        self.trajectory.close_episode();
    }

    pub fn clear(&mut self) {
        self.trajectory.clear();
        self.old_probabilities.clear();
    }
}

/// Proximal Policy Optimization.
///
/// At episode end the rollout is replayed for `epochs` passes. Each pass
/// maximises `min(ρ·A, clip(ρ, 1 − ε, 1 + ε)·A)` with
/// `ρ = π(a|s) / π_old(a|s)` and `A = G − V(s)`, and regresses the critic
/// toward the returns.
pub struct Ppo {
    policy: FunctionEstimator,
    value: FunctionEstimator,
    gamma: f32,
    clip: f32,
    epochs: usize,
    entropy_coefficient: f32,
    rollout: PpoRollout,
}

impl Ppo {
    pub fn new(
        policy: FunctionEstimator,
        value: FunctionEstimator,
        gamma: f32,
        clip: f32,
        epochs: usize,
        entropy_coefficient: f32,
    ) -> Self {
        Ppo {
            policy,
            value,
            gamma,
            clip,
            epochs,
            entropy_coefficient,
            rollout: PpoRollout::default(),
        }
    }

    pub fn value_estimator(&self) -> &FunctionEstimator {
        &self.value
    }

    /// Whether the clipped objective passes gradient for ratio `ratio`.
    pub fn within_trust_region(&self, ratio: f32, advantage: f32) -> bool {
        !((advantage >= 0.0 && ratio > 1.0 + self.clip) || (advantage < 0.0 && ratio < 1.0 - self.clip))
    }

    fn epoch(&mut self, returns: &[f32]) -> Result<f32> {
        let transitions = self.rollout.trajectory.transitions();
        let mut gradients = Vec::with_capacity(transitions.len());
        let mut samples = Vec::with_capacity(transitions.len());
        let mut objective = 0.0;
        for ((transition, &old), &g) in transitions
            .iter()
            .zip(&self.rollout.old_probabilities)
            .zip(returns)
        {
            let logits = self.policy.predict(&transition.state)?;
            let probability = softmax(logits.view())[transition.action];
            let ratio = probability / old.max(f32::MIN_POSITIVE);
            let advantage = g - self.value.predict(&transition.state)?[0];
            let clipped = ratio.clamp(1.0 - self.clip, 1.0 + self.clip);
            objective += (ratio * advantage).min(clipped * advantage);

            // d(ρ·A)/dz = ρ·A·(onehot − π)
            let scale = if self.within_trust_region(ratio, advantage) {
                ratio * advantage
            } else {
                0.0
            };
            gradients.push(policy_gradient(logits.view(), transition.action, scale, self.entropy_coefficient));
            samples.push((transition.state.features.clone(), Array1::from_elem(1, g)));
        }
        let inputs = stack_rows(transitions.iter().map(|t| t.state.features.view()), self.policy.input_size())?;
        let gradients = stack_rows(gradients.iter().map(|g| g.view()), self.policy.output_size())?;
        self.policy.apply_gradient(inputs.view(), gradients.view())?;
        self.value.train(&samples)?;
        Ok(-objective / transitions.len().max(1) as f32)
    }
}

impl LearningAlgorithm for Ppo {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Ppo
    }

    fn action_values(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        Ok(softmax(self.policy.predict(state)?.view()))
    }

    fn observe(&mut self, transition: Transition) -> Result<Option<f32>> {
        let probability = self.action_values(&transition.state)?[transition.action];
        self.rollout.push(transition, probability);
        Ok(None)
    }

    fn episode_boundary(&mut self) -> Result<Option<f32>> {
        self.rollout.close_episode();
        Ok(None)
    }

    fn end_episode(&mut self) -> Result<Option<f32>> {
        if self.rollout.is_empty() {
            return Ok(None);
        }
        let returns = self.rollout.trajectory.discounted_returns(self.gamma);
        let mut loss = 0.0;
        for _ in 0..self.epochs {
            loss = self.epoch(&returns)?;
        }
        self.rollout.clear();
        Ok(Some(loss))
    }

    fn flush(&mut self) -> Result<()> {
        self.end_episode().map(|_| ())
    }

    fn estimator(&self) -> &FunctionEstimator {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{EstimatorConfig, TabularApproximator};
    use ndarray::array;
    use std::collections::BTreeSet;

    fn ppo(clip: f32) -> Ppo {
        let mut config = EstimatorConfig::default();
        config.learning_rate = 0.5;
        let policy = FunctionEstimator::new(Box::new(TabularApproximator::new(1, 2)), config.clone());
        let value = FunctionEstimator::new(Box::new(TabularApproximator::new(1, 1)), config);
        Ppo::new(policy, value, 1.0, clip, 4, 0.0)
    }

    #[test]
    fn clipping_limits_probability_ratio() {
        let p = ppo(0.2);
        assert!(p.within_trust_region(1.1, 1.0));
        assert!(!p.within_trust_region(1.3, 1.0));
        assert!(p.within_trust_region(1.3, -1.0));
        assert!(!p.within_trust_region(0.7, -1.0));
    }

    #[test]
    fn episode_update_favours_rewarded_action() {
        let mut p = ppo(0.2);
        let s = EnvironmentState::new(array![0.0], BTreeSet::from([0, 1]));
        let end = EnvironmentState::new(array![1.0], BTreeSet::new());
        p.observe(Transition::new(s.clone(), 0, 1.0, end, true)).unwrap();
        p.end_episode().unwrap();
        let probs = p.action_values(&s).unwrap();
        assert!(probs[0] > 0.5);
        // ratio stops growing once it leaves the trust region
        assert!(probs[0] / 0.5 <= 1.0 + 0.2 + 0.3);
        assert!(p.value_estimator().predict(&s).unwrap()[0] > 0.0);
    }
}
