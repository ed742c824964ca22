use ndarray::Array1;

use super::{policy_gradient, AlgorithmKind, LearningAlgorithm};
use crate::activations::softmax;
use crate::environment::EnvironmentState;
use crate::error::Result;
use crate::estimator::{stack_rows, FunctionEstimator};
use crate::transition::{Trajectory, Transition};

/// Monte Carlo policy gradient.
///
/// Collects the episode, then steps every logit row along
/// `(G_t − b)·∇log π(a_t|s_t)` in one batch. With a baseline, `b` is a running
/// mean of episode-average returns.
pub struct Reinforce {
    policy: FunctionEstimator,
    gamma: f32,
    entropy_coefficient: f32,
    baseline_tau: Option<f32>,
    baseline: Option<f32>,
    trajectory: Trajectory,
}

impl Reinforce {
    pub fn new(policy: FunctionEstimator, gamma: f32, entropy_coefficient: f32) -> Self {
        Reinforce {
            policy,
            gamma,
            entropy_coefficient,
            baseline_tau: None,
            baseline: None,
            trajectory: Trajectory::new(),
        }
    }

    pub fn with_baseline(mut self, tau: f32) -> Self {
        self.baseline_tau = Some(tau);
        self
    }

    pub fn baseline(&self) -> Option<f32> {
        self.baseline
    }

    fn update_baseline(&mut self, returns: &[f32]) {
        let Some(tau) = self.baseline_tau else {
            return;
        };
        let mean = returns.iter().sum::<f32>() / returns.len().max(1) as f32;
        self.baseline = Some(match self.baseline {
            Some(b) => tau * b + (1.0 - tau) * mean,
            None => mean,
        });
    }
}

impl LearningAlgorithm for Reinforce {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Reinforce
    }

    fn action_values(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        Ok(softmax(self.policy.predict(state)?.view()))
    }

    fn observe(&mut self, transition: Transition) -> Result<Option<f32>> {
        self.trajectory.push(transition);
        Ok(None)
    }

    fn episode_boundary(&mut self) -> Result<Option<f32>> {
        self.trajectory.close_episode();
        Ok(None)
    }

    fn end_episode(&mut self) -> Result<Option<f32>> {
        if self.trajectory.is_empty() {
            return Ok(None);
        }
        let returns = self.trajectory.discounted_returns(self.gamma);
        let baseline = self.baseline.unwrap_or(0.0);
        let mut gradients = Vec::with_capacity(returns.len());
        let mut objective = 0.0;
        for (transition, &g) in self.trajectory.transitions().iter().zip(&returns) {
            let logits = self.policy.predict(&transition.state)?;
            let advantage = g - baseline;
            let probability = softmax(logits.view())[transition.action].max(f32::MIN_POSITIVE);
            objective -= advantage * probability.ln();
            gradients.push(policy_gradient(logits.view(), transition.action, advantage, self.entropy_coefficient));
        }
        let inputs = stack_rows(
            self.trajectory.transitions().iter().map(|t| t.state.features.view()),
            self.policy.input_size(),
        )?;
        let gradients = stack_rows(gradients.iter().map(|g| g.view()), self.policy.output_size())?;
        self.policy.apply_gradient(inputs.view(), gradients.view())?;
        self.update_baseline(&returns);
        let steps = self.trajectory.len();
        self.trajectory.clear();
        Ok(Some(objective / steps as f32))
    }

    fn flush(&mut self) -> Result<()> {
        self.end_episode().map(|_| ())
    }

    fn estimator(&self) -> &FunctionEstimator {
        &self.policy
    }
}
