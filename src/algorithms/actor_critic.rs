use ndarray::{Array1, Axis};

use super::{policy_gradient, AlgorithmKind, LearningAlgorithm};
use crate::activations::softmax;
use crate::environment::EnvironmentState;
use crate::error::Result;
use crate::estimator::FunctionEstimator;
use crate::transition::Transition;

/// One-step actor-critic.
///
/// The critic regresses `V(s)` toward `r + γ·V(s')`; the actor follows
/// `A·∇log π(a|s)` with `A = r + γ·V(s') − V(s)`, plus an entropy bonus.
pub struct ActorCritic {
    policy: FunctionEstimator,
    value: FunctionEstimator,
    gamma: f32,
    entropy_coefficient: f32,
}

impl ActorCritic {
    pub fn new(policy: FunctionEstimator, value: FunctionEstimator, gamma: f32, entropy_coefficient: f32) -> Self {
        ActorCritic {
            policy,
            value,
            gamma,
            entropy_coefficient,
        }
    }

    pub fn value_estimator(&self) -> &FunctionEstimator {
        &self.value
    }

    /// `(td_target, advantage)` of a transition under the current critic.
    pub fn advantage(&self, transition: &Transition) -> Result<(f32, f32)> {
        let v = self.value.predict(&transition.state)?[0];
        let next = if transition.terminal {
            0.0
        } else {
            self.value.predict(&transition.next_state)?[0]
        };
        let target = transition.reward + self.gamma * next;
        Ok((target, target - v))
    }
}

impl LearningAlgorithm for ActorCritic {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::ActorCritic
    }

    fn action_values(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        let logits = self.policy.predict(state)?;
        Ok(softmax(logits.view()))
    }

    fn observe(&mut self, transition: Transition) -> Result<Option<f32>> {
        let (target, advantage) = self.advantage(&transition)?;
        let features = transition.state.features.clone();

        let logits = self.policy.predict(&transition.state)?;
        let gradient = policy_gradient(logits.view(), transition.action, advantage, self.entropy_coefficient);
        self.policy.apply_gradient(
            features.view().insert_axis(Axis(0)),
            gradient.view().insert_axis(Axis(0)),
        )?;

        let loss = self.value.train(&[(features, Array1::from_elem(1, target))])?;
        Ok(Some(loss))
    }

    fn end_episode(&mut self) -> Result<Option<f32>> {
        Ok(None)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
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

    fn algorithm() -> ActorCritic {
        let mut config = EstimatorConfig::default();
        config.learning_rate = 0.5;
        let policy = FunctionEstimator::new(Box::new(TabularApproximator::new(1, 2)), config.clone());
        let value = FunctionEstimator::new(Box::new(TabularApproximator::new(1, 1)), config);
        ActorCritic::new(policy, value, 0.9, 0.0)
    }

    #[test]
    fn positive_advantage_raises_action_probability() {
        let mut ac = algorithm();
        let s0 = EnvironmentState::new(array![0.0], BTreeSet::from([0, 1]));
        let s1 = EnvironmentState::new(array![1.0], BTreeSet::new());
        let before = ac.action_values(&s0).unwrap();
        assert!((before[0] - 0.5).abs() < 1e-6);

        ac.observe(Transition::new(s0.clone(), 0, 1.0, s1, true)).unwrap();
        let after = ac.action_values(&s0).unwrap();
        assert!(after[0] > 0.5);
        // critic moved halfway to the terminal reward
        assert!((ac.value_estimator().predict(&s0).unwrap()[0] - 0.5).abs() < 1e-6);
    }
}
