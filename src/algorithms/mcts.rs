use ndarray::Array1;

use super::{AlgorithmKind, LearningAlgorithm};
use crate::environment::EnvironmentState;
use crate::error::Result;
use crate::estimator::FunctionEstimator;
use crate::transition::{Trajectory, Transition};

/// Learning side of tree search.
///
/// The policy head regresses toward the visit distribution the search
/// reported for each step; the value head regresses toward the episode
/// return from that step. Steps without search statistics fall back to the
/// one-hot of the action taken.
pub struct MctsLearning {
    policy: FunctionEstimator,
    value: FunctionEstimator,
    gamma: f32,
    trajectory: Trajectory,
    distributions: Vec<Array1<f32>>,
    pending: Option<Array1<f32>>,
}

impl MctsLearning {
    pub fn new(policy: FunctionEstimator, value: FunctionEstimator, gamma: f32) -> Self {
        MctsLearning {
            policy,
            value,
            gamma,
            trajectory: Trajectory::new(),
            distributions: Vec::new(),
            pending: None,
        }
    }

    pub fn value_estimator(&self) -> &FunctionEstimator {
        &self.value
    }
}

impl LearningAlgorithm for MctsLearning {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Mcts
    }

    fn action_values(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        self.policy.predict(state)
    }

    fn observe(&mut self, transition: Transition) -> Result<Option<f32>> {
        let n = self.policy.output_size();
        let distribution = match self.pending.take() {
            Some(d) if d.len() == n => d,
            _ => {
                let mut onehot = Array1::zeros(n);
                onehot[transition.action] = 1.0;
                onehot
            }
        };
        self.distributions.push(distribution);
        self.trajectory.push(transition);
        Ok(None)
    }

    fn episode_boundary(&mut self) -> Result<Option<f32>> {
        self.trajectory.close_episode();
        self.pending = None;
        Ok(None)
    }

    fn end_episode(&mut self) -> Result<Option<f32>> {
        if self.trajectory.is_empty() {
            return Ok(None);
        }
        let returns = self.trajectory.discounted_returns(self.gamma);
        let states: Vec<Array1<f32>> = self
            .trajectory
            .transitions()
            .iter()
            .map(|t| t.state.features.clone())
            .collect();
        let value_samples: Vec<_> = states
            .iter()
            .zip(&returns)
            .map(|(s, &g)| (s.clone(), Array1::from_elem(1, g)))
            .collect();
        let policy_samples: Vec<_> = states.into_iter().zip(self.distributions.drain(..)).collect();
        let value_loss = self.value.train(&value_samples)?;
        let policy_loss = self.policy.train(&policy_samples)?;
        self.trajectory.clear();
        Ok(Some(value_loss + policy_loss))
    }

    fn flush(&mut self) -> Result<()> {
        self.end_episode().map(|_| ())
    }

    fn estimator(&self) -> &FunctionEstimator {
        &self.policy
    }

    fn set_visit_distribution(&mut self, distribution: Array1<f32>) {
        self.pending = Some(distribution);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{EstimatorConfig, TabularApproximator};
    use ndarray::array;
    use std::collections::BTreeSet;

    #[test]
    fn trains_toward_visits_and_returns() {
        let mut config = EstimatorConfig::default();
        config.learning_rate = 1.0;
        let policy = FunctionEstimator::new(Box::new(TabularApproximator::new(1, 2)), config.clone());
        let value = FunctionEstimator::new(Box::new(TabularApproximator::new(1, 1)), config);
        let mut mcts = MctsLearning::new(policy, value, 1.0);

        let s0 = EnvironmentState::new(array![0.0], BTreeSet::from([0, 1]));
        let s1 = EnvironmentState::new(array![1.0], BTreeSet::from([0, 1]));
        let end = EnvironmentState::new(array![2.0], BTreeSet::new());
        mcts.set_visit_distribution(array![0.25, 0.75]);
        mcts.observe(Transition::new(s0.clone(), 1, 1.0, s1.clone(), false)).unwrap();
        mcts.observe(Transition::new(s1.clone(), 0, 2.0, end, true)).unwrap();
        mcts.end_episode().unwrap();

        assert_eq!(mcts.action_values(&s0).unwrap(), array![0.25, 0.75]);
        assert_eq!(mcts.action_values(&s1).unwrap(), array![1.0, 0.0]);
        assert_eq!(mcts.value_estimator().predict(&s0).unwrap()[0], 3.0);
    }
}
