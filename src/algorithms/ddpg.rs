use ndarray::{Array1, Axis};

use super::{policy_gradient, AlgorithmKind, LearningAlgorithm};
use crate::activations::softmax;
use crate::environment::EnvironmentState;
use crate::error::Result;
use crate::estimator::{FunctionEstimator, TargetRule};
use crate::policy::greedy_action;
use crate::transition::Transition;

/// Critic target of [`Ddpg`]: `r + γ·Q'(s', μ(s'))`, where `μ(s')` is the
/// available action the actor rates highest and `Q'` the critic's target copy.
pub struct ActorQTarget<'a> {
    pub gamma: f32,
    pub actor: &'a FunctionEstimator,
}

impl ActorQTarget<'_> {
    pub fn td_target(&self, critic: &FunctionEstimator, transition: &Transition) -> Result<f32> {
        let next = &transition.next_state;
        if transition.terminal || next.available_actions.is_empty() {
            return Ok(transition.reward);
        }
        let preferred = self.actor.predict(next)?;
        let action = greedy_action(preferred.view(), &next.available_actions)?;
        Ok(transition.reward + self.gamma * critic.predict_target(next)?[action])
    }
}

impl TargetRule for ActorQTarget<'_> {
    fn targets(&self, estimator: &FunctionEstimator, batch: &[Transition]) -> Result<Vec<Array1<f32>>> {
        batch
            .iter()
            .map(|t| {
                let mut target = estimator.predict(&t.state)?;
                target[t.action] = self.td_target(estimator, t)?;
                Ok(target)
            })
            .collect()
    }
}

/// Deterministic policy gradient over a discrete action set.
///
/// A Q critic with a target copy learns `r + γ·Q'(s', μ(s'))`. The actor
/// then follows `A·∇log π(a|s)` with `A = Q(s, a) − Σ π(b|s)·Q(s, b)`, the
/// expectation taken over the available actions only.
pub struct Ddpg {
    actor: FunctionEstimator,
    critic: FunctionEstimator,
    gamma: f32,
    entropy_coefficient: f32,
}

impl Ddpg {
    pub fn new(actor: FunctionEstimator, critic: FunctionEstimator, gamma: f32, entropy_coefficient: f32) -> Self {
        Ddpg {
            actor,
            critic,
            gamma,
            entropy_coefficient,
        }
    }

    pub fn critic(&self) -> &FunctionEstimator {
        &self.critic
    }

    /// Advantage of `action` over the actor's expected critic value in `state`.
    pub fn advantage(&self, state: &EnvironmentState, action: usize) -> Result<f32> {
        let q = self.critic.predict(state)?;
        let probabilities = softmax(self.actor.predict(state)?.view());
        let mass: f32 = state.available_actions.iter().map(|&a| probabilities[a]).sum();
        if mass <= 0.0 {
            return Ok(0.0);
        }
        let expected: f32 = state
            .available_actions
            .iter()
            .map(|&a| probabilities[a] * q[a])
            .sum::<f32>()
            / mass;
        Ok(q[action] - expected)
    }
}

impl LearningAlgorithm for Ddpg {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Ddpg
    }

    fn action_values(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        Ok(softmax(self.actor.predict(state)?.view()))
    }

    fn observe(&mut self, transition: Transition) -> Result<Option<f32>> {
        let rule = ActorQTarget {
            gamma: self.gamma,
            actor: &self.actor,
        };
        let report = self.critic.update(transition.clone(), &rule)?;

        let advantage = self.advantage(&transition.state, transition.action)?;
        let logits = self.actor.predict(&transition.state)?;
        let gradient = policy_gradient(logits.view(), transition.action, advantage, self.entropy_coefficient);
        self.actor.apply_gradient(
            transition.state.features.view().insert_axis(Axis(0)),
            gradient.view().insert_axis(Axis(0)),
        )?;
        Ok(report.map(|r| r.loss))
    }

    fn end_episode(&mut self) -> Result<Option<f32>> {
        Ok(None)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn estimator(&self) -> &FunctionEstimator {
        &self.actor
    }
}
