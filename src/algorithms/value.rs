use ndarray::Array1;

use super::{AlgorithmKind, LearningAlgorithm};
use crate::environment::EnvironmentState;
use crate::error::Result;
use crate::estimator::{FunctionEstimator, TargetRule};
use crate::policy::greedy_action;
use crate::transition::Transition;

/// Off-policy TD target `r + γ·Q(s', a*)`.
///
/// Without `double`, `a*` maximises the target estimate over the next
/// state's available actions. With `double`, `a*` is the live estimator's
/// argmax and the target estimate only values it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QTarget {
    pub gamma: f32,
    pub double: bool,
}

impl QTarget {
    pub fn new(gamma: f32, double: bool) -> Self {
        QTarget { gamma, double }
    }

    /// Scalar target for the action taken in `transition`.
    pub fn td_target(&self, estimator: &FunctionEstimator, transition: &Transition) -> Result<f32> {
        if transition.terminal || transition.next_state.available_actions.is_empty() {
            return Ok(transition.reward);
        }
        let next = &transition.next_state;
        let target_values = estimator.predict_target(next)?;
        let bootstrap = if self.double {
            let live = estimator.predict(next)?;
            let best = greedy_action(live.view(), &next.available_actions)?;
            target_values[best]
        } else {
            let best = greedy_action(target_values.view(), &next.available_actions)?;
            target_values[best]
        };
        Ok(transition.reward + self.gamma * bootstrap)
    }
}

impl TargetRule for QTarget {
    fn targets(&self, estimator: &FunctionEstimator, batch: &[Transition]) -> Result<Vec<Array1<f32>>> {
        batch
            .iter()
            .map(|transition| {
                let mut target = estimator.predict(&transition.state)?;
                target[transition.action] = self.td_target(estimator, transition)?;
                Ok(target)
            })
            .collect()
    }
}

/// Q-learning family: online Q-learning, DQN, double and dueling DQN.
///
/// The kinds differ only in how their estimator was built (target copy,
/// replay memory, dueling head) and whether the target is doubled.
pub struct ValueLearning {
    kind: AlgorithmKind,
    estimator: FunctionEstimator,
    rule: QTarget,
}

impl ValueLearning {
    pub fn new(kind: AlgorithmKind, estimator: FunctionEstimator, rule: QTarget) -> Self {
        ValueLearning { kind, estimator, rule }
    }

    pub fn rule(&self) -> &QTarget {
        &self.rule
    }
}

impl LearningAlgorithm for ValueLearning {
    fn kind(&self) -> AlgorithmKind {
        self.kind
    }

    fn action_values(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        self.estimator.predict(state)
    }

    fn observe(&mut self, transition: Transition) -> Result<Option<f32>> {
        let report = self.estimator.update(transition, &self.rule)?;
        Ok(report.map(|r| r.loss))
    }

    fn end_episode(&mut self) -> Result<Option<f32>> {
        Ok(None)
    }

    fn flush(&mut self) -> Result<()> {
        self.estimator.flush(&self.rule)?;
        Ok(())
    }

    fn estimator(&self) -> &FunctionEstimator {
        &self.estimator
    }
}
