use ndarray::Array1;

use super::{AlgorithmKind, LearningAlgorithm};
use crate::environment::EnvironmentState;
use crate::error::Result;
use crate::estimator::{FunctionEstimator, TargetRule};
use crate::policy::greedy_action;
use crate::transition::Transition;

/// On-policy TD target `r + γ·Q(s', a')` for the next action actually taken.
///
/// When `next_action` is unknown (the episode stopped before another action
/// was chosen) the greedy next action stands in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SarsaTarget {
    pub gamma: f32,
    pub next_action: Option<usize>,
}

impl TargetRule for SarsaTarget {
    fn targets(&self, estimator: &FunctionEstimator, batch: &[Transition]) -> Result<Vec<Array1<f32>>> {
        batch
            .iter()
            .map(|t| {
                let mut target = estimator.predict(&t.state)?;
                target[t.action] = if t.terminal || t.next_state.available_actions.is_empty() {
                    t.reward
                } else {
                    let next = estimator.predict(&t.next_state)?;
                    let action = match self.next_action {
                        Some(a) if t.next_state.is_available(a) => a,
                        _ => greedy_action(next.view(), &t.next_state.available_actions)?,
                    };
                    t.reward + self.gamma * next[action]
                };
                Ok(target)
            })
            .collect()
    }
}

/// SARSA. A step is learned once the following action is known, so each
/// update lags the environment by one step; terminal steps learn at once.
pub struct Sarsa {
    estimator: FunctionEstimator,
    gamma: f32,
    pending: Option<Transition>,
}

impl Sarsa {
    pub fn new(estimator: FunctionEstimator, gamma: f32) -> Self {
        Sarsa {
            estimator,
            gamma,
            pending: None,
        }
    }

    fn learn(&mut self, transition: Transition, next_action: Option<usize>) -> Result<Option<f32>> {
        let rule = SarsaTarget {
            gamma: self.gamma,
            next_action,
        };
        Ok(self.estimator.update(transition, &rule)?.map(|r| r.loss))
    }
}

impl LearningAlgorithm for Sarsa {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Sarsa
    }

    fn action_values(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        self.estimator.predict(state)
    }

    fn observe(&mut self, transition: Transition) -> Result<Option<f32>> {
        let mut loss = None;
        if let Some(previous) = self.pending.take() {
            loss = self.learn(previous, Some(transition.action))?;
        }
        if transition.terminal {
            let terminal_loss = self.learn(transition, None)?;
            return Ok(terminal_loss.or(loss));
        }
        self.pending = Some(transition);
        Ok(loss)
    }

    /// A step still waiting at the episode end bootstraps from its own next
    /// state; the next episode's first action belongs to a different state.
    fn episode_boundary(&mut self) -> Result<Option<f32>> {
        match self.pending.take() {
            Some(previous) => self.learn(previous, None),
            None => Ok(None),
        }
    }

    fn end_episode(&mut self) -> Result<Option<f32>> {
        self.episode_boundary()
    }

    fn flush(&mut self) -> Result<()> {
        self.episode_boundary().map(|_| ())
    }

    fn estimator(&self) -> &FunctionEstimator {
        &self.estimator
    }
}
