use ndarray::{Array1, ArrayView1, Axis};

use super::{AlgorithmKind, LearningAlgorithm};
use crate::activations::softmax;
use crate::environment::EnvironmentState;
use crate::error::{PallasError, Result};
use crate::estimator::{FunctionEstimator, TargetRule};
use crate::transition::Transition;

/// Share of the maximum entropy `ln |A|` that temperature tuning aims for
pub const TARGET_ENTROPY_RATIO: f32 = 0.98;

/// Policy probabilities renormalised over the available actions.
fn available_distribution(probabilities: ArrayView1<f32>, state: &EnvironmentState) -> Vec<(usize, f32)> {
    let available = &state.available_actions;
    let mass: f32 = available.iter().map(|&a| probabilities[a]).sum();
    available
        .iter()
        .map(|&a| {
            let p = if mass > 0.0 {
                probabilities[a] / mass
            } else {
                1.0 / available.len() as f32
            };
            (a, p)
        })
        .collect()
}

fn entropy(distribution: &[(usize, f32)]) -> f32 {
    distribution
        .iter()
        .filter(|(_, p)| *p > 0.0)
        .map(|(_, p)| -p * p.ln())
        .sum()
}

/// Soft Bellman target of one twin critic:
/// `r + γ·Σ π(a'|s')·(min(Q1', Q2')(s', a') − α·log π(a'|s'))`.
pub struct SoftQTarget<'a> {
    pub gamma: f32,
    pub alpha: f32,
    pub policy: &'a FunctionEstimator,
    /// The other critic of the pair
    pub twin: &'a FunctionEstimator,
}

impl SoftQTarget<'_> {
    /// Soft state value of `state` under both target critics.
    pub fn soft_value(&self, critic: &FunctionEstimator, state: &EnvironmentState) -> Result<f32> {
        if state.available_actions.is_empty() {
            return Ok(0.0);
        }
        let q = critic.predict_target(state)?;
        let twin = self.twin.predict_target(state)?;
        let probabilities = softmax(self.policy.predict(state)?.view());
        let value = available_distribution(probabilities.view(), state)
            .into_iter()
            .filter(|&(_, p)| p > 0.0)
            .map(|(a, p)| p * (q[a].min(twin[a]) - self.alpha * p.ln()))
            .sum();
        Ok(value)
    }

    pub fn td_target(&self, critic: &FunctionEstimator, transition: &Transition) -> Result<f32> {
        if transition.terminal {
            return Ok(transition.reward);
        }
        Ok(transition.reward + self.gamma * self.soft_value(critic, &transition.next_state)?)
    }
}

impl TargetRule for SoftQTarget<'_> {
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

/// dL/d(logits) for `L = Σ_{a∈A} π(a)·(α·log π(a) − Q(a))`, `π = softmax(logits)`.
fn soft_policy_gradient(logits: ArrayView1<f32>, q: ArrayView1<f32>, alpha: f32, state: &EnvironmentState) -> Array1<f32> {
    let probabilities = softmax(logits);
    let mut weighted = Array1::zeros(probabilities.len());
    for &a in &state.available_actions {
        let p = probabilities[a].max(f32::MIN_POSITIVE);
        weighted[a] = probabilities[a] * (alpha * p.ln() - q[a] + alpha);
    }
    let total = weighted.sum();
    Array1::from_shape_fn(probabilities.len(), |j| weighted[j] - probabilities[j] * total)
}

#[derive(Debug, Clone, Copy)]
struct AlphaTuning {
    learning_rate: f32,
    log_alpha: f32,
}

/// Soft actor-critic for discrete actions.
///
/// Two critics with target copies learn the soft Bellman target using the
/// smaller of their estimates. The actor minimises
/// `Σ π(a|s)·(α·log π(a|s) − min Q(s, a))`. With tuning enabled the
/// temperature `α` moves so the policy entropy tracks
/// [`TARGET_ENTROPY_RATIO`]`·ln |A|`.
pub struct SacDiscrete {
    policy: FunctionEstimator,
    q1: FunctionEstimator,
    q2: FunctionEstimator,
    gamma: f32,
    alpha: f32,
    tuning: Option<AlphaTuning>,
}

impl SacDiscrete {
    pub fn new(
        policy: FunctionEstimator,
        q1: FunctionEstimator,
        q2: FunctionEstimator,
        gamma: f32,
        alpha: f32,
    ) -> Result<Self> {
        if !(alpha > 0.0 && alpha.is_finite()) {
            return Err(PallasError::invalid_parameter(
                "softQAlpha".to_string(),
                format!("must be positive, got {}", alpha),
            ));
        }
        Ok(SacDiscrete {
            policy,
            q1,
            q2,
            gamma,
            alpha,
            tuning: None,
        })
    }

    /// Adjust `α` after every step by gradient descent on `log α`.
    pub fn with_alpha_tuning(mut self, learning_rate: f32) -> Result<Self> {
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(PallasError::invalid_parameter(
                "alphaLearningRate".to_string(),
                format!("must be positive, got {}", learning_rate),
            ));
        }
        self.tuning = Some(AlphaTuning {
            learning_rate,
            log_alpha: self.alpha.ln(),
        });
        Ok(self)
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn critics(&self) -> (&FunctionEstimator, &FunctionEstimator) {
        (&self.q1, &self.q2)
    }

    fn tune_alpha(&mut self, entropy: f32, action_count: usize) {
        if let Some(tuning) = self.tuning.as_mut() {
            let target = TARGET_ENTROPY_RATIO * (action_count as f32).ln();
            tuning.log_alpha -= tuning.learning_rate * self.alpha * (entropy - target);
            self.alpha = tuning.log_alpha.exp();
        }
    }
}

impl LearningAlgorithm for SacDiscrete {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::SacDiscrete
    }

    fn action_values(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        Ok(softmax(self.policy.predict(state)?.view()))
    }

    fn observe(&mut self, transition: Transition) -> Result<Option<f32>> {
        let first = SoftQTarget {
            gamma: self.gamma,
            alpha: self.alpha,
            policy: &self.policy,
            twin: &self.q2,
        };
        let loss1 = self.q1.update(transition.clone(), &first)?;
        let second = SoftQTarget {
            gamma: self.gamma,
            alpha: self.alpha,
            policy: &self.policy,
            twin: &self.q1,
        };
        let loss2 = self.q2.update(transition.clone(), &second)?;

        let state = &transition.state;
        let q1 = self.q1.predict(state)?;
        let q2 = self.q2.predict(state)?;
        let q = Array1::from_shape_fn(q1.len(), |i| q1[i].min(q2[i]));
        let logits = self.policy.predict(state)?;
        let gradient = soft_policy_gradient(logits.view(), q.view(), self.alpha, state);
        self.policy.apply_gradient(
            state.features.view().insert_axis(Axis(0)),
            gradient.view().insert_axis(Axis(0)),
        )?;

        let probabilities = softmax(logits.view());
        let spread = entropy(&available_distribution(probabilities.view(), state));
        self.tune_alpha(spread, state.available_actions.len());

        Ok(match (loss1, loss2) {
            (Some(a), Some(b)) => Some(a.loss + b.loss),
            (a, b) => a.or(b).map(|r| r.loss),
        })
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
