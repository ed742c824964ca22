//! # Learning Algorithms Module
//!
//! A [`LearningAlgorithm`] decides how observed transitions become training
//! signal for its estimators. All algorithms share one interface so the
//! [`Agent`](crate::agent::Agent) drives them identically.
//!
//! ## Available Algorithms
//!
//! ### Value-based
//!
//! - **QLearning**: online TD toward `r + γ·max Q(s', ·)`
//! - **Dqn**: Q-learning with a target copy and uniform replay
//! - **DoubleDqn**: next action chosen by the live estimator, valued by the
//!   target, with prioritised replay
//! - **DuelingDqn**: DoubleDqn on a dueling value head
//! - **Sarsa**: on-policy TD toward the value of the action actually taken next
//!
//! ### Policy gradient
//!
//! - **ActorCritic**: one-step advantage from a state-value critic
//! - **Reinforce**: Monte Carlo returns with an optional running baseline
//! - **Ppo**: clipped probability-ratio updates over several epochs per episode
//! - **Ddpg**: actor trained on the advantage of a Q critic whose target
//!   values the next state at the actor's preferred action
//! - **SacDiscrete**: twin soft Q critics, entropy-regularised actor and an
//!   optionally tuned temperature
//!
//! ### Search
//!
//! - **Mcts**: episode returns train a value head; the search visit
//!   distribution trains the policy head
//!
//! Only next-state actions that are available take part in a max or argmax,
//! and a terminal transition's target is its reward.
//!
//! ## Example Usage
//!
//! ```rust
//! use pallas::algorithms::{build_algorithm, AlgorithmKind, AlgorithmSetup};
//! use pallas::estimator::{ApproximatorKind, EstimatorConfig};
//! use pallas::params::ParamSet;
//!
//! let setup = AlgorithmSetup {
//!     input_size: 4,
//!     action_count: 2,
//!     approximator: ApproximatorKind::Tabular,
//!     estimator: EstimatorConfig::default(),
//!     memory: ParamSet::empty("memory"),
//!     seed: 1,
//! };
//! let params = ParamSet::parse("algorithm", "gamma = 0.9", AlgorithmKind::QLearning.param_defs()).unwrap();
//! let algorithm = build_algorithm(AlgorithmKind::QLearning, &params, &setup).unwrap();
//! assert_eq!(algorithm.kind(), AlgorithmKind::QLearning);
//! ```

pub mod actor_critic;
pub mod ddpg;
pub mod mcts;
pub mod ppo;
pub mod reinforce;
pub mod sac;
pub mod sarsa;
pub mod value;

use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::activations::softmax;
use crate::environment::EnvironmentState;
use crate::error::{PallasError, Result};
use crate::estimator::{ApproximatorKind, EstimatorConfig, FunctionEstimator};
use crate::memory::MemoryKind;
use crate::params::{ParamDef, ParamSet, ParamType};
use crate::transition::Transition;

pub use actor_critic::ActorCritic;
pub use ddpg::{ActorQTarget, Ddpg};
pub use mcts::MctsLearning;
pub use ppo::Ppo;
pub use reinforce::Reinforce;
pub use sac::{SacDiscrete, SoftQTarget};
pub use sarsa::{Sarsa, SarsaTarget};
pub use value::{QTarget, ValueLearning};

/// Strategy that turns experience into estimator updates.
pub trait LearningAlgorithm: Send {
    fn kind(&self) -> AlgorithmKind;

    /// Values the exploration policy chooses from: action values for
    /// value-based kinds, action probabilities for policy kinds.
    fn action_values(&self, state: &EnvironmentState) -> Result<Array1<f32>>;

    /// Learn from one step. Returns the loss when a gradient step was taken.
    fn observe(&mut self, transition: Transition) -> Result<Option<f32>>;

    /// Called at every episode end, whether or not training follows.
    ///
    /// Anything tied to the episode that just ended is settled here so it
    /// cannot mix with the next one when `agentUpdateCycle > 1` defers
    /// training. Returns the loss when a gradient step was taken.
    fn episode_boundary(&mut self) -> Result<Option<f32>> {
        Ok(None)
    }

    /// Training point, reached every `agentUpdateCycle` episodes;
    /// episode-level algorithms train here on everything gathered since.
    fn end_episode(&mut self) -> Result<Option<f32>>;

    /// Apply any update still pending.
    fn flush(&mut self) -> Result<()>;

    /// The estimator whose output drives action selection.
    fn estimator(&self) -> &FunctionEstimator;

    /// Search statistics for the step about to be observed.
    fn set_visit_distribution(&mut self, _distribution: Array1<f32>) {}
}

/// Available learning algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AlgorithmKind {
    QLearning,
    #[default]
    Dqn,
    DoubleDqn,
    DuelingDqn,
    Sarsa,
    ActorCritic,
    Reinforce,
    Ppo,
    Mcts,
    Ddpg,
    SacDiscrete,
}

const VALUE_PARAMS: &[ParamDef] = &[
    ParamDef::new("gamma", ParamType::Float),
    ParamDef::new("useDoubleQ", ParamType::Bool),
];

const SARSA_PARAMS: &[ParamDef] = &[ParamDef::new("gamma", ParamType::Float)];

const ACTOR_CRITIC_PARAMS: &[ParamDef] = &[
    ParamDef::new("gamma", ParamType::Float),
    ParamDef::new("entropyCoefficient", ParamType::Float),
];

const REINFORCE_PARAMS: &[ParamDef] = &[
    ParamDef::new("gamma", ParamType::Float),
    ParamDef::new("entropyCoefficient", ParamType::Float),
    ParamDef::new("useBaseline", ParamType::Bool),
    ParamDef::new("baselineTau", ParamType::Float),
];

const PPO_PARAMS: &[ParamDef] = &[
    ParamDef::new("gamma", ParamType::Float),
    ParamDef::new("entropyCoefficient", ParamType::Float),
    ParamDef::new("ppoEpsilon", ParamType::Float),
    ParamDef::new("updateEpochs", ParamType::Int),
];

const MCTS_PARAMS: &[ParamDef] = &[ParamDef::new("gamma", ParamType::Float)];

const SAC_PARAMS: &[ParamDef] = &[
    ParamDef::new("gamma", ParamType::Float),
    ParamDef::new("softQAlpha", ParamType::Float),
    ParamDef::new("autoSoftAlpha", ParamType::Bool),
    ParamDef::new("alphaLearningRate", ParamType::Float),
];

impl AlgorithmKind {
    pub fn param_defs(&self) -> &'static [ParamDef] {
        match self {
            AlgorithmKind::QLearning | AlgorithmKind::Dqn => VALUE_PARAMS,
            AlgorithmKind::DoubleDqn | AlgorithmKind::DuelingDqn | AlgorithmKind::Sarsa => SARSA_PARAMS,
            AlgorithmKind::ActorCritic | AlgorithmKind::Ddpg => ACTOR_CRITIC_PARAMS,
            AlgorithmKind::Reinforce => REINFORCE_PARAMS,
            AlgorithmKind::Ppo => PPO_PARAMS,
            AlgorithmKind::Mcts => MCTS_PARAMS,
            AlgorithmKind::SacDiscrete => SAC_PARAMS,
        }
    }

    /// Replay memory the kind trains from, if any.
    pub fn memory(&self) -> Option<MemoryKind> {
        match self {
            AlgorithmKind::Dqn => Some(MemoryKind::Fifo),
            AlgorithmKind::DoubleDqn | AlgorithmKind::DuelingDqn => Some(MemoryKind::Priority),
            _ => None,
        }
    }

    /// Whether the kind's Q estimators carry a target copy.
    pub fn uses_target(&self) -> bool {
        matches!(
            self,
            AlgorithmKind::Dqn
                | AlgorithmKind::DoubleDqn
                | AlgorithmKind::DuelingDqn
                | AlgorithmKind::Ddpg
                | AlgorithmKind::SacDiscrete
        )
    }

    /// Discount used when `gamma` is not given.
    pub fn default_gamma(&self) -> f32 {
        match self {
            AlgorithmKind::Mcts => 1.0,
            _ => 0.99,
        }
    }
}

/// Everything an algorithm needs to create its estimators.
#[derive(Debug, Clone)]
pub struct AlgorithmSetup {
    pub input_size: usize,
    pub action_count: usize,
    pub approximator: ApproximatorKind,
    pub estimator: EstimatorConfig,
    pub memory: ParamSet,
    pub seed: u64,
}

impl AlgorithmSetup {
    fn estimator(&self, approximator: &ApproximatorKind, outputs: usize, rng: &mut StdRng, salt: u64) -> Result<FunctionEstimator> {
        let live = approximator.build(self.input_size, outputs, &self.estimator, rng)?;
        Ok(FunctionEstimator::new(live, self.estimator.clone()).with_seed(self.seed.wrapping_add(salt)))
    }
}

/// Create the estimators `kind` needs and wrap them in the algorithm.
pub fn build_algorithm(
    kind: AlgorithmKind,
    params: &ParamSet,
    setup: &AlgorithmSetup,
) -> Result<Box<dyn LearningAlgorithm>> {
    if setup.action_count == 0 {
        return Err(PallasError::invalid_parameter("action_count", "at least one action is required"));
    }
    let gamma = params.float_in("gamma", kind.default_gamma(), 0.0, 1.0)?;
    let mut rng = StdRng::seed_from_u64(setup.seed);
    let n = setup.action_count;

    let algorithm: Box<dyn LearningAlgorithm> = match kind {
        AlgorithmKind::QLearning | AlgorithmKind::Dqn | AlgorithmKind::DoubleDqn | AlgorithmKind::DuelingDqn => {
            let approximator = if kind == AlgorithmKind::DuelingDqn {
                dueling(&setup.approximator)?
            } else {
                setup.approximator.clone()
            };
            let mut estimator = setup.estimator(&approximator, n, &mut rng, 1)?;
            if kind.uses_target() {
                estimator = estimator.with_target();
            }
            if let Some(memory) = kind.memory() {
                estimator = estimator.with_memory(memory.build(&setup.memory)?);
            }
            let double = matches!(kind, AlgorithmKind::DoubleDqn | AlgorithmKind::DuelingDqn)
                || params.bool_or("useDoubleQ", false);
            Box::new(ValueLearning::new(kind, estimator, QTarget::new(gamma, double)))
        }
        AlgorithmKind::Sarsa => Box::new(Sarsa::new(setup.estimator(&setup.approximator, n, &mut rng, 1)?, gamma)),
        AlgorithmKind::ActorCritic => {
            let policy = setup.estimator(&setup.approximator, n, &mut rng, 1)?;
            let value = setup.estimator(&setup.approximator, 1, &mut rng, 2)?;
            Box::new(ActorCritic::new(policy, value, gamma, params.float_or("entropyCoefficient", 0.01)))
        }
        AlgorithmKind::Reinforce => {
            let policy = setup.estimator(&setup.approximator, n, &mut rng, 1)?;
            let mut algorithm = Reinforce::new(policy, gamma, params.float_or("entropyCoefficient", 0.01));
            if params.bool_or("useBaseline", false) {
                algorithm = algorithm.with_baseline(params.float_in("baselineTau", 0.9, 0.0, 1.0)?);
            }
            Box::new(algorithm)
        }
        AlgorithmKind::Ppo => {
            let policy = setup.estimator(&setup.approximator, n, &mut rng, 1)?;
            let value = setup.estimator(&setup.approximator, 1, &mut rng, 2)?;
            let epochs = params.usize_or("updateEpochs", 4)?;
            if epochs == 0 {
                return Err(PallasError::invalid_parameter("updateEpochs", "must be at least 1"));
            }
            Box::new(Ppo::new(
                policy,
                value,
                gamma,
                params.float_in("ppoEpsilon", 0.2, 0.0, 1.0)?,
                epochs,
                params.float_or("entropyCoefficient", 0.01),
            ))
        }
        AlgorithmKind::Mcts => {
            let policy = setup.estimator(&setup.approximator, n, &mut rng, 1)?;
            let value = setup.estimator(&setup.approximator, 1, &mut rng, 2)?;
            Box::new(MctsLearning::new(policy, value, gamma))
        }
        AlgorithmKind::Ddpg => {
            let actor = setup.estimator(&setup.approximator, n, &mut rng, 1)?;
            let critic = setup.estimator(&setup.approximator, n, &mut rng, 2)?.with_target();
            Box::new(Ddpg::new(actor, critic, gamma, params.float_or("entropyCoefficient", 0.01)))
        }
        AlgorithmKind::SacDiscrete => {
            let policy = setup.estimator(&setup.approximator, n, &mut rng, 1)?;
            let q1 = setup.estimator(&setup.approximator, n, &mut rng, 2)?.with_target();
            let q2 = setup.estimator(&setup.approximator, n, &mut rng, 3)?.with_target();
            let mut algorithm = SacDiscrete::new(policy, q1, q2, gamma, params.float_or("softQAlpha", 1.0))?;
            if params.bool_or("autoSoftAlpha", true) {
                algorithm = algorithm.with_alpha_tuning(params.float_or("alphaLearningRate", 0.001))?;
            }
            Box::new(algorithm)
        }
    };
    Ok(algorithm)
}

fn dueling(approximator: &ApproximatorKind) -> Result<ApproximatorKind> {
    match approximator {
        ApproximatorKind::Neural { .. } => {
            let mut kind = approximator.clone();
            if let ApproximatorKind::Neural { dueling, .. } = &mut kind {
                *dueling = true;
            }
            Ok(kind)
        }
        ApproximatorKind::Tabular => Err(PallasError::invalid_parameter(
            "approximator",
            "a dueling head needs a neural approximator",
        )),
    }
}

/// dL/d(logits) for `L = −scale·log π(action) − β·H(π)` with `π = softmax(logits)`.
pub(crate) fn policy_gradient(logits: ArrayView1<f32>, action: usize, scale: f32, entropy_coefficient: f32) -> Array1<f32> {
    let probs = softmax(logits);
    let entropy: f32 = probs.iter().filter(|&&p| p > 0.0).map(|&p| -p * p.ln()).sum();
    Array1::from_shape_fn(probs.len(), |i| {
        let p = probs[i];
        let onehot = if i == action { 1.0 } else { 0.0 };
        let log_p = if p > 0.0 { p.ln() } else { 0.0 };
        -scale * (onehot - p) + entropy_coefficient * p * (log_p + entropy)
    })
}
