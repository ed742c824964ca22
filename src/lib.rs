//! # Pallas - Agent/Environment Reinforcement Learning Core
//!
//! Pallas connects an [`Environment`](environment::Environment) to a learning
//! agent built from three interchangeable parts:
//!
//! - a [`FunctionEstimator`](estimator::FunctionEstimator) holding the
//!   trainable approximator (dense network or table), an optional target copy
//!   and optional replay memory
//! - an [`ExplorationPolicy`](policy::ExplorationPolicy) that picks an action
//!   among the available ones
//! - a [`LearningAlgorithm`](algorithms::LearningAlgorithm) that turns
//!   transitions into estimator updates
//!
//! Each part is chosen at construction time from an enum and configured with a
//! shared `key = value` string.
//!
//! ## Quick Start
//!
//! ```rust
//! use pallas::agent::AgentBuilder;
//! use pallas::algorithms::AlgorithmKind;
//! use pallas::environments::TspEnvironment;
//! use pallas::estimator::ApproximatorKind;
//! use pallas::policy::PolicyKind;
//!
//! let mut agent = AgentBuilder::new()
//!     .algorithm(AlgorithmKind::QLearning)
//!     .policy(PolicyKind::EpsilonGreedy)
//!     .approximator(ApproximatorKind::Tabular)
//!     .params("gamma = 1.0, epsilonDecayRate = 0.99, learningRate = 0.1")
//!     .seed(42)
//!     .build(TspEnvironment::new(5, 42))
//!     .unwrap();
//!
//! agent.start().unwrap();
//! for _ in 0..10 {
//!     agent.run_episode(10).unwrap();
//! }
//! agent.stop().unwrap();
//! assert_eq!(agent.environment().tour().len(), 5);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions and softmax
//! - [`agent`] - The agent state machine, builder and retry policy
//! - [`algorithms`] - Q-learning family, SARSA, policy gradient, PPO, MCTS
//! - [`config`] - JSON agent configuration
//! - [`environment`] - Environment contract and states
//! - [`environments`] - TSP and maze demonstration environments
//! - [`error`] - Error types and result handling
//! - [`estimator`] - Function estimators, approximators, parameter snapshots
//! - [`layers`] - Dense layers
//! - [`loss`] - Regression losses
//! - [`memory`] - FIFO and prioritised replay memory
//! - [`metrics`] - Episode statistics
//! - [`network`] - Feed-forward network
//! - [`optimizer`] - SGD, Adam, RMSProp
//! - [`params`] - `key = value` parameter parsing
//! - [`policy`] - Exploration policies
//! - [`transition`] - Transitions and trajectories

pub mod activations;
pub mod agent;
pub mod algorithms;
pub mod config;
pub mod environment;
pub mod environments;
pub mod error;
pub mod estimator;
pub mod layers;
pub mod loss;
pub mod memory;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod params;
pub mod policy;
pub mod transition;

#[cfg(test)]
mod tests;
