use crate::algorithms::{build_algorithm, AlgorithmKind, AlgorithmSetup};
use crate::config::AgentConfig;
use crate::environment::Environment;
use crate::error::Result;
use crate::estimator::{ApproximatorKind, EstimatorConfig};
use crate::policy::PolicyKind;

use super::{Agent, AgentSettings, RetryPolicy};

/// Builder for [`Agent`]
///
/// ```rust
/// use pallas::agent::AgentBuilder;
/// use pallas::algorithms::AlgorithmKind;
/// use pallas::environments::MazeEnvironment;
/// use pallas::estimator::ApproximatorKind;
///
/// let agent = AgentBuilder::new()
///     .algorithm(AlgorithmKind::Sarsa)
///     .approximator(ApproximatorKind::Tabular)
///     .params("gamma = 0.9, epsilonInitial = 0.3")
///     .seed(3)
///     .build(MazeEnvironment::new(11, 3))
///     .unwrap();
/// assert_eq!(agent.settings().update_cycle, 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AgentBuilder {
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn new() -> Self {
        AgentBuilder::default()
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        AgentBuilder { config: config.clone() }
    }

    pub fn algorithm(mut self, kind: AlgorithmKind) -> Self {
        self.config.algorithm = kind;
        self
    }

    pub fn policy(mut self, kind: PolicyKind) -> Self {
        self.config.policy = kind;
        self
    }

    pub fn approximator(mut self, kind: ApproximatorKind) -> Self {
        self.config.approximator = kind;
        self
    }

    pub fn params(mut self, params: &str) -> Self {
        self.config.params = params.to_string();
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Build the estimators, algorithm and policy sized for `environment`.
    pub fn build<E: Environment>(self, environment: E) -> Result<Agent<E>> {
        let config = self.config;
        config.validate()?;
        let params = config.component_params()?;

        let setup = AlgorithmSetup {
            input_size: environment.state().feature_len(),
            action_count: environment.action_count(),
            approximator: config.approximator.clone(),
            estimator: EstimatorConfig::from_params(&params.estimator)?,
            memory: params.memory,
            seed: config.seed,
        };
        let algorithm = build_algorithm(config.algorithm, &params.algorithm, &setup)?;
        let policy = config.policy.build(&params.policy)?;
        let settings = AgentSettings::from_params(&params.agent, environment.is_episodic(), config.retry)?;
        Ok(Agent::new(environment, algorithm, policy, settings, config.seed))
    }
}

/// Builds agents straight from an [`AgentConfig`].
pub struct AgentFactory;

impl AgentFactory {
    pub fn build<E: Environment>(config: &AgentConfig, environment: E) -> Result<Agent<E>> {
        AgentBuilder::from_config(config).build(environment)
    }
}
