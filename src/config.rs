//! Structured agent configuration.
//!
//! [`AgentConfig`] names the algorithm, exploration policy and approximator
//! and carries one key=value parameter string shared by every component.
//! Each key is routed to the component(s) that declare it; a key nobody
//! declares is rejected before anything is built.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::{RetryPolicy, AGENT_PARAMS};
use crate::algorithms::AlgorithmKind;
use crate::error::{PallasError, Result};
use crate::estimator::{ApproximatorKind, ESTIMATOR_PARAMS};
use crate::params::{ParamDef, ParamSet};
use crate::policy::PolicyKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    pub algorithm: AlgorithmKind,
    pub policy: PolicyKind,
    pub approximator: ApproximatorKind,
    /// Shared `key = value, ...` string
    pub params: String,
    pub retry: RetryPolicy,
    pub seed: u64,
}

/// `AgentConfig::params` split per component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentParams {
    pub algorithm: ParamSet,
    pub policy: ParamSet,
    pub estimator: ParamSet,
    pub memory: ParamSet,
    pub agent: ParamSet,
}

const NO_PARAMS: &[ParamDef] = &[];

impl AgentConfig {
    pub fn new(algorithm: AlgorithmKind, policy: PolicyKind, approximator: ApproximatorKind) -> Self {
        AgentConfig {
            algorithm,
            policy,
            approximator,
            ..AgentConfig::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: AgentConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Route every key of `params` to the components that declare it.
    pub fn component_params(&self) -> Result<ComponentParams> {
        let memory_defs = self.algorithm.memory().map_or(NO_PARAMS, |m| m.param_defs());
        let mut sets = ParamSet::split_for(
            "agent",
            &self.params,
            &[
                ("algorithm", self.algorithm.param_defs()),
                ("policy", self.policy.param_defs()),
                ("estimator", ESTIMATOR_PARAMS),
                ("memory", memory_defs),
                ("agent", AGENT_PARAMS),
            ],
        )?
        .into_iter();
        let mut next = |name: &str| {
            sets.next()
                .ok_or_else(|| PallasError::protocol("agent".to_string(), format!("missing {} parameters", name)))
        };
        Ok(ComponentParams {
            algorithm: next("algorithm")?,
            policy: next("policy")?,
            estimator: next("estimator")?,
            memory: next("memory")?,
            agent: next("agent")?,
        })
    }

    /// Reject combinations that cannot be built.
    pub fn validate(&self) -> Result<()> {
        if self.algorithm == AlgorithmKind::DuelingDqn && self.approximator.is_tabular() {
            return Err(PallasError::invalid_parameter(
                "approximator",
                "DuelingDqn needs a neural approximator",
            ));
        }
        if let ApproximatorKind::Neural { hidden_layers, .. } = &self.approximator {
            if hidden_layers.iter().any(|&width| width == 0) {
                return Err(PallasError::invalid_parameter("hidden_layers", "layer widths must be positive"));
            }
        }
        if let RetryPolicy::ForceValid { max_attempts: 0 } = self.retry {
            return Err(PallasError::invalid_parameter("retry", "ForceValid needs at least one attempt"));
        }
        self.component_params().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_with_defaults() {
        let config = AgentConfig::from_json(
            r#"{"algorithm": "Sarsa", "approximator": "Tabular", "params": "gamma = 0.5, epsilonMin = 0.05"}"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::Sarsa);
        assert_eq!(config.policy, PolicyKind::EpsilonGreedy);
        assert_eq!(config.retry, RetryPolicy::Reject);

        let params = config.component_params().unwrap();
        assert_eq!(params.algorithm.float("gamma"), Some(0.5));
        assert_eq!(params.policy.float("epsilonMin"), Some(0.05));
        assert!(params.estimator.is_empty());
    }

    #[test]
    fn routes_memory_and_agent_keys() {
        let mut config = AgentConfig::new(AlgorithmKind::Dqn, PolicyKind::Greedy, ApproximatorKind::default());
        config.params = "capacity = 64, batchSize = 8, rewardTau = 0.5".to_string();
        let params = config.component_params().unwrap();
        assert_eq!(params.memory.int("capacity"), Some(64));
        assert_eq!(params.estimator.int("batchSize"), Some(8));
        assert_eq!(params.agent.float("rewardTau"), Some(0.5));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_combinations() {
        let mut config = AgentConfig::default();
        config.params = "notAKey = 1".to_string();
        assert!(matches!(
            config.validate(),
            Err(PallasError::UnknownParameter { ref component, .. }) if component == "agent"
        ));

        // capacity belongs to replay memory, which QLearning does not use
        let config = AgentConfig {
            algorithm: AlgorithmKind::QLearning,
            params: "capacity = 10".to_string(),
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());

        let dueling = AgentConfig::new(AlgorithmKind::DuelingDqn, PolicyKind::Greedy, ApproximatorKind::Tabular);
        assert!(dueling.validate().is_err());
    }

    #[test]
    fn json_round_trip() {
        let config = AgentConfig {
            retry: RetryPolicy::ForceValid { max_attempts: 3 },
            seed: 9,
            ..AgentConfig::default()
        };
        let restored = AgentConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }
}
