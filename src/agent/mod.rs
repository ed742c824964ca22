//! # Agent
//!
//! The [`Agent`] drives one environment through the episode state machine:
//!
//! ```text
//! Created -start-> Idle -start_episode-> EpisodeStarted
//!     { -new_time_step-> TimeStepBegun -act-> ActionCommitted }*
//!     -end_episode-> EpisodeEnded -start_episode-> ...
//! any started phase -stop-> Stopped
//! ```
//!
//! Each `act` reads the environment state, asks the algorithm for action
//! values, lets the exploration policy pick among the available actions,
//! commits the action, collects the single reward the environment emits and
//! hands the resulting [`Transition`] to the algorithm. Calls made in the
//! wrong phase fail with [`PallasError::Protocol`].
//!
//! ## Example
//!
//! ```rust
//! use pallas::agent::AgentFactory;
//! use pallas::config::AgentConfig;
//! use pallas::environments::TspEnvironment;
//!
//! let config = AgentConfig::from_json(
//!     r#"{"algorithm": "QLearning", "policy": "EpsilonGreedy", "approximator": "Tabular", "params": "gamma = 1.0"}"#,
//! ).unwrap();
//! let mut agent = AgentFactory::build(&config, TspEnvironment::new(5, 7)).unwrap();
//! agent.start().unwrap();
//! let summary = agent.run_episode(100).unwrap();
//! assert_eq!(summary.steps, 4);
//! agent.stop().unwrap();
//! ```

mod factory;

pub use factory::{AgentBuilder, AgentFactory};

use std::collections::BTreeSet;

use log::{debug, info, trace, warn};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::algorithms::LearningAlgorithm;
use crate::environment::{Environment, EnvironmentState, EpisodeObserver, RewardSlot};
use crate::error::{ActionError, PallasError, Result};
use crate::metrics::MetricsTracker;
use crate::params::{ParamDef, ParamSet, ParamType};
use crate::policy::{greedy_action, ExplorationPolicy};
use crate::transition::Transition;

pub const AGENT_PARAMS: &[ParamDef] = &[
    ParamDef::new("agentUpdateCycle", ParamType::Int),
    ParamDef::new("rewardTau", ParamType::Float),
];

/// Where the agent is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Created,
    Idle,
    EpisodeStarted,
    TimeStepBegun,
    ActionCommitted,
    EpisodeEnded,
    Stopped,
}

/// What to do when the environment rejects a chosen action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RetryPolicy {
    /// Report the rejection to the caller
    #[default]
    Reject,
    /// Drop the rejected action and commit the best remaining one, up to
    /// `max_attempts` times
    ForceValid { max_attempts: usize },
}

/// Result of one `act` call
#[derive(Debug, Clone, PartialEq)]
pub enum ActOutcome {
    Committed { action: usize, reward: f32 },
    /// The environment was already terminal; the episode has been closed
    EpisodeClosed(EpisodeSummary),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub episode_id: usize,
    pub steps: usize,
    pub reward: f32,
    pub loss: Option<f32>,
}

/// Agent-level settings parsed from the shared parameter string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSettings {
    /// Episodes between `end_episode` training calls
    pub update_cycle: usize,
    /// Smoothing of the running reward average for continuing tasks
    pub reward_tau: f32,
    pub retry: RetryPolicy,
}

impl AgentSettings {
    pub fn from_params(params: &ParamSet, episodic: bool, retry: RetryPolicy) -> Result<Self> {
        let update_cycle = params.usize_or("agentUpdateCycle", if episodic { 1 } else { 10 })?;
        if update_cycle == 0 {
            return Err(PallasError::invalid_parameter("agentUpdateCycle", "must be at least 1"));
        }
        Ok(AgentSettings {
            update_cycle,
            reward_tau: params.float_in("rewardTau", 0.9, 0.0, 1.0)?,
            retry,
        })
    }
}

/// Learning agent bound to one environment.
pub struct Agent<E: Environment> {
    environment: E,
    algorithm: Box<dyn LearningAlgorithm>,
    policy: Box<dyn ExplorationPolicy>,
    settings: AgentSettings,
    rng: StdRng,
    phase: AgentPhase,
    learning: bool,
    reward_slot: RewardSlot,
    episode_id: usize,
    time_step: usize,
    episodes_since_update: usize,
    average_reward: Option<f32>,
    episode_rewards: Vec<f32>,
    visited: Vec<(EnvironmentState, usize)>,
    observers: Vec<Box<dyn EpisodeObserver>>,
    metrics: MetricsTracker,
}

enum Selection {
    Explore,
    Greedy,
}

impl<E: Environment> Agent<E> {
    pub fn new(
        environment: E,
        algorithm: Box<dyn LearningAlgorithm>,
        policy: Box<dyn ExplorationPolicy>,
        settings: AgentSettings,
        seed: u64,
    ) -> Self {
        Agent {
            environment,
            algorithm,
            policy,
            settings,
            rng: StdRng::seed_from_u64(seed),
            phase: AgentPhase::Created,
            learning: true,
            reward_slot: RewardSlot::default(),
            episode_id: 0,
            time_step: 0,
            episodes_since_update: 0,
            average_reward: None,
            episode_rewards: Vec::new(),
            visited: Vec::new(),
            observers: Vec::new(),
            metrics: MetricsTracker::default(),
        }
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut E {
        &mut self.environment
    }

    pub fn algorithm(&self) -> &dyn LearningAlgorithm {
        self.algorithm.as_ref()
    }

    pub fn policy(&self) -> &dyn ExplorationPolicy {
        self.policy.as_ref()
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn episode_id(&self) -> usize {
        self.episode_id
    }

    pub fn time_step(&self) -> usize {
        self.time_step
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    pub fn enable_learning(&mut self) {
        self.learning = true;
    }

    pub fn disable_learning(&mut self) {
        self.learning = false;
    }

    pub fn add_observer(&mut self, observer: Box<dyn EpisodeObserver>) {
        self.observers.push(observer);
    }

    fn expect_phase(&self, operation: &str, allowed: &[AgentPhase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(PallasError::protocol(
                "agent".to_string(),
                format!("{} is not allowed in phase {:?}", operation, self.phase),
            ))
        }
    }

    /// Check the environment against the estimator and become ready.
    pub fn start(&mut self) -> Result<()> {
        self.expect_phase("start", &[AgentPhase::Created])?;
        let estimator = self.algorithm.estimator();
        let state = self.environment.state();
        if state.feature_len() != estimator.input_size() {
            return Err(PallasError::dimension_mismatch(
                format!("{} features for the estimator", estimator.input_size()),
                format!("{} from the environment", state.feature_len()),
            ));
        }
        let actions = estimator.output_size();
        if actions == 0 {
            return Err(PallasError::invalid_parameter("action_count", "at least one action is required"));
        }
        if let Some(&highest) = state.available_actions.iter().next_back() {
            if highest >= actions {
                return Err(PallasError::dimension_mismatch(
                    format!("actions below {}", actions),
                    format!("available action {}", highest),
                ));
            }
        }
        info!(
            "Agent started: algorithm={:?}, policy={:?}, inputs={}, actions={}, episodic={}",
            self.algorithm.kind(),
            self.policy.kind(),
            estimator.input_size(),
            actions,
            self.environment.is_episodic()
        );
        self.phase = AgentPhase::Idle;
        Ok(())
    }

    pub fn start_episode(&mut self) -> Result<()> {
        self.expect_phase("start_episode", &[AgentPhase::Idle, AgentPhase::EpisodeEnded])?;
        self.environment.reset();
        self.episode_id += 1;
        self.time_step = 0;
        self.episode_rewards.clear();
        self.visited.clear();
        self.metrics.start_episode();
        self.phase = AgentPhase::EpisodeStarted;
        Ok(())
    }

    pub fn new_time_step(&mut self) -> Result<()> {
        self.expect_phase(
            "new_time_step",
            &[AgentPhase::EpisodeStarted, AgentPhase::ActionCommitted],
        )?;
        self.time_step += 1;
        self.phase = AgentPhase::TimeStepBegun;
        Ok(())
    }

    /// Choose with the exploration policy, commit, and learn from the step.
    pub fn act(&mut self) -> Result<ActOutcome> {
        self.step(Selection::Explore)
    }

    /// Commit the greedy action without exploring.
    pub fn act_greedy(&mut self) -> Result<ActOutcome> {
        self.step(Selection::Greedy)
    }

    fn step(&mut self, selection: Selection) -> Result<ActOutcome> {
        self.expect_phase("act", &[AgentPhase::TimeStepBegun])?;
        if self.environment.is_terminal_state() {
            return Ok(ActOutcome::EpisodeClosed(self.end_episode()?));
        }

        let state = self.environment.state().stamped(self.episode_id, self.time_step);
        state.validate(false)?;
        let values = self.algorithm.action_values(&state).map_err(diverged)?;
        let chosen = match selection {
            Selection::Explore => {
                let action = self.policy.select(values.view(), &state.available_actions, &mut self.rng)?;
                if let Some(distribution) = self.policy.visit_distribution(values.len()) {
                    self.algorithm.set_visit_distribution(distribution);
                }
                action
            }
            Selection::Greedy => self.policy.greedy(values.view(), &state.available_actions)?,
        };
        trace!(
            "episode {} step {}: action {} from {:?}",
            self.episode_id,
            self.time_step,
            chosen,
            values
        );

        let (action, reward) = self.commit(chosen, &values, &state.available_actions)?;
        self.episode_rewards.push(reward);
        self.metrics.step(reward);
        self.visited.push((state.clone(), action));

        let terminal = self.environment.is_terminal_state();
        let next_state = self.environment.state().stamped(self.episode_id, self.time_step + 1);
        next_state.validate(terminal)?;

        if self.learning {
            let shaped = self.shape_reward(reward);
            let transition = Transition::new(state, action, shaped, next_state, terminal);
            if let Some(loss) = self.algorithm.observe(transition).map_err(diverged)? {
                debug!("episode {} step {}: loss {:.6}", self.episode_id, self.time_step, loss);
                self.metrics.record_loss(loss);
            }
        }
        self.phase = AgentPhase::ActionCommitted;
        Ok(ActOutcome::Committed { action, reward })
    }

    /// Commit `action`, falling back per the retry policy on rejection.
    fn commit(&mut self, action: usize, values: &Array1<f32>, available: &BTreeSet<usize>) -> Result<(usize, f32)> {
        let mut candidates = available.clone();
        let mut action = action;
        let mut attempts = 0;
        loop {
            self.reward_slot.clear();
            match self.environment.commit_action(&mut self.reward_slot, action) {
                Ok(()) => return Ok((action, self.reward_slot.take()?)),
                Err(ActionError::NotAvailable { action: rejected }) => {
                    let max_attempts = match self.settings.retry {
                        RetryPolicy::ForceValid { max_attempts } => max_attempts,
                        RetryPolicy::Reject => 0,
                    };
                    candidates.remove(&rejected);
                    if attempts >= max_attempts || candidates.is_empty() {
                        return Err(ActionError::NotAvailable { action: rejected }.into());
                    }
                    attempts += 1;
                    action = greedy_action(values.view(), &candidates)?;
                    warn!(
                        "environment rejected action {}; forcing action {} (attempt {}/{})",
                        rejected, action, attempts, max_attempts
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Continuing tasks learn from the reward relative to its running mean.
    fn shape_reward(&mut self, reward: f32) -> f32 {
        if self.environment.is_episodic() {
            return reward;
        }
        let tau = self.settings.reward_tau;
        let average = match self.average_reward {
            Some(average) => tau * average + (1.0 - tau) * reward,
            None => reward,
        };
        self.average_reward = Some(average);
        reward - average
    }

    pub fn end_episode(&mut self) -> Result<EpisodeSummary> {
        self.expect_phase(
            "end_episode",
            &[
                AgentPhase::EpisodeStarted,
                AgentPhase::TimeStepBegun,
                AgentPhase::ActionCommitted,
            ],
        )?;

        let mut returns = self.episode_rewards.clone();
        for i in (0..returns.len().saturating_sub(1)).rev() {
            returns[i] += returns[i + 1];
        }
        self.policy.end_episode(&returns);
        if let Some(rate) = self.policy.exploration_rate() {
            self.metrics.record_exploration_rate(rate);
        }

        let mut loss = None;
        if self.learning {
            loss = self.algorithm.episode_boundary().map_err(diverged)?;
            self.episodes_since_update += 1;
            if self.episodes_since_update >= self.settings.update_cycle {
                self.episodes_since_update = 0;
                loss = self.algorithm.end_episode().map_err(diverged)?.or(loss);
            }
            if let Some(loss) = loss {
                self.metrics.record_loss(loss);
            }
        }

        for observer in self.observers.iter_mut() {
            observer.on_episode_end(self.episode_id, &self.visited);
        }

        let reward = self.metrics.end_episode();
        let summary = EpisodeSummary {
            episode_id: self.episode_id,
            steps: self.episode_rewards.len(),
            reward,
            loss,
        };
        info!(
            "Episode {} finished: steps={}, reward={:.4}{}",
            summary.episode_id,
            summary.steps,
            summary.reward,
            self.policy
                .exploration_rate()
                .map(|r| format!(", exploration={:.4}", r))
                .unwrap_or_default()
        );
        self.phase = AgentPhase::EpisodeEnded;
        Ok(summary)
    }

    /// Close any open episode and apply pending updates.
    pub fn stop(&mut self) -> Result<()> {
        self.expect_phase(
            "stop",
            &[
                AgentPhase::Idle,
                AgentPhase::EpisodeStarted,
                AgentPhase::TimeStepBegun,
                AgentPhase::ActionCommitted,
                AgentPhase::EpisodeEnded,
            ],
        )?;
        if matches!(
            self.phase,
            AgentPhase::EpisodeStarted | AgentPhase::TimeStepBegun | AgentPhase::ActionCommitted
        ) {
            self.end_episode()?;
        }
        if self.learning {
            self.algorithm.flush()?;
        }
        info!(
            "Agent stopped after {} episodes, {} steps",
            self.metrics.episode_count(),
            self.metrics.total_steps()
        );
        self.phase = AgentPhase::Stopped;
        Ok(())
    }

    /// Run one episode of at most `max_steps` actions.
    pub fn run_episode(&mut self, max_steps: usize) -> Result<EpisodeSummary> {
        self.start_episode()?;
        let mut steps = 0;
        loop {
            if steps >= max_steps {
                return self.end_episode();
            }
            self.new_time_step()?;
            if let ActOutcome::EpisodeClosed(summary) = self.act()? {
                return Ok(summary);
            }
            steps += 1;
        }
    }
}

/// Numerical failures inside the estimator surface as action outcomes.
fn diverged(err: PallasError) -> PallasError {
    match err {
        PallasError::NumericalError(msg) => ActionError::EstimatorDivergence(msg).into(),
        other => other,
    }
}
