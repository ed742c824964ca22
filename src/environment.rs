//! # Environment contract
//!
//! Every task an [`Agent`](crate::agent::Agent) can drive implements
//! [`Environment`]. The agent reads an [`EnvironmentState`], picks one of its
//! available actions and commits it; the environment applies the action and
//! delivers exactly one scalar reward through the [`RewardSink`] it is handed.

use std::collections::BTreeSet;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{ActionError, PallasError, Result};

/// Immutable snapshot of what the agent can observe.
///
/// `available_actions` is a `BTreeSet` so iteration is always in ascending
/// action order; greedy tie-breaking depends on that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub features: Array1<f32>,
    pub available_actions: BTreeSet<usize>,
    pub episode_id: usize,
    pub time_step: usize,
}

impl EnvironmentState {
    pub fn new(features: Array1<f32>, available_actions: BTreeSet<usize>) -> Self {
        EnvironmentState {
            features,
            available_actions,
            episode_id: 0,
            time_step: 0,
        }
    }

    /// Copy of this state carrying the agent's episode and step counters.
    pub fn stamped(mut self, episode_id: usize, time_step: usize) -> Self {
        self.episode_id = episode_id;
        self.time_step = time_step;
        self
    }

    pub fn feature_len(&self) -> usize {
        self.features.len()
    }

    pub fn is_available(&self, action: usize) -> bool {
        self.available_actions.contains(&action)
    }

    /// Checks that a non-terminal state offers at least one action.
    pub fn validate(&self, terminal: bool) -> Result<()> {
        if !terminal && self.available_actions.is_empty() {
            return Err(PallasError::protocol(
                "environment",
                "non-terminal state has no available actions",
            ));
        }
        Ok(())
    }
}

/// Receiver of the reward emitted after each committed action.
pub trait RewardSink {
    fn respond(&mut self, reward: f32);
}

/// A task the agent interacts with.
pub trait Environment {
    /// Current observable state. Must not mutate the environment.
    fn state(&self) -> EnvironmentState;

    /// Size of the action space; every available action is below it.
    fn action_count(&self) -> usize;

    /// Whether the task terminates on its own.
    fn is_episodic(&self) -> bool;

    /// True exactly when no further action is legal in this episode.
    fn is_terminal_state(&self) -> bool;

    /// Apply `action` and call `sink.respond` once with the resulting reward.
    ///
    /// The state returned by [`Environment::state`] must reflect the action
    /// before this returns.
    fn commit_action(
        &mut self,
        sink: &mut dyn RewardSink,
        action: usize,
    ) -> std::result::Result<(), ActionError>;

    /// Prepare a new episode. Continuing tasks may leave this empty.
    fn reset(&mut self) {}
}

/// Observer receiving the visited state/action pairs after each episode.
///
/// Purely a side channel for display; nothing it records flows back into
/// learning.
pub trait EpisodeObserver {
    fn on_episode_end(&mut self, episode_id: usize, steps: &[(EnvironmentState, usize)]);
}

/// Captures the single reward an environment emits for one action.
#[derive(Debug, Default)]
pub(crate) struct RewardSlot {
    reward: Option<f32>,
    deliveries: usize,
}

impl RewardSlot {
    pub(crate) fn clear(&mut self) {
        self.reward = None;
        self.deliveries = 0;
    }

    /// The delivered reward; fails unless exactly one was delivered.
    pub(crate) fn take(&mut self) -> Result<f32> {
        let deliveries = self.deliveries;
        let reward = self.reward.take();
        self.deliveries = 0;
        match (deliveries, reward) {
            (1, Some(reward)) => Ok(reward),
            (0, _) => Err(PallasError::protocol(
                "environment",
                "commit_action returned without delivering a reward",
            )),
            (n, _) => Err(PallasError::protocol(
                "environment".to_string(),
                format!("expected one reward per action, got {}", n),
            )),
        }
    }
}

impl RewardSink for RewardSlot {
    fn respond(&mut self, reward: f32) {
        self.reward = Some(reward);
        self.deliveries += 1;
    }
}
