use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentState;

/// One unit of learning: the outcome of committing `action` in `state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: EnvironmentState,
    pub action: usize,
    pub reward: f32,
    pub next_state: EnvironmentState,
    pub terminal: bool,
}

impl Transition {
    pub fn new(
        state: EnvironmentState,
        action: usize,
        reward: f32,
        next_state: EnvironmentState,
        terminal: bool,
    ) -> Self {
        Transition {
            state,
            action,
            reward,
            next_state,
            terminal,
        }
    }
}

/// Transitions in the order they happened, possibly spanning several
/// episodes when training is deferred.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    transitions: Vec<Transition>,
    /// Lengths at which an episode was closed, ascending
    #[serde(default)]
    episode_ends: Vec<usize>,
}

impl Trajectory {
    pub fn new() -> Self {
        Trajectory::default()
    }

    pub fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Close the running episode after the last pushed transition.
    ///
    /// Returns never flow across a closed boundary, even when the last step
    /// was cut short rather than terminal.
    pub fn close_episode(&mut self) {
        let len = self.transitions.len();
        if len > 0 && self.episode_ends.last() != Some(&len) {
            self.episode_ends.push(len);
        }
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
        self.episode_ends.clear();
    }

    pub fn total_reward(&self) -> f32 {
        self.transitions.iter().map(|t| t.reward).sum()
    }

    /// `G_t = r_t + gamma * G_{t+1}`, with `G` reset after a terminal step
    /// and at every closed episode boundary.
    pub fn discounted_returns(&self, gamma: f32) -> Vec<f32> {
        let mut returns = vec![0.0; self.transitions.len()];
        let mut running = 0.0;
        for (i, transition) in self.transitions.iter().enumerate().rev() {
            if transition.terminal || self.episode_ends.binary_search(&(i + 1)).is_ok() {
                running = 0.0;
            }
            running = transition.reward + gamma * running;
            returns[i] = running;
        }
        returns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::BTreeSet;

    fn step(reward: f32, terminal: bool) -> Transition {
        let state = EnvironmentState::new(array![0.0], BTreeSet::from([0]));
        Transition::new(state.clone(), 0, reward, state, terminal)
    }

    #[test]
    fn test_discounted_returns() {
        let mut trajectory = Trajectory::new();
        trajectory.push(step(1.0, false));
        trajectory.push(step(0.0, false));
        trajectory.push(step(2.0, true));

        let returns = trajectory.discounted_returns(0.5);
        assert!((returns[2] - 2.0).abs() < 1e-6);
        assert!((returns[1] - 1.0).abs() < 1e-6);
        assert!((returns[0] - 1.5).abs() < 1e-6);
        assert!((trajectory.total_reward() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_returns_stop_at_truncated_episode_end() {
        let mut trajectory = Trajectory::new();
        trajectory.push(step(1.0, false));
        trajectory.push(step(1.0, false));
        trajectory.close_episode();
        trajectory.close_episode();
        trajectory.push(step(-10.0, true));

        let returns = trajectory.discounted_returns(1.0);
        assert_eq!(returns, vec![2.0, 1.0, -10.0]);

        trajectory.clear();
        trajectory.push(step(1.0, false));
        trajectory.push(step(1.0, false));
        assert_eq!(trajectory.discounted_returns(1.0), vec![2.0, 1.0]);
    }
}
