//! Per-episode training statistics with bounded history.

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Recorded series, each capped at the tracker's history size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeHistory {
    pub rewards: VecDeque<f32>,
    pub lengths: VecDeque<usize>,
    pub losses: VecDeque<f32>,
    pub exploration_rates: VecDeque<f32>,
}

fn push_bounded<T>(series: &mut VecDeque<T>, value: T, limit: usize) {
    if series.len() >= limit {
        series.pop_front();
    }
    series.push_back(value);
}

fn tail_mean<'a, I>(series: I, window: usize) -> Option<f32>
where
    I: DoubleEndedIterator<Item = &'a f32> + ExactSizeIterator,
{
    let n = window.min(series.len());
    if n == 0 {
        return None;
    }
    Some(series.rev().take(n).sum::<f32>() / n as f32)
}

/// Tracks reward, episode length, training loss and exploration rate.
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    history: EpisodeHistory,
    history_size: usize,
    episode_reward: f32,
    episode_length: usize,
    episodes: usize,
    total_steps: usize,
}

impl MetricsTracker {
    pub fn new(history_size: usize) -> Self {
        MetricsTracker {
            history: EpisodeHistory::default(),
            history_size: history_size.max(1),
            episode_reward: 0.0,
            episode_length: 0,
            episodes: 0,
            total_steps: 0,
        }
    }

    pub fn start_episode(&mut self) {
        self.episode_reward = 0.0;
        self.episode_length = 0;
    }

    /// Record one committed action and its reward
    pub fn step(&mut self, reward: f32) {
        self.episode_reward += reward;
        self.episode_length += 1;
        self.total_steps += 1;
    }

    pub fn record_loss(&mut self, loss: f32) {
        push_bounded(&mut self.history.losses, loss, self.history_size);
    }

    pub fn record_exploration_rate(&mut self, rate: f32) {
        push_bounded(&mut self.history.exploration_rates, rate, self.history_size);
    }

    /// Close the running episode and return its cumulative reward
    pub fn end_episode(&mut self) -> f32 {
        push_bounded(&mut self.history.rewards, self.episode_reward, self.history_size);
        push_bounded(&mut self.history.lengths, self.episode_length, self.history_size);
        self.episodes += 1;
        self.episode_reward
    }

    pub fn history(&self) -> &EpisodeHistory {
        &self.history
    }

    pub fn episode_count(&self) -> usize {
        self.episodes
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn current_reward(&self) -> f32 {
        self.episode_reward
    }

    pub fn current_length(&self) -> usize {
        self.episode_length
    }

    pub fn avg_episode_reward(&self, window: usize) -> Option<f32> {
        tail_mean(self.history.rewards.iter(), window)
    }

    pub fn avg_loss(&self, window: usize) -> Option<f32> {
        tail_mean(self.history.losses.iter(), window)
    }

    pub fn avg_episode_length(&self, window: usize) -> Option<f32> {
        let n = window.min(self.history.lengths.len());
        if n == 0 {
            return None;
        }
        Some(self.history.lengths.iter().rev().take(n).sum::<usize>() as f32 / n as f32)
    }

    pub fn clear(&mut self) {
        *self = MetricsTracker::new(self.history_size);
    }

    /// Write the recorded history as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serde_json::to_string_pretty(&self.history)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let data = std::fs::read_to_string(path)?;
        self.history = serde_json::from_str(&data)?;
        Ok(())
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}
