use std::collections::BTreeSet;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::environment::{Environment, EnvironmentState, RewardSink};
use crate::error::{self, ActionError, PallasError};

const START_CITY: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    pub x: f32,
    pub y: f32,
}

impl City {
    pub fn distance_to(&self, other: &City) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Travelling salesman over cities placed uniformly in `[0, 10)²`.
///
/// The tour starts at city 0; action `a` travels to city `a + 1`. The state
/// holds every city's coordinates scaled by 1/10, in the first half of the
/// vector once visited and in the second half while still unvisited.
///
/// Every step but the last earns 0. Closing the tour earns 1 for a new or
/// tied shortest tour and `0.75·(1 − total/max)` otherwise, where the
/// shortest and longest tour lengths are running values that already include
/// the tour just closed.
#[derive(Debug, Clone)]
pub struct TspEnvironment {
    cities: Vec<City>,
    tour: Vec<usize>,
    previous_tour: Vec<usize>,
    total_distance: f32,
    min_distance: f32,
    max_distance: f32,
    shortest_tour: Option<Vec<usize>>,
    longest_tour: Option<Vec<usize>>,
}

impl TspEnvironment {
    /// `city_count` is raised to 2 if smaller.
    pub fn new(city_count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let cities = (0..city_count.max(2))
            .map(|_| City {
                x: 10.0 * rng.gen::<f32>(),
                y: 10.0 * rng.gen::<f32>(),
            })
            .collect();
        Self::from_cities(cities)
    }

    /// Tour over fixed cities; city 0 is the start. At least two are needed.
    pub fn with_cities(cities: Vec<City>) -> error::Result<Self> {
        if cities.len() < 2 {
            return Err(PallasError::invalid_parameter(
                "cities".to_string(),
                format!("a tour needs at least 2 cities, got {}", cities.len()),
            ));
        }
        Ok(Self::from_cities(cities))
    }

    fn from_cities(cities: Vec<City>) -> Self {
        TspEnvironment {
            cities,
            tour: vec![START_CITY],
            previous_tour: Vec::new(),
            total_distance: 0.0,
            min_distance: f32::MAX,
            max_distance: f32::MIN_POSITIVE,
            shortest_tour: None,
            longest_tour: None,
        }
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    /// Cities visited so far in this episode, starting with city 0
    pub fn tour(&self) -> &[usize] {
        &self.tour
    }

    pub fn previous_tour(&self) -> &[usize] {
        &self.previous_tour
    }

    /// Length travelled so far; includes the closing edge once terminal
    pub fn total_distance(&self) -> f32 {
        self.total_distance
    }

    pub fn min_distance(&self) -> Option<f32> {
        self.shortest_tour.as_ref().map(|_| self.min_distance)
    }

    pub fn max_distance(&self) -> Option<f32> {
        self.longest_tour.as_ref().map(|_| self.max_distance)
    }

    pub fn shortest_tour(&self) -> Option<&[usize]> {
        self.shortest_tour.as_deref()
    }

    fn leg(&self, from: usize, to: usize) -> f32 {
        self.cities[from].distance_to(&self.cities[to])
    }

    fn closing_reward(&mut self) -> f32 {
        if self.total_distance < self.min_distance {
            self.min_distance = self.total_distance;
            self.shortest_tour = Some(self.tour.clone());
        }
        if self.total_distance > self.max_distance {
            self.max_distance = self.total_distance;
            self.longest_tour = Some(self.tour.clone());
        }
        if self.total_distance == self.min_distance {
            1.0
        } else {
            0.75 * (1.0 - self.total_distance / self.max_distance)
        }
    }
}

impl Environment for TspEnvironment {
    fn state(&self) -> EnvironmentState {
        let n = self.cities.len();
        let mut features = Array1::zeros(4 * n);
        for (index, city) in self.cities.iter().enumerate() {
            let offset = if self.tour.contains(&index) { 0 } else { n };
            features[offset + 2 * index] = city.x / 10.0;
            features[offset + 2 * index + 1] = city.y / 10.0;
        }
        let available: BTreeSet<usize> = (0..n)
            .filter(|&city| city != START_CITY && !self.tour.contains(&city))
            .map(|city| city - 1)
            .collect();
        EnvironmentState::new(features, available)
    }

    fn action_count(&self) -> usize {
        self.cities.len() - 1
    }

    fn is_episodic(&self) -> bool {
        true
    }

    fn is_terminal_state(&self) -> bool {
        self.tour.len() == self.cities.len()
    }

    fn commit_action(&mut self, sink: &mut dyn RewardSink, action: usize) -> Result<(), ActionError> {
        if self.is_terminal_state() {
            return Err(ActionError::EnvironmentTerminal);
        }
        let city = action + 1;
        if city >= self.cities.len() || self.tour.contains(&city) {
            return Err(ActionError::NotAvailable { action });
        }
        let from = self.tour[self.tour.len() - 1];
        self.tour.push(city);
        self.total_distance += self.leg(from, city);

        if self.is_terminal_state() {
            self.total_distance += self.leg(city, START_CITY);
            let reward = self.closing_reward();
            sink.respond(reward);
        } else {
            sink.respond(0.0);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.previous_tour = std::mem::replace(&mut self.tour, vec![START_CITY]);
        self.total_distance = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Rewards(Vec<f32>);

    impl RewardSink for Rewards {
        fn respond(&mut self, reward: f32) {
            self.0.push(reward);
        }
    }

    fn square() -> TspEnvironment {
        TspEnvironment::with_cities(vec![
            City { x: 0.0, y: 0.0 },
            City { x: 0.0, y: 1.0 },
            City { x: 1.0, y: 1.0 },
            City { x: 1.0, y: 0.0 },
        ])
        .unwrap()
    }

    #[test]
    fn needs_two_cities() {
        assert!(TspEnvironment::with_cities(Vec::new()).is_err());
        assert!(TspEnvironment::with_cities(vec![City { x: 1.0, y: 1.0 }]).is_err());
        let pair = TspEnvironment::with_cities(vec![City { x: 0.0, y: 0.0 }, City { x: 3.0, y: 4.0 }]).unwrap();
        assert_eq!(pair.action_count(), 1);
        assert_eq!(pair.state().available_actions, BTreeSet::from([0]));
        assert_eq!(TspEnvironment::new(0, 1).action_count(), 1);
    }

    #[test]
    fn state_layout_tracks_visits() {
        let mut env = square();
        let state = env.state();
        assert_eq!(state.feature_len(), 16);
        assert_eq!(state.available_actions, BTreeSet::from([0, 1, 2]));
        assert_eq!(state.features[4 + 2], 0.0);

        env.commit_action(&mut Rewards::default(), 1).unwrap();
        let state = env.state();
        assert_eq!(state.available_actions, BTreeSet::from([0, 2]));
        // city 2 moved to the visited half
        assert_eq!(state.features[4], 0.1);
        assert_eq!(state.features[4 + 4], 0.0);
    }

    #[test]
    fn closing_tour_rewards_shortest() {
        let mut env = square();
        let mut rewards = Rewards::default();
        for action in [0, 1, 2] {
            env.commit_action(&mut rewards, action).unwrap();
        }
        assert!(env.is_terminal_state());
        assert_eq!(rewards.0, vec![0.0, 0.0, 1.0]);
        assert!((env.total_distance() - 4.0).abs() < 1e-6);
        assert_eq!(env.commit_action(&mut rewards, 0), Err(ActionError::EnvironmentTerminal));

        env.reset();
        assert_eq!(env.previous_tour(), &[0, 1, 2, 3]);
        let mut rewards = Rewards::default();
        for action in [1, 0, 2] {
            env.commit_action(&mut rewards, action).unwrap();
        }
        let total = 2.0 + 2.0 * 2f32.sqrt();
        assert!((env.total_distance() - total).abs() < 1e-5);
        assert_eq!(env.max_distance(), Some(env.total_distance()));
        assert!((rewards.0[2] - 0.0).abs() < 1e-6);
        assert_eq!(env.min_distance(), Some(4.0));
    }

    #[test]
    fn rejects_visited_city() {
        let mut env = square();
        let mut rewards = Rewards::default();
        env.commit_action(&mut rewards, 2).unwrap();
        assert_eq!(
            env.commit_action(&mut rewards, 2),
            Err(ActionError::NotAvailable { action: 2 })
        );
        assert_eq!(rewards.0.len(), 1);
    }
}
