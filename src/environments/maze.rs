use std::collections::{BTreeSet, VecDeque};

use log::debug;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::environment::{Environment, EnvironmentState, RewardSink};
use crate::error::ActionError;

/// Actions remembered in the state vector
pub const HISTORY_LENGTH: usize = 12;

/// A visit more than this many steps after the previous one restarts the
/// cell's visit count.
const VISIT_MEMORY: u64 = 100;

const DIRECTIONS: usize = 4;

fn opposite(direction: usize) -> usize {
    direction ^ 1
}

#[derive(Debug, Clone, Default)]
struct Cell {
    open: [bool; DIRECTIONS],
    visits: u32,
    last_step: u64,
}

impl Cell {
    fn open_sides(&self) -> usize {
        self.open.iter().filter(|&&open| open).count()
    }
}

/// Continuing walk through a maze carved by randomised depth-first search.
///
/// Actions `0..4` move `x − 1`, `x + 1`, `y − 1`, `y + 1` and are available
/// when that wall is open. The state holds the last [`HISTORY_LENGTH`]
/// actions one-hot encoded as `−1`, followed by four flags that are `−1`
/// where the current cell is open.
///
/// Entering a dead end earns 0. Any other cell earns
/// `(1 − 1/max(1, d))·visits⁻³` with `d` the distance from the centre, so
/// moving outward into fresh cells pays most. Reaching the border carves a
/// new maze and restarts at the centre.
#[derive(Debug, Clone)]
pub struct MazeEnvironment {
    size: usize,
    cells: Vec<Cell>,
    position: (usize, usize),
    history: VecDeque<Option<usize>>,
    step: u64,
    generations: usize,
    rng: StdRng,
}

impl MazeEnvironment {
    /// `size` is raised to 3 if smaller.
    pub fn new(size: usize, seed: u64) -> Self {
        let size = size.max(3);
        let mut maze = MazeEnvironment {
            size,
            cells: Vec::new(),
            position: (size / 2, size / 2),
            history: VecDeque::with_capacity(HISTORY_LENGTH),
            step: 0,
            generations: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        maze.regenerate();
        maze
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn position(&self) -> (usize, usize) {
        self.position
    }

    /// Number of mazes carved so far, the initial one included
    pub fn generations(&self) -> usize {
        self.generations
    }

    pub fn is_open(&self, x: usize, y: usize, direction: usize) -> bool {
        direction < DIRECTIONS && self.cells[self.index(x, y)].open[direction]
    }

    /// Whether the agent stands in a cell with exactly one open side.
    pub fn is_dead_end(&self) -> bool {
        let (x, y) = self.position;
        self.cell_is_dead_end(x, y)
    }

    pub fn cell_is_dead_end(&self, x: usize, y: usize) -> bool {
        self.cells[self.index(x, y)].open_sides() == 1
    }

    fn index(&self, x: usize, y: usize) -> usize {
        x * self.size + y
    }

    fn neighbour(&self, (x, y): (usize, usize), direction: usize) -> Option<(usize, usize)> {
        match direction {
            0 if x > 0 => Some((x - 1, y)),
            1 if x + 1 < self.size => Some((x + 1, y)),
            2 if y > 0 => Some((x, y - 1)),
            3 if y + 1 < self.size => Some((x, y + 1)),
            _ => None,
        }
    }

    fn carve(&mut self) {
        self.cells = vec![Cell::default(); self.size * self.size];
        let mut carved = vec![false; self.cells.len()];
        let mut stack = vec![(0, 0)];
        carved[0] = true;
        while let Some(&cell) = stack.last() {
            let mut directions: Vec<usize> = (0..DIRECTIONS)
                .filter(|&d| {
                    self.neighbour(cell, d)
                        .map_or(false, |(nx, ny)| !carved[self.index(nx, ny)])
                })
                .collect();
            directions.shuffle(&mut self.rng);
            match directions.first() {
                Some(&direction) => {
                    if let Some(next) = self.neighbour(cell, direction) {
                        let from = self.index(cell.0, cell.1);
                        let to = self.index(next.0, next.1);
                        self.cells[from].open[direction] = true;
                        self.cells[to].open[opposite(direction)] = true;
                        carved[to] = true;
                        stack.push(next);
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }
    }

    fn regenerate(&mut self) {
        self.carve();
        self.generations += 1;
        self.position = (self.size / 2, self.size / 2);
        self.history.clear();
        self.history.push_back(None);
        self.visit();
        debug!("maze {} carved ({}x{})", self.generations, self.size, self.size);
    }

    fn visit(&mut self) {
        self.step += 1;
        let step = self.step;
        let index = self.index(self.position.0, self.position.1);
        let cell = &mut self.cells[index];
        cell.visits = if cell.visits > 0 && step - cell.last_step > VISIT_MEMORY {
            1
        } else {
            cell.visits + 1
        };
        cell.last_step = step;
    }

    fn reward(&self) -> f32 {
        if self.is_dead_end() {
            return 0.0;
        }
        let centre = self.size as f32 / 2.0;
        let (x, y) = self.position;
        let distance = ((centre - x as f32).powi(2) + (centre - y as f32).powi(2)).sqrt();
        let visits = self.cells[self.index(x, y)].visits.max(1) as f32;
        ((1.0 - 1.0 / distance.max(1.0)) / visits.powi(3)).max(0.0)
    }

    fn on_border(&self) -> bool {
        let (x, y) = self.position;
        x == 0 || y == 0 || x == self.size - 1 || y == self.size - 1
    }
}

impl Environment for MazeEnvironment {
    fn state(&self) -> EnvironmentState {
        let mut features = Array1::zeros(DIRECTIONS * HISTORY_LENGTH + DIRECTIONS);
        for (slot, action) in self.history.iter().enumerate() {
            if let Some(action) = action {
                features[DIRECTIONS * slot + action] = -1.0;
            }
        }
        let (x, y) = self.position;
        let open = &self.cells[self.index(x, y)].open;
        let mut available = BTreeSet::new();
        for direction in 0..DIRECTIONS {
            if open[direction] {
                features[DIRECTIONS * HISTORY_LENGTH + direction] = -1.0;
                available.insert(direction);
            }
        }
        EnvironmentState::new(features, available)
    }

    fn action_count(&self) -> usize {
        DIRECTIONS
    }

    fn is_episodic(&self) -> bool {
        false
    }

    fn is_terminal_state(&self) -> bool {
        false
    }

    fn commit_action(&mut self, sink: &mut dyn RewardSink, action: usize) -> Result<(), ActionError> {
        let (x, y) = self.position;
        if !self.is_open(x, y, action) {
            return Err(ActionError::NotAvailable { action });
        }
        let next = self
            .neighbour(self.position, action)
            .ok_or(ActionError::NotAvailable { action })?;
        self.position = next;
        if self.history.len() == HISTORY_LENGTH {
            self.history.pop_front();
        }
        self.history.push_back(Some(action));
        self.visit();
        sink.respond(self.reward());

        if self.on_border() {
            self.regenerate();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Last(Option<f32>);

    impl RewardSink for Last {
        fn respond(&mut self, reward: f32) {
            self.0 = Some(reward);
        }
    }

    #[test]
    fn carved_maze_is_a_spanning_tree() {
        let maze = MazeEnvironment::new(9, 4);
        let cells = maze.size() * maze.size();
        let mut passages = 0;
        for x in 0..maze.size() {
            for y in 0..maze.size() {
                passages += (0..DIRECTIONS).filter(|&d| maze.is_open(x, y, d)).count();
                assert!((0..DIRECTIONS).any(|d| maze.is_open(x, y, d)));
            }
        }
        // each passage is counted from both ends
        assert_eq!(passages / 2, cells - 1);
    }

    #[test]
    fn same_seed_same_maze() {
        let a = MazeEnvironment::new(11, 8);
        let b = MazeEnvironment::new(11, 8);
        assert_eq!(a.state(), b.state());
        for x in 0..11 {
            for y in 0..11 {
                for d in 0..DIRECTIONS {
                    assert_eq!(a.is_open(x, y, d), b.is_open(x, y, d));
                }
            }
        }
    }

    #[test]
    fn moves_follow_open_walls() {
        let mut maze = MazeEnvironment::new(15, 2);
        let state = maze.state();
        assert_eq!(state.feature_len(), 52);
        let action = *state.available_actions.iter().next().unwrap();
        let closed = (0..DIRECTIONS).find(|d| !state.is_available(*d));

        let mut sink = Last(None);
        maze.commit_action(&mut sink, action).unwrap();
        assert!(sink.0.unwrap() >= 0.0);
        let state = maze.state();
        assert_eq!(state.features[DIRECTIONS + action], -1.0);
        // the way back is always open
        assert!(state.is_available(opposite(action)));

        if let Some(closed) = closed {
            let mut fresh = MazeEnvironment::new(15, 2);
            assert_eq!(
                fresh.commit_action(&mut Last(None), closed),
                Err(ActionError::NotAvailable { action: closed })
            );
        }
    }

    #[test]
    fn dead_end_pays_nothing() {
        let mut maze = MazeEnvironment::new(21, 5);
        let mut rng = StdRng::seed_from_u64(0);
        let mut sink = Last(None);
        let mut seen_dead_end = false;
        for _ in 0..2000 {
            let actions: Vec<usize> = maze.state().available_actions.into_iter().collect();
            let generation = maze.generations();
            maze.commit_action(&mut sink, *actions.choose(&mut rng).unwrap()).unwrap();
            if maze.generations() == generation && maze.is_dead_end() {
                assert_eq!(sink.0, Some(0.0));
                seen_dead_end = true;
            }
        }
        assert!(seen_dead_end);
    }
}
