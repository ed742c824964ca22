use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::index;

use super::{check_capacity, Batch, Memory};
use crate::error::{PallasError, Result};
use crate::transition::Transition;

/// First-in first-out replay memory with uniform sampling.
#[derive(Debug, Clone)]
pub struct FifoMemory {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl FifoMemory {
    pub fn new(capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;
        Ok(FifoMemory {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Transition at `index`, counting from the oldest.
    pub fn get(&self, index: usize) -> Option<&Transition> {
        self.buffer.get(index)
    }

    /// Stored transitions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }
}

impl Memory for FifoMemory {
    fn add(&mut self, transition: Transition) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Samples without replacement; asking for more than stored returns all.
    fn sample(&mut self, batch_size: usize, rng: &mut StdRng) -> Result<Batch> {
        if self.buffer.is_empty() {
            return Err(PallasError::EmptyBuffer("FIFO memory has no transitions".to_string()));
        }
        let amount = batch_size.min(self.buffer.len());
        let indices = index::sample(rng, self.buffer.len(), amount).into_vec();
        let transitions = indices.iter().map(|&i| self.buffer[i].clone()).collect();
        Ok(Batch {
            transitions,
            weights: vec![1.0; amount],
            indices,
        })
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}
