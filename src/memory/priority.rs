use rand::rngs::StdRng;
use rand::Rng;

use super::{check_capacity, Batch, Memory, SumTree};
use crate::error::{PallasError, Result};
use crate::transition::Transition;

/// Keeps priorities strictly positive for zero TD errors.
const PRIORITY_EPSILON: f32 = 1e-8;

/// Proportional prioritised replay memory.
///
/// Each slot's sampling probability is `p_i / sum(p)` with
/// `p_i = (|td_error| + eps)^alpha`. Samples carry importance-sampling weights
/// `(N * P(i))^-beta` normalised by their maximum; `beta` anneals toward 1 by
/// `beta_step` on every sample call. Slots are overwritten in ring order, so
/// the oldest entry is evicted at capacity.
#[derive(Debug, Clone)]
pub struct PriorityMemory {
    slots: Vec<Option<Transition>>,
    tree: SumTree,
    next: usize,
    len: usize,
    alpha: f32,
    beta: f32,
    beta_step: f32,
    max_priority: f32,
}

impl PriorityMemory {
    pub fn new(capacity: usize, alpha: f32, beta: f32, beta_step: f32) -> Result<Self> {
        check_capacity(capacity)?;
        Ok(PriorityMemory {
            slots: vec![None; capacity],
            tree: SumTree::new(capacity),
            next: 0,
            len: 0,
            alpha,
            beta,
            beta_step,
            max_priority: 1.0,
        })
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    /// Current priority stored for `slot`.
    pub fn priority(&self, slot: usize) -> f32 {
        self.tree.get(slot)
    }

    fn priority_for(&self, td_error: f32) -> f32 {
        (td_error.abs() + PRIORITY_EPSILON).powf(self.alpha)
    }
}

impl Memory for PriorityMemory {
    /// New transitions enter with the highest priority seen so far.
    fn add(&mut self, transition: Transition) {
        let slot = self.next;
        self.slots[slot] = Some(transition);
        self.tree.update(slot, self.max_priority);
        self.next = (self.next + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    /// Stratified proportional sampling: one draw per equal-mass segment.
    fn sample(&mut self, batch_size: usize, rng: &mut StdRng) -> Result<Batch> {
        let total = self.tree.total();
        if self.len == 0 || total <= 0.0 {
            return Err(PallasError::EmptyBuffer("priority memory has no transitions".to_string()));
        }

        let amount = batch_size.min(self.len).max(1);
        let segment = total / amount as f32;
        let mut batch = Batch::default();

        for i in 0..amount {
            let lo = segment * i as f32;
            let value = lo + rng.gen::<f32>() * segment;
            let (slot, priority) = self.tree.find(value.min(total));
            let transition = match self.slots.get(slot).and_then(|t| t.as_ref()) {
                Some(t) if priority > 0.0 => t,
                _ => continue,
            };
            let probability = priority / total;
            let weight = (self.len as f32 * probability).powf(-self.beta);
            batch.transitions.push(transition.clone());
            batch.weights.push(weight);
            batch.indices.push(slot);
        }

        if batch.is_empty() {
            return Err(PallasError::EmptyBuffer("priority sampling found no entries".to_string()));
        }

        let max_weight = batch.weights.iter().fold(0.0_f32, |m, &w| m.max(w));
        if max_weight > 0.0 {
            batch.weights.iter_mut().for_each(|w| *w /= max_weight);
        }

        self.beta = (self.beta + self.beta_step).min(1.0);
        Ok(batch)
    }

    fn update_priorities(&mut self, indices: &[usize], td_errors: &[f32]) {
        for (&slot, &td_error) in indices.iter().zip(td_errors) {
            if slot >= self.slots.len() || self.slots[slot].is_none() {
                continue;
            }
            let priority = self.priority_for(td_error);
            self.tree.update(slot, priority);
            if priority > self.max_priority {
                self.max_priority = priority;
            }
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.tree.clear();
        self.next = 0;
        self.len = 0;
        self.max_priority = 1.0;
    }
}
