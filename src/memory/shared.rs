use std::sync::{Arc, RwLock};

use rand::rngs::StdRng;
use rand::seq::index;

use super::{Batch, FifoMemory, Memory};
use crate::error::{PallasError, Result};
use crate::transition::Transition;

/// Replay memory shared between a writer and concurrent samplers.
///
/// Appends take the write lock. [`SharedMemory::snapshot_sample`] holds the
/// read lock only while copying the sampled transitions out, so the returned
/// batch is unaffected by appends that happen afterwards.
pub struct SharedMemory<M: Memory> {
    inner: Arc<RwLock<M>>,
}

impl<M: Memory> Clone for SharedMemory<M> {
    fn clone(&self) -> Self {
        SharedMemory {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn poisoned() -> PallasError {
    PallasError::TrainingError("shared memory lock poisoned".to_string())
}

impl<M: Memory> SharedMemory<M> {
    pub fn new(memory: M) -> Self {
        SharedMemory {
            inner: Arc::new(RwLock::new(memory)),
        }
    }

    pub fn add(&self, transition: Transition) -> Result<()> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        guard.add(transition);
        Ok(())
    }

    /// Sample through the wrapped memory's own policy (may mutate it, e.g.
    /// beta annealing), under the write lock.
    pub fn sample(&self, batch_size: usize, rng: &mut StdRng) -> Result<Batch> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        guard.sample(batch_size, rng)
    }

    /// Uniform sample taken under the read lock from a consistent view.
    pub fn snapshot_sample(&self, batch_size: usize, rng: &mut StdRng) -> Result<Batch>
    where
        M: SnapshotSource,
    {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        let len = guard.len();
        if len == 0 {
            return Err(PallasError::EmptyBuffer("shared memory has no transitions".to_string()));
        }
        let amount = batch_size.min(len);
        let indices = index::sample(rng, len, amount).into_vec();
        let transitions = indices
            .iter()
            .filter_map(|&i| guard.get(i).cloned())
            .collect::<Vec<_>>();
        Ok(Batch {
            weights: vec![1.0; transitions.len()],
            transitions,
            indices,
        })
    }

    pub fn update_priorities(&self, indices: &[usize], td_errors: &[f32]) -> Result<()> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        guard.update_priorities(indices, td_errors);
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(|_| poisoned())?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Memories that allow indexed read access for snapshot sampling.
pub trait SnapshotSource {
    fn get(&self, index: usize) -> Option<&Transition>;
}

impl SnapshotSource for FifoMemory {
    fn get(&self, index: usize) -> Option<&Transition> {
        FifoMemory::get(self, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentState;
    use ndarray::array;
    use rand::SeedableRng;
    use std::collections::BTreeSet;
    use std::thread;

    fn transition(reward: f32) -> Transition {
        let state = EnvironmentState::new(array![reward], BTreeSet::from([0]));
        Transition::new(state.clone(), 0, reward, state, false)
    }

    #[test]
    fn test_concurrent_append_and_sample() {
        let shared = SharedMemory::new(FifoMemory::new(64).unwrap());
        shared.add(transition(0.0)).unwrap();

        let writer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 1..500 {
                    shared.add(transition(i as f32)).unwrap();
                }
            })
        };

        let reader = {
            let shared = shared.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(3);
                for _ in 0..200 {
                    let batch = shared.snapshot_sample(8, &mut rng).unwrap();
                    assert_eq!(batch.transitions.len(), batch.weights.len());
                    for t in &batch.transitions {
                        // state and reward were written together
                        assert_eq!(t.state.features[0], t.reward);
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(shared.len().unwrap(), 64);
    }
}
