//! # Replay Memory Module
//!
//! Bounded transition stores sampled by replay-mode estimators.
//!
//! ## Available Memories
//!
//! - **FifoMemory**: uniform sampling, oldest entry evicted at capacity
//! - **PriorityMemory**: proportional prioritisation by TD-error magnitude on a
//!   sum tree, with importance-sampling correction weights
//! - **SharedMemory**: lock-guarded wrapper allowing one writer to append while
//!   other threads sample snapshots
//!
//! ## Example Usage
//!
//! ```rust
//! use pallas::memory::{FifoMemory, Memory};
//! use pallas::environment::EnvironmentState;
//! use pallas::transition::Transition;
//! use ndarray::array;
//! use rand::SeedableRng;
//! use std::collections::BTreeSet;
//!
//! let mut memory = FifoMemory::new(2).unwrap();
//! let state = EnvironmentState::new(array![0.0], BTreeSet::from([0]));
//! for reward in [1.0, 2.0, 3.0] {
//!     memory.add(Transition::new(state.clone(), 0, reward, state.clone(), false));
//! }
//! assert_eq!(memory.len(), 2);
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let batch = memory.sample(2, &mut rng).unwrap();
//! assert_eq!(batch.len(), 2);
//! ```

pub mod fifo;
pub mod priority;
pub mod shared;
pub mod sum_tree;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{PallasError, Result};
use crate::params::{ParamDef, ParamSet, ParamType};
use crate::transition::Transition;

pub use fifo::FifoMemory;
pub use priority::PriorityMemory;
pub use shared::SharedMemory;
pub use sum_tree::SumTree;

/// A sampled mini-batch.
///
/// `weights` are importance-sampling corrections (all 1.0 for uniform
/// memories); `indices` identify the slots for a later priority update.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub transitions: Vec<Transition>,
    pub weights: Vec<f32>,
    pub indices: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Bounded store of transitions.
pub trait Memory: Send + Sync {
    /// Insert a transition, evicting per the memory's policy when full.
    fn add(&mut self, transition: Transition);

    /// Draw up to `batch_size` transitions.
    fn sample(&mut self, batch_size: usize, rng: &mut StdRng) -> Result<Batch>;

    /// Report new TD errors for previously sampled slots.
    fn update_priorities(&mut self, _indices: &[usize], _td_errors: &[f32]) {}

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}

/// Which memory a replay-mode estimator uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryKind {
    Fifo,
    Priority,
}

pub const FIFO_PARAMS: &[ParamDef] = &[ParamDef::new("capacity", ParamType::Int)];

pub const PRIORITY_PARAMS: &[ParamDef] = &[
    ParamDef::new("capacity", ParamType::Int),
    ParamDef::new("alpha", ParamType::Float),
    ParamDef::new("beta", ParamType::Float),
    ParamDef::new("betaStep", ParamType::Float),
];

impl MemoryKind {
    pub fn param_defs(&self) -> &'static [ParamDef] {
        match self {
            MemoryKind::Fifo => FIFO_PARAMS,
            MemoryKind::Priority => PRIORITY_PARAMS,
        }
    }

    /// Build the memory from parsed parameters.
    pub fn build(&self, params: &ParamSet) -> Result<Box<dyn Memory>> {
        let capacity = params.usize_or("capacity", 20000)?;
        match self {
            MemoryKind::Fifo => Ok(Box::new(FifoMemory::new(capacity)?)),
            MemoryKind::Priority => {
                let alpha = params.float_in("alpha", 0.6, 0.0, 1.0)?;
                let beta = params.float_in("beta", 0.4, 0.0, 1.0)?;
                let beta_step = params.float_in("betaStep", 0.001, 0.0, 1.0)?;
                Ok(Box::new(PriorityMemory::new(capacity, alpha, beta, beta_step)?))
            }
        }
    }
}

pub(crate) fn check_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(PallasError::invalid_parameter(
            "capacity",
            "Capacity must be greater than 0",
        ));
    }
    Ok(())
}
