use std::sync::{Arc, RwLock};

use ndarray::{Array1, ArrayView1};

use super::approximator::FunctionApproximator;
use crate::error::{PallasError, Result};

/// Independent copy of an approximator for inference.
///
/// Owns its parameters, so training the estimator it came from never
/// changes what it predicts.
pub struct PredictionSnapshot {
    approximator: Box<dyn FunctionApproximator>,
}

impl PredictionSnapshot {
    pub fn new(approximator: Box<dyn FunctionApproximator>) -> Self {
        PredictionSnapshot { approximator }
    }

    pub fn predict(&self, features: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.approximator.predict(features)
    }

    pub fn approximator(&self) -> &dyn FunctionApproximator {
        self.approximator.as_ref()
    }
}

/// Latest published parameters, readable from other threads.
///
/// The trainer swaps in a complete clone after each training step; readers
/// grab the current `Arc` and predict on it without holding the lock, so a
/// reader never observes a half-applied update.
#[derive(Clone)]
pub struct PublishedSnapshot {
    current: Arc<RwLock<Arc<dyn FunctionApproximator>>>,
}

fn poisoned() -> PallasError {
    PallasError::TrainingError("published snapshot lock poisoned".to_string())
}

impl PublishedSnapshot {
    pub fn new(approximator: &dyn FunctionApproximator) -> Self {
        PublishedSnapshot {
            current: Arc::new(RwLock::new(Arc::from(approximator.box_clone()))),
        }
    }

    /// Replace the published copy with a clone of `approximator`.
    pub fn publish(&self, approximator: &dyn FunctionApproximator) -> Result<()> {
        let fresh: Arc<dyn FunctionApproximator> = Arc::from(approximator.box_clone());
        let mut guard = self.current.write().map_err(|_| poisoned())?;
        *guard = fresh;
        Ok(())
    }

    pub fn current(&self) -> Result<Arc<dyn FunctionApproximator>> {
        let guard = self.current.read().map_err(|_| poisoned())?;
        Ok(Arc::clone(&guard))
    }

    pub fn predict(&self, features: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.current()?.predict(features)
    }
}
