use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Regression loss with optional per-sample weights.
///
/// `weights` has one entry per batch row; importance-sampling corrections
/// from prioritised replay arrive through it.
pub trait Loss: Send + Sync {
    /// Weighted mean loss over the batch
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>, weights: ArrayView1<f32>) -> f32;

    /// Gradient of `compute_batch` with respect to `predictions`
    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>, weights: ArrayView1<f32>) -> Array2<f32>;
}

fn row_weighted(mut values: Array2<f32>, weights: ArrayView1<f32>) -> Array2<f32> {
    for (mut row, &w) in values.axis_iter_mut(Axis(0)).zip(weights.iter()) {
        row.mapv_inplace(|v| v * w);
    }
    values
}

/// Mean squared error, halved so the gradient is the plain residual.
#[derive(Debug, Clone, Copy, Default)]
pub struct MSE;

impl Loss for MSE {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>, weights: ArrayView1<f32>) -> f32 {
        let diff = &predictions - &targets;
        let squared = row_weighted(diff.mapv(|d| 0.5 * d * d), weights);
        squared.sum() / predictions.nrows().max(1) as f32
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>, weights: ArrayView1<f32>) -> Array2<f32> {
        let diff = &predictions - &targets;
        row_weighted(diff, weights) / predictions.nrows().max(1) as f32
    }
}

/// Huber loss (smooth L1)
#[derive(Debug, Clone, Copy)]
pub struct HuberLoss {
    pub delta: f32,
}

impl HuberLoss {
    pub fn new(delta: f32) -> Self {
        HuberLoss { delta }
    }
}

impl Loss for HuberLoss {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>, weights: ArrayView1<f32>) -> f32 {
        let delta = self.delta;
        let diff = &predictions - &targets;
        let losses = diff.mapv(|x| {
            if x.abs() <= delta {
                0.5 * x * x
            } else {
                delta * x.abs() - 0.5 * delta * delta
            }
        });
        row_weighted(losses, weights).sum() / predictions.nrows().max(1) as f32
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>, weights: ArrayView1<f32>) -> Array2<f32> {
        let delta = self.delta;
        let diff = &predictions - &targets;
        let grads = diff.mapv(|x| if x.abs() <= delta { x } else { delta * x.signum() });
        row_weighted(grads, weights) / predictions.nrows().max(1) as f32
    }
}

/// Serializable loss selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum LossKind {
    #[default]
    Mse,
    Huber { delta: f32 },
}

impl Loss for LossKind {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>, weights: ArrayView1<f32>) -> f32 {
        match *self {
            LossKind::Mse => MSE.compute_batch(predictions, targets, weights),
            LossKind::Huber { delta } => HuberLoss::new(delta).compute_batch(predictions, targets, weights),
        }
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>, weights: ArrayView1<f32>) -> Array2<f32> {
        match *self {
            LossKind::Mse => MSE.gradient_batch(predictions, targets, weights),
            LossKind::Huber { delta } => HuberLoss::new(delta).gradient_batch(predictions, targets, weights),
        }
    }
}
