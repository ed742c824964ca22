use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Activation applied to the output of a dense layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    #[default]
    Relu,
    Linear,
    Sigmoid,
    Tanh,
    LeakyRelu { alpha: f32 },
    Elu { alpha: f32 },
}

impl Activation {
    fn value(&self, v: f32) -> f32 {
        match *self {
            Activation::Relu => v.max(0.0),
            Activation::Linear => v,
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
            Activation::Tanh => v.tanh(),
            Activation::LeakyRelu { alpha } => if v > 0.0 { v } else { alpha * v },
            Activation::Elu { alpha } => if v > 0.0 { v } else { alpha * (v.exp() - 1.0) },
        }
    }

    fn slope(&self, v: f32) -> f32 {
        match *self {
            Activation::Relu => if v > 0.0 { 1.0 } else { 0.0 },
            Activation::Linear => 1.0,
            Activation::Sigmoid => {
                let s = 1.0 / (1.0 + (-v).exp());
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = v.tanh();
                1.0 - t * t
            }
            Activation::LeakyRelu { alpha } => if v > 0.0 { 1.0 } else { alpha },
            Activation::Elu { alpha } => if v > 0.0 { 1.0 } else { alpha * v.exp() },
        }
    }

    /// Apply the activation in place to a single vector.
    pub fn apply(&self, input: &mut Array1<f32>) {
        if !matches!(self, Activation::Linear) {
            input.mapv_inplace(|v| self.value(v));
        }
    }

    /// Apply the activation in place to a batch (one row per sample).
    pub fn apply_batch(&self, inputs: &mut Array2<f32>) {
        if !matches!(self, Activation::Linear) {
            inputs.mapv_inplace(|v| self.value(v));
        }
    }

    /// Derivative with respect to the pre-activation values of a batch.
    pub fn derivative_batch(&self, pre_activation: ArrayView2<f32>) -> Array2<f32> {
        pre_activation.mapv(|v| self.slope(v))
    }
}

/// Numerically stable softmax over a vector.
pub fn softmax(values: ArrayView1<f32>) -> Array1<f32> {
    let max = values.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exps = values.mapv(|v| (v - max).exp());
    let sum = exps.sum();
    if sum > 0.0 && sum.is_finite() {
        exps / sum
    } else {
        Array1::from_elem(values.len(), 1.0 / values.len().max(1) as f32)
    }
}
