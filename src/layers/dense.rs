use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::error::{PallasError, Result};

/// A fully connected layer: `activation(inputs · weights + biases)`.
///
/// `forward_batch` caches its inputs and pre-activation outputs for the
/// following `backward_batch`; `predict_batch` touches no cache and can be
/// called through a shared reference.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
}

/// Gradients of one layer's parameters.
#[derive(Clone, Debug)]
pub struct LayerGradients {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

impl DenseLayer {
    /// Glorot-uniform weights drawn from the thread RNG, zero biases.
    pub fn new(input_size: usize, output_size: usize, activation: Activation) -> Self {
        Self::new_with_rng(input_size, output_size, activation, &mut rand::thread_rng())
    }

    /// Glorot-uniform weights drawn from `rng`, zero biases.
    pub fn new_with_rng<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / (input_size + output_size).max(1) as f32).sqrt();
        let weights = Array2::random_using((input_size, output_size), Uniform::new(-limit, limit), rng);
        DenseLayer {
            weights,
            biases: Array1::zeros(output_size),
            activation,
            pre_activation_output: None,
            inputs: None,
        }
    }

    /// Replace the initial parameters; shapes must match the layer.
    pub fn with_parameters(mut self, weights: Array2<f32>, biases: Array1<f32>) -> Result<Self> {
        if weights.dim() != self.weights.dim() || biases.dim() != self.biases.dim() {
            return Err(PallasError::dimension_mismatch(
                format!("{:?} and {:?}", self.weights.dim(), self.biases.dim()),
                format!("{:?} and {:?}", weights.dim(), biases.dim()),
            ));
        }
        self.weights = weights;
        self.biases = biases;
        Ok(self)
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    fn affine(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0))
    }

    /// Inference-only pass.
    pub fn predict_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut outputs = self.affine(inputs);
        self.activation.apply_batch(&mut outputs);
        outputs
    }

    /// Training pass that records what `backward_batch` needs.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let pre_activation = self.affine(inputs);
        let mut outputs = pre_activation.clone();
        self.activation.apply_batch(&mut outputs);
        self.inputs = Some(inputs.to_owned());
        self.pre_activation_output = Some(pre_activation);
        outputs
    }

    /// Returns the error to pass to the previous layer and this layer's
    /// gradients, or `None` when no forward pass was recorded.
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Option<(Array2<f32>, LayerGradients)> {
        let pre_activation = self.pre_activation_output.as_ref()?;
        let inputs = self.inputs.as_ref()?;

        let adjusted = &output_errors * &self.activation.derivative_batch(pre_activation.view());
        let gradients = LayerGradients {
            weights: inputs.t().dot(&adjusted),
            biases: adjusted.sum_axis(Axis(0)),
        };
        let input_errors = adjusted.dot(&self.weights.t());
        Some((input_errors, gradients))
    }

    pub(crate) fn clear_cache(&mut self) {
        self.inputs = None;
        self.pre_activation_output = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn layer() -> DenseLayer {
        DenseLayer::new(2, 1, Activation::Relu)
            .with_parameters(array![[1.0], [-1.0]], array![0.5])
            .unwrap()
    }

    #[test]
    fn test_forward_matches_predict() {
        let mut layer = layer();
        let inputs = array![[2.0, 1.0], [0.0, 3.0]];
        let predicted = layer.predict_batch(inputs.view());
        assert_eq!(predicted, array![[1.5], [0.0]]);
        assert_eq!(layer.forward_batch(inputs.view()), predicted);
    }

    #[test]
    fn test_backward_skips_inactive_units() {
        let mut layer = layer();
        assert!(layer.backward_batch(array![[1.0]].view()).is_none());
        layer.forward_batch(array![[2.0, 1.0], [0.0, 3.0]].view());
        let (input_errors, gradients) = layer.backward_batch(array![[1.0], [1.0]].view()).unwrap();
        // the second row is clipped by the ReLU
        assert_eq!(gradients.weights, array![[2.0], [1.0]]);
        assert_eq!(gradients.biases, array![1.0]);
        assert_eq!(input_errors, array![[1.0, -1.0], [0.0, 0.0]]);
    }

    #[test]
    fn test_shape_checked() {
        assert!(DenseLayer::new(2, 1, Activation::Linear)
            .with_parameters(array![[1.0, 2.0]], array![0.0])
            .is_err());
    }
}
