use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::error::{PallasError, Result};
use crate::layers::{DenseLayer, LayerGradients};
use crate::loss::Loss;
use crate::optimizer::{clip_global_norm, Optimizer, OptimizerWrapper};

/// A feed-forward network of dense layers with its own optimizer.
///
/// `predict`/`predict_batch` are pure and usable through `&self`; training
/// goes through `forward_batch` + `backward_batch` (or the `train_*` helpers)
/// and needs `&mut self`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NeuralNetwork {
    pub layers: Vec<DenseLayer>,
    pub optimizer: OptimizerWrapper,
    /// Global gradient-norm limit applied before each update (0 disables)
    pub max_gradient_norm: f32,
}

impl NeuralNetwork {
    /// Build a network from layer sizes and one activation per layer.
    pub fn new(layer_sizes: &[usize], activations: &[Activation], optimizer: OptimizerWrapper) -> Result<Self> {
        Self::new_with_rng(layer_sizes, activations, optimizer, &mut rand::thread_rng())
    }

    /// As [`NeuralNetwork::new`], drawing initial weights from `rng`.
    pub fn new_with_rng<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        activations: &[Activation],
        optimizer: OptimizerWrapper,
        rng: &mut R,
    ) -> Result<Self> {
        if layer_sizes.len() < 2 {
            return Err(PallasError::invalid_parameter(
                "layer_sizes",
                "Must have at least 2 layers",
            ));
        }
        if activations.len() != layer_sizes.len() - 1 {
            return Err(PallasError::invalid_parameter(
                "activations",
                "Number of activations must match number of layers - 1",
            ));
        }
        if layer_sizes.iter().any(|&s| s == 0) {
            return Err(PallasError::invalid_parameter("layer_sizes", "Layer sizes must be positive"));
        }

        let layers = layer_sizes
            .windows(2)
            .zip(activations)
            .map(|(w, &activation)| DenseLayer::new_with_rng(w[0], w[1], activation, rng))
            .collect();

        Ok(NeuralNetwork {
            layers,
            optimizer,
            max_gradient_norm: 0.0,
        })
    }

    /// ReLU hidden layers and a linear output layer.
    pub fn with_hidden_layers<R: Rng + ?Sized>(
        input_size: usize,
        hidden: &[usize],
        output_size: usize,
        hidden_activation: Activation,
        optimizer: OptimizerWrapper,
        rng: &mut R,
    ) -> Result<Self> {
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(input_size);
        sizes.extend_from_slice(hidden);
        sizes.push(output_size);
        let mut activations = vec![hidden_activation; hidden.len()];
        activations.push(Activation::Linear);
        Self::new_with_rng(&sizes, &activations, optimizer, rng)
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_size())
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.output_size())
    }

    /// Inference for a single input vector.
    pub fn predict(&self, input: ArrayView1<f32>) -> Array1<f32> {
        let output = self.predict_batch(input.insert_axis(Axis(0)));
        output.row(0).to_owned()
    }

    /// Inference for a batch, one row per sample.
    pub fn predict_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut current = inputs.to_owned();
        for layer in &self.layers {
            current = layer.predict_batch(current.view());
        }
        current
    }

    /// Training forward pass; records activations for `backward_batch`.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut current = inputs.to_owned();
        for layer in &mut self.layers {
            current = layer.forward_batch(current.view());
        }
        current
    }

    /// Backpropagate `output_errors` (dL/d output) through the recorded pass.
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<Vec<LayerGradients>> {
        let mut gradients = Vec::with_capacity(self.layers.len());
        let mut current = output_errors.to_owned();
        for layer in self.layers.iter().rev() {
            let (input_errors, layer_gradients) = layer.backward_batch(current.view()).ok_or_else(|| {
                PallasError::TrainingError("backward pass without a recorded forward pass".to_string())
            })?;
            gradients.push(layer_gradients);
            current = input_errors;
        }
        gradients.reverse();
        Ok(gradients)
    }

    /// Apply gradients through the optimizer; fails on non-finite values.
    pub fn apply_gradients(&mut self, mut gradients: Vec<LayerGradients>, learning_rate: f32) -> Result<()> {
        if gradients.len() != self.layers.len() {
            return Err(PallasError::dimension_mismatch(
                format!("{} layer gradients", self.layers.len()),
                format!("{}", gradients.len()),
            ));
        }
        let norm = clip_global_norm(&mut gradients, self.max_gradient_norm);
        if !norm.is_finite() {
            return Err(PallasError::NumericalError(format!("gradient norm is {}", norm)));
        }
        for (index, (layer, grads)) in self.layers.iter_mut().zip(gradients.iter()).enumerate() {
            self.optimizer
                .update_layer(index, &mut layer.weights, &mut layer.biases, grads, learning_rate);
        }
        self.optimizer.finish_step();
        for layer in &mut self.layers {
            layer.clear_cache();
        }
        Ok(())
    }

    /// One optimizer step toward `targets`; returns the loss before the step.
    pub fn train_minibatch(
        &mut self,
        inputs: ArrayView2<f32>,
        targets: ArrayView2<f32>,
        weights: ArrayView1<f32>,
        loss: &dyn Loss,
        learning_rate: f32,
    ) -> Result<f32> {
        let outputs = self.forward_batch(inputs);
        if outputs.dim() != targets.dim() {
            return Err(PallasError::dimension_mismatch(
                format!("{:?}", outputs.dim()),
                format!("{:?}", targets.dim()),
            ));
        }
        let value = loss.compute_batch(outputs.view(), targets, weights);
        if !value.is_finite() {
            return Err(PallasError::NumericalError(format!("loss is {}", value)));
        }
        let errors = loss.gradient_batch(outputs.view(), targets, weights);
        let gradients = self.backward_batch(errors.view())?;
        self.apply_gradients(gradients, learning_rate)?;
        Ok(value)
    }

    /// One optimizer step along an externally computed output gradient.
    pub fn train_with_output_gradient(
        &mut self,
        inputs: ArrayView2<f32>,
        output_gradient: ArrayView2<f32>,
        learning_rate: f32,
    ) -> Result<()> {
        let outputs = self.forward_batch(inputs);
        if outputs.dim() != output_gradient.dim() {
            return Err(PallasError::dimension_mismatch(
                format!("{:?}", outputs.dim()),
                format!("{:?}", output_gradient.dim()),
            ));
        }
        let gradients = self.backward_batch(output_gradient)?;
        self.apply_gradients(gradients, learning_rate)
    }

    /// Copy of every layer's `(weights, biases)`.
    pub fn parameters(&self) -> Vec<(Array2<f32>, Array1<f32>)> {
        self.layers
            .iter()
            .map(|l| (l.weights.clone(), l.biases.clone()))
            .collect()
    }

    /// Overwrite weights and biases; shapes must match layer for layer.
    pub fn load_parameters(&mut self, parameters: &[(Array2<f32>, Array1<f32>)]) -> Result<()> {
        if parameters.len() != self.layers.len() {
            return Err(PallasError::dimension_mismatch(
                format!("{} layers", self.layers.len()),
                format!("{} layers", parameters.len()),
            ));
        }
        for (layer, (w, b)) in self.layers.iter().zip(parameters) {
            if layer.weights.dim() != w.dim() || layer.biases.dim() != b.dim() {
                return Err(PallasError::dimension_mismatch(
                    format!("{:?}/{:?}", layer.weights.dim(), layer.biases.dim()),
                    format!("{:?}/{:?}", w.dim(), b.dim()),
                ));
            }
        }
        for (layer, (w, b)) in self.layers.iter_mut().zip(parameters) {
            layer.weights.assign(w);
            layer.biases.assign(b);
        }
        Ok(())
    }
}
