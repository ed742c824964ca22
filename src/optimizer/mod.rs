//! # Optimizers
//!
//! Parameter update rules used by [`NeuralNetwork`](crate::network::NeuralNetwork).
//! Optimizers with per-parameter state (Adam, RMSProp) keep one slot per layer,
//! addressed by the layer index the network passes in, and size it lazily on
//! the first update.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::layers::LayerGradients;

pub trait Optimizer {
    /// Apply one update to the parameters of layer `layer`.
    fn update_layer(
        &mut self,
        layer: usize,
        weights: &mut Array2<f32>,
        biases: &mut Array1<f32>,
        gradients: &LayerGradients,
        learning_rate: f32,
    );

    /// Called once after every layer has been updated for a step.
    fn finish_step(&mut self) {}
}

/// Serializable choice of optimizer, used in configuration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub enum OptimizerKind {
    Sgd,
    #[default]
    Adam,
    RmsProp,
}

impl OptimizerKind {
    pub fn build(&self) -> OptimizerWrapper {
        match self {
            OptimizerKind::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerKind::Adam => OptimizerWrapper::Adam(Adam::default()),
            OptimizerKind::RmsProp => OptimizerWrapper::RMSProp(RMSProp::default()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
    RMSProp(RMSProp),
}

impl Optimizer for OptimizerWrapper {
    fn update_layer(
        &mut self,
        layer: usize,
        weights: &mut Array2<f32>,
        biases: &mut Array1<f32>,
        gradients: &LayerGradients,
        learning_rate: f32,
    ) {
        match self {
            OptimizerWrapper::SGD(o) => o.update_layer(layer, weights, biases, gradients, learning_rate),
            OptimizerWrapper::Adam(o) => o.update_layer(layer, weights, biases, gradients, learning_rate),
            OptimizerWrapper::RMSProp(o) => o.update_layer(layer, weights, biases, gradients, learning_rate),
        }
    }

    fn finish_step(&mut self) {
        match self {
            OptimizerWrapper::SGD(o) => o.finish_step(),
            OptimizerWrapper::Adam(o) => o.finish_step(),
            OptimizerWrapper::RMSProp(o) => o.finish_step(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn update_layer(
        &mut self,
        _layer: usize,
        weights: &mut Array2<f32>,
        biases: &mut Array1<f32>,
        gradients: &LayerGradients,
        learning_rate: f32,
    ) {
        weights.scaled_add(-learning_rate, &gradients.weights);
        biases.scaled_add(-learning_rate, &gradients.biases);
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Moments {
    weights: Array2<f32>,
    biases: Array1<f32>,
}

impl Moments {
    fn zeros_like(weights: &Array2<f32>, biases: &Array1<f32>) -> Self {
        Moments {
            weights: Array2::zeros(weights.dim()),
            biases: Array1::zeros(biases.dim()),
        }
    }

    fn matches(&self, weights: &Array2<f32>, biases: &Array1<f32>) -> bool {
        self.weights.dim() == weights.dim() && self.biases.dim() == biases.dim()
    }
}

fn slot<'a>(
    slots: &'a mut Vec<Moments>,
    layer: usize,
    weights: &Array2<f32>,
    biases: &Array1<f32>,
) -> &'a mut Moments {
    while slots.len() <= layer {
        slots.push(Moments::zeros_like(weights, biases));
    }
    if !slots[layer].matches(weights, biases) {
        slots[layer] = Moments::zeros_like(weights, biases);
    }
    &mut slots[layer]
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    first: Vec<Moments>,
    second: Vec<Moments>,
    /// Step counter used for bias correction, starting at 1
    pub t: i32,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            first: Vec::new(),
            second: Vec::new(),
            t: 1,
        }
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn update_layer(
        &mut self,
        layer: usize,
        weights: &mut Array2<f32>,
        biases: &mut Array1<f32>,
        gradients: &LayerGradients,
        learning_rate: f32,
    ) {
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let c1 = 1.0 - b1.powi(self.t);
        let c2 = 1.0 - b2.powi(self.t);

        let m = slot(&mut self.first, layer, weights, biases);
        m.weights.zip_mut_with(&gradients.weights, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
        m.biases.zip_mut_with(&gradients.biases, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
        let m = m.clone();

        let v = slot(&mut self.second, layer, weights, biases);
        v.weights.zip_mut_with(&gradients.weights, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);
        v.biases.zip_mut_with(&gradients.biases, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);

        ndarray::Zip::from(weights)
            .and(&m.weights)
            .and(&v.weights)
            .for_each(|w, &m, &v| *w -= learning_rate * (m / c1) / ((v / c2).sqrt() + eps));
        ndarray::Zip::from(biases)
            .and(&m.biases)
            .and(&v.biases)
            .for_each(|b, &m, &v| *b -= learning_rate * (m / c1) / ((v / c2).sqrt() + eps));
    }

    fn finish_step(&mut self) {
        self.t = self.t.saturating_add(1);
    }
}

/// RMSProp optimizer
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RMSProp {
    pub beta: f32,
    pub epsilon: f32,
    mean_square: Vec<Moments>,
}

impl RMSProp {
    pub fn new(beta: f32, epsilon: f32) -> Self {
        RMSProp {
            beta,
            epsilon,
            mean_square: Vec::new(),
        }
    }
}

impl Default for RMSProp {
    fn default() -> Self {
        Self::new(0.9, 1e-8)
    }
}

impl Optimizer for RMSProp {
    fn update_layer(
        &mut self,
        layer: usize,
        weights: &mut Array2<f32>,
        biases: &mut Array1<f32>,
        gradients: &LayerGradients,
        learning_rate: f32,
    ) {
        let (beta, eps) = (self.beta, self.epsilon);
        let v = slot(&mut self.mean_square, layer, weights, biases);
        v.weights.zip_mut_with(&gradients.weights, |v, &g| *v = beta * *v + (1.0 - beta) * g * g);
        v.biases.zip_mut_with(&gradients.biases, |v, &g| *v = beta * *v + (1.0 - beta) * g * g);

        ndarray::Zip::from(weights)
            .and(&gradients.weights)
            .and(&v.weights)
            .for_each(|w, &g, &v| *w -= learning_rate * g / (v.sqrt() + eps));
        ndarray::Zip::from(biases)
            .and(&gradients.biases)
            .and(&v.biases)
            .for_each(|b, &g, &v| *b -= learning_rate * g / (v.sqrt() + eps));
    }
}

/// Scale all gradients so their joint L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_global_norm(gradients: &mut [LayerGradients], max_norm: f32) -> f32 {
    let norm = gradients
        .iter()
        .map(|g| g.weights.iter().chain(g.biases.iter()).map(|x| x * x).sum::<f32>())
        .sum::<f32>()
        .sqrt();
    if max_norm > 0.0 && norm > max_norm {
        let scale = max_norm / norm;
        for g in gradients.iter_mut() {
            g.weights.mapv_inplace(|x| x * scale);
            g.biases.mapv_inplace(|x| x * scale);
        }
    }
    norm
}
