use std::collections::HashMap;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::parameters::{Parameters, StateKey};
use super::EstimatorConfig;
use crate::activations::Activation;
use crate::error::{PallasError, Result};
use crate::loss::{Loss, LossKind};
use crate::network::NeuralNetwork;
use crate::optimizer::OptimizerKind;

/// A trainable mapping from feature vectors to output vectors.
///
/// Implementations must keep `predict` free of side effects so an owned clone
/// can serve inference while the original trains.
pub trait FunctionApproximator: Send + Sync {
    fn input_size(&self) -> usize;

    fn output_size(&self) -> usize;

    fn predict(&self, features: ArrayView1<f32>) -> Result<Array1<f32>>;

    fn predict_batch(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Weighted regression step toward `targets`; returns the loss.
    fn fit(
        &mut self,
        inputs: ArrayView2<f32>,
        targets: ArrayView2<f32>,
        weights: ArrayView1<f32>,
        learning_rate: f32,
    ) -> Result<f32>;

    /// Descend along an externally computed dL/d(output).
    fn apply_output_gradient(
        &mut self,
        inputs: ArrayView2<f32>,
        gradients: ArrayView2<f32>,
        learning_rate: f32,
    ) -> Result<()>;

    fn parameters(&self) -> Parameters;

    fn load_parameters(&mut self, parameters: &Parameters) -> Result<()>;

    fn box_clone(&self) -> Box<dyn FunctionApproximator>;
}

impl Clone for Box<dyn FunctionApproximator> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Serializable description of an approximator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApproximatorKind {
    Neural {
        hidden_layers: Vec<usize>,
        activation: Activation,
        optimizer: OptimizerKind,
        loss: LossKind,
        dueling: bool,
    },
    Tabular,
}

impl Default for ApproximatorKind {
    fn default() -> Self {
        ApproximatorKind::Neural {
            hidden_layers: vec![64, 64],
            activation: Activation::Relu,
            optimizer: OptimizerKind::Adam,
            loss: LossKind::Mse,
            dueling: false,
        }
    }
}

impl ApproximatorKind {
    /// Create an approximator, taking gradient clipping and table resolution
    /// from `config`.
    pub fn build<R: Rng + ?Sized>(
        &self,
        input_size: usize,
        output_size: usize,
        config: &EstimatorConfig,
        rng: &mut R,
    ) -> Result<Box<dyn FunctionApproximator>> {
        match self {
            ApproximatorKind::Neural {
                hidden_layers,
                activation,
                optimizer,
                loss,
                dueling,
            } => {
                let approximator = if *dueling {
                    NeuralApproximator::dueling(input_size, hidden_layers, output_size, *activation, *optimizer, rng)?
                } else {
                    NeuralApproximator::new(input_size, hidden_layers, output_size, *activation, *optimizer, rng)?
                };
                Ok(Box::new(
                    approximator
                        .with_loss(*loss)
                        .with_max_gradient_norm(config.max_gradient_norm),
                ))
            }
            ApproximatorKind::Tabular => Ok(Box::new(TabularApproximator::with_resolution(
                input_size,
                output_size,
                config.tabular_resolution,
            )?)),
        }
    }

    pub fn is_tabular(&self) -> bool {
        matches!(self, ApproximatorKind::Tabular)
    }
}

/// Dense network approximator, optionally with a dueling output head.
///
/// With the dueling head the network emits `[V, A_1..A_n]` and the
/// approximator exposes `Q_i = V + A_i - mean(A)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralApproximator {
    network: NeuralNetwork,
    loss: LossKind,
    dueling: bool,
}

impl NeuralApproximator {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        hidden: &[usize],
        output_size: usize,
        activation: Activation,
        optimizer: OptimizerKind,
        rng: &mut R,
    ) -> Result<Self> {
        let network = NeuralNetwork::with_hidden_layers(input_size, hidden, output_size, activation, optimizer.build(), rng)?;
        Ok(NeuralApproximator {
            network,
            loss: LossKind::Mse,
            dueling: false,
        })
    }

    pub fn dueling<R: Rng + ?Sized>(
        input_size: usize,
        hidden: &[usize],
        output_size: usize,
        activation: Activation,
        optimizer: OptimizerKind,
        rng: &mut R,
    ) -> Result<Self> {
        let network =
            NeuralNetwork::with_hidden_layers(input_size, hidden, output_size + 1, activation, optimizer.build(), rng)?;
        Ok(NeuralApproximator {
            network,
            loss: LossKind::Mse,
            dueling: true,
        })
    }

    pub fn with_loss(mut self, loss: LossKind) -> Self {
        self.loss = loss;
        self
    }

    /// Clip the global gradient norm to `norm` before every step; 0 disables.
    pub fn with_max_gradient_norm(mut self, norm: f32) -> Self {
        self.network.max_gradient_norm = norm.max(0.0);
        self
    }

    pub fn network(&self) -> &NeuralNetwork {
        &self.network
    }

    fn combine(&self, raw: Array2<f32>) -> Array2<f32> {
        if !self.dueling {
            return raw;
        }
        let value = raw.slice(s![.., 0..1]).to_owned();
        let advantages = raw.slice(s![.., 1..]).to_owned();
        let mean = advantages
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(raw.nrows()))
            .insert_axis(Axis(1));
        advantages - &mean + &value
    }

    /// Map dL/dQ back onto the raw `[V, A]` outputs.
    fn split_gradient(&self, gradients: ArrayView2<f32>) -> Array2<f32> {
        if !self.dueling {
            return gradients.to_owned();
        }
        let rows = gradients.nrows();
        let n = gradients.ncols();
        let mut raw = Array2::zeros((rows, n + 1));
        for (i, g) in gradients.axis_iter(Axis(0)).enumerate() {
            let sum = g.sum();
            let mean = sum / n.max(1) as f32;
            raw[[i, 0]] = sum;
            for j in 0..n {
                raw[[i, j + 1]] = g[j] - mean;
            }
        }
        raw
    }

    fn check_batch(&self, inputs: ArrayView2<f32>) -> Result<()> {
        if inputs.ncols() != self.input_size() {
            return Err(PallasError::dimension_mismatch(
                format!("{} features", self.input_size()),
                format!("{} features", inputs.ncols()),
            ));
        }
        Ok(())
    }
}

impl FunctionApproximator for NeuralApproximator {
    fn input_size(&self) -> usize {
        self.network.input_size()
    }

    fn output_size(&self) -> usize {
        if self.dueling {
            self.network.output_size() - 1
        } else {
            self.network.output_size()
        }
    }

    fn predict(&self, features: ArrayView1<f32>) -> Result<Array1<f32>> {
        let out = self.predict_batch(features.insert_axis(Axis(0)))?;
        Ok(out.row(0).to_owned())
    }

    fn predict_batch(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_batch(inputs)?;
        Ok(self.combine(self.network.predict_batch(inputs)))
    }

    fn fit(
        &mut self,
        inputs: ArrayView2<f32>,
        targets: ArrayView2<f32>,
        weights: ArrayView1<f32>,
        learning_rate: f32,
    ) -> Result<f32> {
        self.check_batch(inputs)?;
        if !self.dueling {
            return self
                .network
                .train_minibatch(inputs, targets, weights, &self.loss, learning_rate);
        }
        let raw = self.network.forward_batch(inputs);
        let q = self.combine(raw);
        if q.dim() != targets.dim() {
            return Err(PallasError::dimension_mismatch(
                format!("{:?}", q.dim()),
                format!("{:?}", targets.dim()),
            ));
        }
        let value = self.loss.compute_batch(q.view(), targets, weights);
        if !value.is_finite() {
            return Err(PallasError::NumericalError(format!("loss is {}", value)));
        }
        let grad_q = self.loss.gradient_batch(q.view(), targets, weights);
        let grad_raw = self.split_gradient(grad_q.view());
        let gradients = self.network.backward_batch(grad_raw.view())?;
        self.network.apply_gradients(gradients, learning_rate)?;
        Ok(value)
    }

    fn apply_output_gradient(
        &mut self,
        inputs: ArrayView2<f32>,
        gradients: ArrayView2<f32>,
        learning_rate: f32,
    ) -> Result<()> {
        self.check_batch(inputs)?;
        let raw = self.split_gradient(gradients);
        self.network.train_with_output_gradient(inputs, raw.view(), learning_rate)
    }

    fn parameters(&self) -> Parameters {
        Parameters::Dense(self.network.parameters())
    }

    fn load_parameters(&mut self, parameters: &Parameters) -> Result<()> {
        match parameters {
            Parameters::Dense(layers) => self.network.load_parameters(layers),
            Parameters::Table(_) => Err(PallasError::invalid_parameter(
                "parameters",
                "tabular parameters cannot be loaded into a network",
            )),
        }
    }

    fn box_clone(&self) -> Box<dyn FunctionApproximator> {
        Box::new(self.clone())
    }
}

/// Lookup table keyed by the feature vector rounded to a fixed grid.
///
/// Features closer than half the resolution land on the same row, so float
/// noise from environment arithmetic does not split a state in two. Unseen
/// states predict zeros. `fit` moves each visited row toward its target by
/// `learning_rate * weight * (target - value)`, the plain TD rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularApproximator {
    input_size: usize,
    output_size: usize,
    resolution: f32,
    table: HashMap<StateKey, Array1<f32>>,
}

impl TabularApproximator {
    pub const DEFAULT_RESOLUTION: f32 = 1.0e-4;

    pub fn new(input_size: usize, output_size: usize) -> Self {
        TabularApproximator {
            input_size,
            output_size,
            resolution: Self::DEFAULT_RESOLUTION,
            table: HashMap::new(),
        }
    }

    pub fn with_resolution(input_size: usize, output_size: usize, resolution: f32) -> Result<Self> {
        if !(resolution > 0.0 && resolution.is_finite()) {
            return Err(PallasError::invalid_parameter(
                "tabularResolution".to_string(),
                format!("must be positive, got {}", resolution),
            ));
        }
        Ok(TabularApproximator {
            resolution,
            ..Self::new(input_size, output_size)
        })
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Grid cell of `features`; -0.0 and 0.0 fall in the same cell.
    pub fn key(&self, features: ArrayView1<f32>) -> StateKey {
        features
            .iter()
            .map(|&v| (v as f64 / self.resolution as f64).round() as i64)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Set a row directly, e.g. to seed a fixed value table.
    pub fn insert(&mut self, features: ArrayView1<f32>, values: Array1<f32>) -> Result<()> {
        self.check(features.len())?;
        if values.len() != self.output_size {
            return Err(PallasError::dimension_mismatch(
                format!("{} values", self.output_size),
                format!("{} values", values.len()),
            ));
        }
        self.table.insert(self.key(features), values);
        Ok(())
    }

    fn check(&self, width: usize) -> Result<()> {
        if width != self.input_size {
            return Err(PallasError::dimension_mismatch(
                format!("{} features", self.input_size),
                format!("{} features", width),
            ));
        }
        Ok(())
    }

    fn row(&self, features: ArrayView1<f32>) -> Array1<f32> {
        self.table
            .get(&self.key(features))
            .cloned()
            .unwrap_or_else(|| Array1::zeros(self.output_size))
    }
}

impl FunctionApproximator for TabularApproximator {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn predict(&self, features: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.check(features.len())?;
        Ok(self.row(features))
    }

    fn predict_batch(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check(inputs.ncols())?;
        let mut out = Array2::zeros((inputs.nrows(), self.output_size));
        for (i, features) in inputs.axis_iter(Axis(0)).enumerate() {
            out.row_mut(i).assign(&self.row(features));
        }
        Ok(out)
    }

    fn fit(
        &mut self,
        inputs: ArrayView2<f32>,
        targets: ArrayView2<f32>,
        weights: ArrayView1<f32>,
        learning_rate: f32,
    ) -> Result<f32> {
        self.check(inputs.ncols())?;
        if targets.ncols() != self.output_size || targets.nrows() != inputs.nrows() {
            return Err(PallasError::dimension_mismatch(
                format!("({}, {})", inputs.nrows(), self.output_size),
                format!("{:?}", targets.dim()),
            ));
        }
        let mut loss = 0.0;
        for ((features, target), &w) in inputs
            .axis_iter(Axis(0))
            .zip(targets.axis_iter(Axis(0)))
            .zip(weights.iter())
        {
            let output_size = self.output_size;
            let row = self
                .table
                .entry(self.key(features))
                .or_insert_with(|| Array1::zeros(output_size));
            row.zip_mut_with(&target, |v, &t| {
                let error = t - *v;
                loss += 0.5 * w * error * error;
                *v += learning_rate * w * error;
            });
        }
        Ok(loss / inputs.nrows().max(1) as f32)
    }

    fn apply_output_gradient(
        &mut self,
        inputs: ArrayView2<f32>,
        gradients: ArrayView2<f32>,
        learning_rate: f32,
    ) -> Result<()> {
        self.check(inputs.ncols())?;
        for (features, grad) in inputs.axis_iter(Axis(0)).zip(gradients.axis_iter(Axis(0))) {
            let output_size = self.output_size;
            let row = self
                .table
                .entry(self.key(features))
                .or_insert_with(|| Array1::zeros(output_size));
            row.scaled_add(-learning_rate, &grad);
        }
        Ok(())
    }

    fn parameters(&self) -> Parameters {
        Parameters::Table(self.table.clone())
    }

    fn load_parameters(&mut self, parameters: &Parameters) -> Result<()> {
        match parameters {
            Parameters::Table(rows) => {
                if let Some(row) = rows.values().find(|r| r.len() != self.output_size) {
                    return Err(PallasError::dimension_mismatch(
                        format!("{} values", self.output_size),
                        format!("{} values", row.len()),
                    ));
                }
                self.table = rows.clone();
                Ok(())
            }
            Parameters::Dense(_) => Err(PallasError::invalid_parameter(
                "parameters",
                "dense parameters cannot be loaded into a table",
            )),
        }
    }

    fn box_clone(&self) -> Box<dyn FunctionApproximator> {
        Box::new(self.clone())
    }
}
