//! # Function Estimation
//!
//! [`FunctionEstimator`] owns the trainable parameters of an algorithm: a live
//! [`FunctionApproximator`], an optional target copy and, in replay mode, a
//! [`Memory`] of past transitions. Algorithms never touch parameters directly;
//! they read predictions and hand transitions to [`FunctionEstimator::update`]
//! together with a [`TargetRule`] that turns a batch into regression targets.
//!
//! ## Update modes
//!
//! - **Online**: every transition triggers one gradient step on itself
//! - **Replay**: transitions are stored; once enough are present a mini-batch
//!   is sampled every `updateCycle` stores and fitted, with importance weights
//!   when the memory provides them
//!
//! ## Example Usage
//!
//! ```rust
//! use pallas::estimator::{EstimatorConfig, FunctionEstimator, TabularApproximator};
//! use pallas::environment::EnvironmentState;
//! use ndarray::array;
//! use std::collections::BTreeSet;
//!
//! let table = TabularApproximator::new(2, 3);
//! let estimator = FunctionEstimator::new(Box::new(table), EstimatorConfig::default());
//! let state = EnvironmentState::new(array![0.0, 1.0], BTreeSet::from([0, 1, 2]));
//! assert_eq!(estimator.predict(&state).unwrap(), array![0.0, 0.0, 0.0]);
//! ```

pub mod approximator;
pub mod parameters;
pub mod snapshot;

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::environment::EnvironmentState;
use crate::error::{PallasError, Result};
use crate::memory::Memory;
use crate::params::{ParamDef, ParamSet, ParamType};
use crate::transition::Transition;

pub use approximator::{ApproximatorKind, FunctionApproximator, NeuralApproximator, TabularApproximator};
pub use parameters::{Parameters, StateKey};
pub use snapshot::{PredictionSnapshot, PublishedSnapshot};

/// Turns transitions into full target vectors for the live approximator.
///
/// Implementations usually start from the live prediction of each state and
/// overwrite the entry of the action taken, so untouched outputs produce no
/// error.
pub trait TargetRule {
    fn targets(&self, estimator: &FunctionEstimator, batch: &[Transition]) -> Result<Vec<Array1<f32>>>;
}

pub const ESTIMATOR_PARAMS: &[ParamDef] = &[
    ParamDef::new("learningRate", ParamType::Float),
    ParamDef::new("targetFunctionUpdateCycle", ParamType::Int),
    ParamDef::new("targetFunctionTau", ParamType::Float),
    ParamDef::new("minSamples", ParamType::Int),
    ParamDef::new("updateCycle", ParamType::Int),
    ParamDef::new("batchSize", ParamType::Int),
    ParamDef::new("useImportanceSamplingWeights", ParamType::Bool),
    ParamDef::new("maxGradientNorm", ParamType::Float),
    ParamDef::new("tabularResolution", ParamType::Float),
];

/// Training settings of a [`FunctionEstimator`].
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    pub learning_rate: f32,
    /// Updates between target synchronisations; 0 synchronises every update
    pub target_update_cycle: usize,
    /// 1.0 copies the live parameters, smaller values blend them in
    pub tau: f32,
    pub min_samples: usize,
    /// Stores between replay training steps
    pub update_cycle: usize,
    pub batch_size: usize,
    pub use_importance_weights: bool,
    /// Global gradient-norm limit for neural approximators; 0 disables clipping
    pub max_gradient_norm: f32,
    /// Grid step tabular approximators round features to
    pub tabular_resolution: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            learning_rate: 0.001,
            target_update_cycle: 0,
            tau: 1.0,
            min_samples: 0,
            update_cycle: 1,
            batch_size: 32,
            use_importance_weights: true,
            max_gradient_norm: 0.0,
            tabular_resolution: 1.0e-4,
        }
    }
}

impl EstimatorConfig {
    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let defaults = EstimatorConfig::default();
        let learning_rate = params.float_or("learningRate", defaults.learning_rate);
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(PallasError::invalid_parameter(
                "learningRate".to_string(),
                format!("must be positive, got {}", learning_rate),
            ));
        }
        let tau = params.float_in("targetFunctionTau", defaults.tau, 0.0, 1.0)?;
        if tau == 0.0 {
            return Err(PallasError::invalid_parameter(
                "targetFunctionTau",
                "a zero rate never moves the target",
            ));
        }
        let batch_size = params.usize_or("batchSize", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(PallasError::invalid_parameter("batchSize", "must be at least 1"));
        }
        let update_cycle = params.usize_or("updateCycle", defaults.update_cycle)?;
        if update_cycle == 0 {
            return Err(PallasError::invalid_parameter("updateCycle", "must be at least 1"));
        }
        let max_gradient_norm = params.float_or("maxGradientNorm", defaults.max_gradient_norm);
        if !(max_gradient_norm >= 0.0 && max_gradient_norm.is_finite()) {
            return Err(PallasError::invalid_parameter(
                "maxGradientNorm".to_string(),
                format!("must be zero or positive, got {}", max_gradient_norm),
            ));
        }
        let tabular_resolution = params.float_or("tabularResolution", defaults.tabular_resolution);
        if !(tabular_resolution > 0.0 && tabular_resolution.is_finite()) {
            return Err(PallasError::invalid_parameter(
                "tabularResolution".to_string(),
                format!("must be positive, got {}", tabular_resolution),
            ));
        }
        Ok(EstimatorConfig {
            learning_rate,
            target_update_cycle: params.usize_or("targetFunctionUpdateCycle", defaults.target_update_cycle)?,
            tau,
            min_samples: params.usize_or("minSamples", defaults.min_samples)?,
            update_cycle,
            batch_size,
            use_importance_weights: params.bool_or("useImportanceSamplingWeights", defaults.use_importance_weights),
            max_gradient_norm,
            tabular_resolution,
        })
    }
}

/// How transitions reach the approximator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Online,
    Replay,
}

/// Result of a training step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateReport {
    pub loss: f32,
    pub samples: usize,
    pub synchronized: bool,
}

/// Owner of a live approximator, its optional target copy and replay memory.
pub struct FunctionEstimator {
    live: Box<dyn FunctionApproximator>,
    target: Option<Box<dyn FunctionApproximator>>,
    memory: Option<Box<dyn Memory>>,
    config: EstimatorConfig,
    rng: StdRng,
    updates: usize,
    pending: usize,
    published: Option<PublishedSnapshot>,
}

impl FunctionEstimator {
    /// Online estimator without a target copy.
    pub fn new(live: Box<dyn FunctionApproximator>, config: EstimatorConfig) -> Self {
        FunctionEstimator {
            live,
            target: None,
            memory: None,
            config,
            rng: StdRng::from_entropy(),
            updates: 0,
            pending: 0,
            published: None,
        }
    }

    /// Attach a target copy initialised to the live parameters.
    pub fn with_target(mut self) -> Self {
        self.target = Some(self.live.box_clone());
        self
    }

    /// Switch to replay mode backed by `memory`.
    pub fn with_memory(mut self, memory: Box<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn mode(&self) -> UpdateMode {
        if self.memory.is_some() {
            UpdateMode::Replay
        } else {
            UpdateMode::Online
        }
    }

    pub fn input_size(&self) -> usize {
        self.live.input_size()
    }

    pub fn output_size(&self) -> usize {
        self.live.output_size()
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn update_count(&self) -> usize {
        self.updates
    }

    pub fn memory_len(&self) -> usize {
        self.memory.as_ref().map_or(0, |m| m.len())
    }

    pub fn approximator(&self) -> &dyn FunctionApproximator {
        self.live.as_ref()
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.live.input_size() {
            return Err(PallasError::dimension_mismatch(
                format!("{} features", self.live.input_size()),
                format!("{} features", width),
            ));
        }
        Ok(())
    }

    fn check_finite(values: &Array1<f32>) -> Result<()> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PallasError::NumericalError("estimator produced a non-finite value".to_string()));
        }
        Ok(())
    }

    /// Live prediction for `state`.
    pub fn predict(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        self.predict_features(state.features.view())
    }

    pub fn predict_features(&self, features: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.check_width(features.len())?;
        let values = self.live.predict(features)?;
        Self::check_finite(&values)?;
        Ok(values)
    }

    /// Prediction of the target copy, or of the live approximator without one.
    pub fn predict_target(&self, state: &EnvironmentState) -> Result<Array1<f32>> {
        self.check_width(state.feature_len())?;
        let values = match &self.target {
            Some(target) => target.predict(state.features.view())?,
            None => self.live.predict(state.features.view())?,
        };
        Self::check_finite(&values)?;
        Ok(values)
    }

    pub fn predict_batch(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_width(inputs.ncols())?;
        self.live.predict_batch(inputs)
    }

    /// Hand one transition to the estimator.
    ///
    /// Returns a report when a gradient step was taken.
    pub fn update(&mut self, transition: Transition, rule: &dyn TargetRule) -> Result<Option<UpdateReport>> {
        self.check_width(transition.state.feature_len())?;
        let report = if self.memory.is_some() {
            self.store(transition);
            if self.ready() && self.pending >= self.config.update_cycle {
                Some(self.replay_step(rule)?)
            } else {
                None
            }
        } else {
            let targets = rule.targets(self, std::slice::from_ref(&transition))?;
            let weights = vec![1.0];
            let (loss, _) = self.fit_transitions(std::slice::from_ref(&transition), &targets, &weights)?;
            Some(UpdateReport {
                loss,
                samples: 1,
                synchronized: false,
            })
        };
        let synchronized = self.count_update()?;
        Ok(report.map(|r| UpdateReport { synchronized, ..r }))
    }

    /// Train once more on whatever replay stores have not been trained on yet.
    ///
    /// A memory holding fewer transitions than a batch still trains on what
    /// it has, as long as `minSamples` is met.
    pub fn flush(&mut self, rule: &dyn TargetRule) -> Result<Option<UpdateReport>> {
        if self.memory.is_none() || self.pending == 0 {
            return Ok(None);
        }
        let len = self.memory_len();
        if len < self.config.min_samples.max(1) {
            debug!(
                "flush skipped: {} stored transitions, {} needed before training",
                len, self.config.min_samples
            );
            return Ok(None);
        }
        if len < self.config.batch_size {
            debug!("flushing a partial batch of {} (batch size {})", len, self.config.batch_size);
        }
        self.replay_step(rule).map(Some)
    }

    fn store(&mut self, transition: Transition) {
        if let Some(memory) = self.memory.as_mut() {
            memory.add(transition);
            self.pending += 1;
        }
    }

    fn ready(&self) -> bool {
        let needed = self.config.batch_size.max(self.config.min_samples);
        self.memory_len() >= needed
    }

    fn replay_step(&mut self, rule: &dyn TargetRule) -> Result<UpdateReport> {
        let batch_size = self.config.batch_size;
        let batch = match self.memory.as_mut() {
            Some(memory) => memory.sample(batch_size, &mut self.rng)?,
            None => return Err(PallasError::protocol("estimator", "replay step without a memory")),
        };
        self.pending = 0;
        let targets = rule.targets(self, &batch.transitions)?;
        let weights = if self.config.use_importance_weights {
            batch.weights.clone()
        } else {
            vec![1.0; batch.len()]
        };
        let (loss, td_errors) = self.fit_transitions(&batch.transitions, &targets, &weights)?;
        if let Some(memory) = self.memory.as_mut() {
            memory.update_priorities(&batch.indices, &td_errors);
        }
        debug!("replay step on {} samples, loss {:.5}", batch.len(), loss);
        Ok(UpdateReport {
            loss,
            samples: batch.len(),
            synchronized: false,
        })
    }

    /// Fit `targets` for the states of `transitions`; returns the loss and the
    /// TD error at each taken action.
    fn fit_transitions(
        &mut self,
        transitions: &[Transition],
        targets: &[Array1<f32>],
        weights: &[f32],
    ) -> Result<(f32, Vec<f32>)> {
        if targets.len() != transitions.len() {
            return Err(PallasError::dimension_mismatch(
                format!("{} targets", transitions.len()),
                format!("{} targets", targets.len()),
            ));
        }
        let inputs = stack_rows(transitions.iter().map(|t| t.state.features.view()), self.input_size())?;
        let target_matrix = stack_rows(targets.iter().map(|t| t.view()), self.output_size())?;
        let predictions = self.live.predict_batch(inputs.view())?;
        let width = self.output_size();
        let td_errors = transitions
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let col = if t.action < width { t.action } else { 0 };
                target_matrix[[i, col]] - predictions[[i, col]]
            })
            .collect();
        let weights = Array1::from(weights.to_vec());
        let loss = self
            .live
            .fit(inputs.view(), target_matrix.view(), weights.view(), self.config.learning_rate)?;
        self.publish()?;
        Ok((loss, td_errors))
    }

    /// Direct regression on `(features, target)` rows with unit weights.
    pub fn train(&mut self, samples: &[(Array1<f32>, Array1<f32>)]) -> Result<f32> {
        if samples.is_empty() {
            return Err(PallasError::EmptyBuffer("no samples to train on".to_string()));
        }
        let inputs = stack_rows(samples.iter().map(|(x, _)| x.view()), self.input_size())?;
        let targets = stack_rows(samples.iter().map(|(_, y)| y.view()), self.output_size())?;
        let weights = Array1::ones(samples.len());
        let loss = self
            .live
            .fit(inputs.view(), targets.view(), weights.view(), self.config.learning_rate)?;
        self.publish()?;
        self.count_update()?;
        Ok(loss)
    }

    /// Descend along `gradients` (dL/d output, one row per input).
    pub fn apply_gradient(&mut self, inputs: ArrayView2<f32>, gradients: ArrayView2<f32>) -> Result<()> {
        self.check_width(inputs.ncols())?;
        if gradients.ncols() != self.output_size() || gradients.nrows() != inputs.nrows() {
            return Err(PallasError::dimension_mismatch(
                format!("({}, {})", inputs.nrows(), self.output_size()),
                format!("{:?}", gradients.dim()),
            ));
        }
        self.live
            .apply_output_gradient(inputs, gradients, self.config.learning_rate)?;
        self.publish()?;
        self.count_update()?;
        Ok(())
    }

    fn count_update(&mut self) -> Result<bool> {
        self.updates += 1;
        if self.target.is_none() {
            return Ok(false);
        }
        let cycle = self.config.target_update_cycle;
        if cycle == 0 || self.updates % cycle == 0 {
            self.synchronize_target()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Copy (`tau >= 1`) or blend the live parameters into the target.
    pub fn synchronize_target(&mut self) -> Result<()> {
        let live = self.live.parameters();
        let tau = self.config.tau;
        if let Some(target) = self.target.as_mut() {
            if tau >= 1.0 {
                target.load_parameters(&live)?;
            } else {
                let mut blended = target.parameters();
                blended.blend(&live, tau)?;
                target.load_parameters(&blended)?;
            }
            debug!("target synchronised after {} updates (tau {})", self.updates, tau);
        }
        Ok(())
    }

    pub fn clone_parameters(&self) -> Parameters {
        self.live.parameters()
    }

    pub fn target_parameters(&self) -> Option<Parameters> {
        self.target.as_ref().map(|t| t.parameters())
    }

    pub fn load_parameters(&mut self, parameters: &Parameters) -> Result<()> {
        self.live.load_parameters(parameters)?;
        self.publish()
    }

    /// Owned inference copy of the current live parameters.
    pub fn snapshot(&self) -> PredictionSnapshot {
        PredictionSnapshot::new(self.live.box_clone())
    }

    /// Handle that receives a fresh copy after every training step.
    pub fn published(&mut self) -> PublishedSnapshot {
        match &self.published {
            Some(handle) => handle.clone(),
            None => {
                let handle = PublishedSnapshot::new(self.live.as_ref());
                self.published = Some(handle.clone());
                handle
            }
        }
    }

    fn publish(&self) -> Result<()> {
        match &self.published {
            Some(handle) => handle.publish(self.live.as_ref()),
            None => Ok(()),
        }
    }
}

/// Stack equally sized rows into a matrix.
pub fn stack_rows<'a, I>(rows: I, width: usize) -> Result<Array2<f32>>
where
    I: ExactSizeIterator<Item = ArrayView1<'a, f32>>,
{
    let mut matrix = Array2::zeros((rows.len(), width));
    for (i, row) in rows.enumerate() {
        if row.len() != width {
            return Err(PallasError::dimension_mismatch(
                format!("rows of width {}", width),
                format!("a row of width {}", row.len()),
            ));
        }
        matrix.row_mut(i).assign(&row);
    }
    Ok(matrix)
}
